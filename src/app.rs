use std::io::Write;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::runtime::{DEFAULT_ACCEPTED_STATUS, DEFAULT_EXEMPT_STATUS};
use crate::config::{self, ConfigFile};
use crate::runner::{Options, Runner, ScanSummary};

const BANNER: &str = r#"
        ___      __
   ____/ (_)____/ /_  ____ _____ ___  ____ ___  ___  _____
  / __  / / ___/ __ \/ __ `/ __ `__ \/ __ `__ \/ _ \/ ___/
 / /_/ / / /  / / / / /_/ / / / / / / / / / / /  __/ /
 \__,_/_/_/  /_/ /_/\__,_/_/ /_/ /_/_/ /_/ /_/\___/_/
"#;

fn print_banner(no_color: bool) {
    if no_color {
        print!("{}", BANNER);
    } else {
        let _ = write!(&mut rainbowcoat::stdout(), "{}", BANNER);
    }
    println!(
        "       v{} - concurrent directory brute-forcer",
        env!("CARGO_PKG_VERSION")
    );
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_opt_value<'a>(v: Option<&'a str>, default: &'a str) -> &'a str {
    match v.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn format_status_set(set: &std::collections::HashSet<u16>) -> String {
    let mut codes: Vec<u16> = set.iter().copied().collect();
    codes.sort_unstable();
    codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_logging(verbose: u8, no_color: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level(verbose).into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct RunConfig {
    options: Options,
    no_color: bool,
    verbose: u8,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;
    let defaults = Options::default();

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let no_progress = args.no_progress || cfg.no_progress.unwrap_or(false);

    let accepted_raw = args
        .statuscodes
        .or(cfg.accepted_status)
        .unwrap_or_else(|| DEFAULT_ACCEPTED_STATUS.to_string());
    let accepted_status = crate::utils::parse_u16_set_csv(&accepted_raw)
        .map_err(|e| format!("invalid accepted status list '{accepted_raw}': {e}"))?;
    let exempt_raw = args
        .statuscodesblacklist
        .or(cfg.exempt_status)
        .unwrap_or_else(|| DEFAULT_EXEMPT_STATUS.to_string());
    let exempt_status = crate::utils::parse_u16_set_csv(&exempt_raw)
        .map_err(|e| format!("invalid exempt status list '{exempt_raw}': {e}"))?;

    let connect_timeout = args
        .wait_for
        .or(cfg.connect_timeout)
        .map_or(defaults.connect_timeout, Duration::from_secs);
    let read_timeout = args
        .read_for
        .or(cfg.read_timeout)
        .map_or(defaults.read_timeout, Duration::from_secs);

    let options = Options {
        target: args.target.or(cfg.target),
        target_list: args.target_list.or(cfg.target_list),
        word_list: args.word_list.or(cfg.word_list),
        proxy_list: args.proxy.or(cfg.proxy_list),
        exceptions: args.exceptions.or(cfg.exceptions),
        output: args.output.or(cfg.output),
        signatures: args.signatures.or(cfg.signatures),
        signature_output: args.signature_output.or(cfg.signature_output),
        accepted_status,
        exempt_status,
        threads: args.threads.or(cfg.threads).unwrap_or(defaults.threads),
        max_sockets: args
            .max_sockets
            .or(cfg.max_sockets)
            .unwrap_or(defaults.max_sockets),
        connect_timeout,
        read_timeout,
        max_reconnect: args
            .max_reconnect
            .or(cfg.max_reconnect)
            .unwrap_or(defaults.max_reconnect),
        max_redirect: args
            .max_redirect
            .or(cfg.max_redirect)
            .unwrap_or(defaults.max_redirect),
        max_send: args.max_send.or(cfg.max_send).unwrap_or(defaults.max_send),
        max_body_bytes: args
            .max_body_bytes
            .or(cfg.max_body_bytes)
            .unwrap_or(defaults.max_body_bytes),
        rate: args.rate.or(cfg.rate).unwrap_or(defaults.rate),
        show_progress: !no_progress,
    };

    Ok(RunConfig {
        options,
        no_color,
        verbose: args.verbose,
    })
}

fn print_settings(options: &Options) {
    let target = match (options.target.as_deref(), options.target_list.as_deref()) {
        (Some(t), Some(l)) => format!("{t} + {l}"),
        (Some(t), None) => t.to_string(),
        (None, Some(l)) => l.to_string(),
        (None, None) => "-".to_string(),
    };
    format_kv_line("Target", &target);
    format_kv_line("Wordlist", format_opt_value(options.word_list.as_deref(), "-"));
    format_kv_line("Output", format_opt_value(options.output.as_deref(), "stdout"));
    format_kv_line("Threads", &options.threads.to_string());
    format_kv_line("Sockets", &options.max_sockets.to_string());
    format_kv_line(
        "Timeouts",
        &format!(
            "connect {}s, read {}s",
            options.connect_timeout.as_secs(),
            options.read_timeout.as_secs()
        ),
    );
    format_kv_line("Status", &format_status_set(&options.accepted_status));
    format_kv_line("Exempt", &format_status_set(&options.exempt_status));
    if let Some(proxies) = options.proxy_list.as_deref() {
        format_kv_line("Proxies", proxies);
    }
    if let Some(exceptions) = options.exceptions.as_deref() {
        format_kv_line("Exceptions", exceptions);
    }
    if let Some(signatures) = options.signatures.as_deref() {
        format_kv_line("Signatures", signatures);
    }
    if options.rate > 0 {
        format_kv_line("Rate", &format!("{}/s", options.rate));
    }
    println!();
}

fn print_summary(summary: &ScanSummary) {
    eprintln!();
    eprintln!(
        ":: Completed :: scan took {}s ::",
        summary.elapsed.as_secs()
    );
    eprintln!(
        "{} {} candidates, {} results, {} timeouts, {} tls sessions",
        "[INF]".blue(),
        summary.candidates,
        summary.results_written.to_string().green(),
        summary.timeouts,
        summary.tls_sessions
    );
    if let Some(path) = summary.signature_file.as_ref() {
        eprintln!(
            "{} {} signature hits written to {}",
            "[INF]".blue(),
            summary.signature_hits.to_string().green(),
            path.display()
        );
    }
}

fn run(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    init_logging(run.verbose, run.no_color);

    let runner = Runner::new(run.options).map_err(|e| e.to_string())?;

    // the banner would interleave with result lines when results go to stdout
    let options = runner.options();
    if options
        .output
        .as_deref()
        .is_some_and(|o| !o.trim().is_empty() && !o.trim().eq_ignore_ascii_case("stdout"))
    {
        print_banner(run.no_color);
        print_settings(options);
    }

    let summary = runner.run().map_err(|e| e.to_string())?;
    print_summary(&summary);
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", e.render());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    run(build_run_config(args, cfg)?)
}
