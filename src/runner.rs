use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::runtime::{
    DEFAULT_ACCEPTED_STATUS, DEFAULT_EXEMPT_STATUS, DEFAULT_MAX_BODY_BYTES,
};
use crate::config::{self, RetryLimits, RuntimeConfig, StatusPolicy, Timeouts};
use crate::output::ResultSink;
use crate::probe::{NetTransport, Transport};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::shared::{ProxyEndpoint, ScanContext, SharedQueue};
use crate::signature::{ExceptionMatcher, SignatureError, SignatureMatcher, SignatureSet};
use crate::utils;

/// Fully resolved scan settings; the binary fills this from flags and the config file.
#[derive(Clone, Debug)]
pub struct Options {
    pub target: Option<String>,
    pub target_list: Option<String>,
    pub word_list: Option<String>,
    pub proxy_list: Option<String>,
    pub exceptions: Option<String>,
    /// File path, or `None`/`"stdout"` for standard output.
    pub output: Option<String>,
    pub signatures: Option<String>,
    pub signature_output: Option<String>,
    pub accepted_status: HashSet<u16>,
    pub exempt_status: HashSet<u16>,
    pub threads: usize,
    pub max_sockets: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_reconnect: u32,
    pub max_redirect: u32,
    pub max_send: u32,
    pub max_body_bytes: usize,
    /// Requests per second across all workers, `0` for no cap.
    pub rate: u32,
    pub show_progress: bool,
}

impl Default for Options {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        let limits = RetryLimits::default();
        Self {
            target: None,
            target_list: None,
            word_list: None,
            proxy_list: None,
            exceptions: None,
            output: None,
            signatures: None,
            signature_output: None,
            accepted_status: utils::parse_u16_set_csv(DEFAULT_ACCEPTED_STATUS).unwrap_or_default(),
            exempt_status: utils::parse_u16_set_csv(DEFAULT_EXEMPT_STATUS).unwrap_or_default(),
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            max_sockets: 1000,
            connect_timeout: timeouts.connect,
            read_timeout: timeouts.receive,
            max_reconnect: limits.max_reconnect,
            max_redirect: limits.max_redirect,
            max_send: limits.max_send,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            rate: 0,
            show_progress: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("a target (-T) or a target list (-t) is required")]
    NoTargets,

    #[error("a word list (-w) is required")]
    MissingWordlist,

    #[error("--signatures and --os must be given together")]
    IncompleteSignatureOptions,

    #[error("output file and word list are the same file: {path}")]
    OutputIsWordlist { path: String },

    #[error("signature output file and word list are the same file: {path}")]
    SignatureOutputIsWordlist { path: String },

    #[error("invalid {what} {value}, expected a positive integer")]
    InvalidCount { what: &'static str, value: usize },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid proxy entry: {message}")]
    InvalidProxy { message: String },

    #[error("failed to load signatures: {source}")]
    Signatures {
        #[source]
        source: SignatureError,
    },

    #[error("failed to build progress bar style: {message}")]
    ProgressStyle { message: String },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Clone, Debug)]
pub struct ScanSummary {
    pub targets: usize,
    pub words: usize,
    pub candidates: usize,
    pub results_written: usize,
    pub timeouts: usize,
    pub tls_sessions: u64,
    pub signature_hits: usize,
    pub signature_file: Option<PathBuf>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn writes_to_stdout(output: Option<&str>) -> bool {
    output.map_or(true, |o| o.eq_ignore_ascii_case("stdout"))
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if non_empty(&options.target).is_none() && non_empty(&options.target_list).is_none() {
            return Err(RunnerError::NoTargets);
        }
        let word_list = non_empty(&options.word_list)
            .map(config::expand_tilde)
            .ok_or(RunnerError::MissingWordlist)?;

        let signatures = non_empty(&options.signatures);
        let signature_output = non_empty(&options.signature_output);
        if signatures.is_some() != signature_output.is_some() {
            return Err(RunnerError::IncompleteSignatureOptions);
        }

        let output = non_empty(&options.output);
        if let Some(output) = output.filter(|o| !writes_to_stdout(Some(*o))) {
            if config::expand_tilde(output) == word_list {
                return Err(RunnerError::OutputIsWordlist {
                    path: output.to_string(),
                });
            }
        }
        if let Some(sig_out) = signature_output {
            if config::expand_tilde(sig_out) == word_list {
                return Err(RunnerError::SignatureOutputIsWordlist {
                    path: sig_out.to_string(),
                });
            }
        }

        for (what, value) in [
            ("thread count", options.threads),
            ("socket count", options.max_sockets),
            ("body size limit", options.max_body_bytes),
        ] {
            if value == 0 {
                return Err(RunnerError::InvalidCount { what, value });
            }
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn run(&self) -> Result<ScanSummary, RunnerError> {
        self.run_with(NetTransport::new)
    }

    /// Runs the scan with a transport built by `make_transport` on every worker thread.
    pub fn run_with<T, F>(&self, make_transport: F) -> Result<ScanSummary, RunnerError>
    where
        T: Transport,
        F: Fn() -> io::Result<T> + Sync,
    {
        let started_at = Instant::now();
        let options = &self.options;

        // destinations first, so a bad path fails before any list is read
        let output = non_empty(&options.output);
        let sink = if writes_to_stdout(output) {
            ResultSink::stdout()
        } else {
            let path = config::expand_tilde_string(output.unwrap_or_default());
            let file = File::create(&path).map_err(|e| RunnerError::FileOpen {
                kind: "output",
                path: path.clone(),
                source: e,
            })?;
            ResultSink::new(Box::new(file))
        };
        let signature_output = non_empty(&options.signature_output).map(config::expand_tilde);
        if let Some(path) = signature_output.as_ref() {
            File::create(path).map_err(|e| RunnerError::FileOpen {
                kind: "signature output",
                path: path.display().to_string(),
                source: e,
            })?;
        }

        let exceptions = match non_empty(&options.exceptions) {
            Some(path) => read_list("exceptions", path)?,
            None => Vec::new(),
        };
        let proxies = match non_empty(&options.proxy_list) {
            Some(path) => parse_proxies(&read_list("proxies", path)?)?,
            None => Vec::new(),
        };
        let signatures = match non_empty(&options.signatures) {
            Some(path) => {
                let set = SignatureSet::load(&config::expand_tilde(path))
                    .map_err(|e| RunnerError::Signatures { source: e })?;
                info!("loaded {} signatures", set.len());
                let matcher = SignatureMatcher::compile(set)
                    .map_err(|e| RunnerError::Signatures { source: e })?;
                Some(matcher)
            }
            None => None,
        };
        let exceptions =
            ExceptionMatcher::build(&exceptions).map_err(|e| RunnerError::Signatures { source: e })?;

        let mut targets = Vec::new();
        if let Some(target) = non_empty(&options.target) {
            targets.push(target.to_string());
        }
        if let Some(path) = non_empty(&options.target_list) {
            targets.extend(read_list("target list", path)?);
        }
        let targets = utils::normalize_list(targets);
        if targets.is_empty() {
            return Err(RunnerError::NoTargets);
        }
        let words = read_list("word list", non_empty(&options.word_list).unwrap_or_default())?;
        if words.is_empty() {
            warn!("word list is empty, only bare targets can be probed");
        }

        let candidates = utils::generate_candidates(&targets, &words, signatures.is_some());
        let total = candidates.len();
        info!(
            "{} targets x {} words -> {} candidates",
            targets.len(),
            words.len(),
            total
        );

        let runtime = RuntimeConfig {
            statuses: StatusPolicy::new(
                options.accepted_status.clone(),
                options.exempt_status.clone(),
            ),
            timeouts: Timeouts {
                connect: options.connect_timeout,
                receive: options.read_timeout,
            },
            limits: RetryLimits {
                max_reconnect: options.max_reconnect,
                max_redirect: options.max_redirect,
                max_send: options.max_send,
            },
            max_body_bytes: options.max_body_bytes,
            threads: options.threads,
            max_sockets: options.max_sockets,
            proxies,
        };

        let pb = if options.show_progress && !writes_to_stdout(output) {
            progress_bar(total as u64)?
        } else {
            ProgressBar::hidden()
        };

        let ctx = Arc::new(
            ScanContext::new(runtime, SharedQueue::new(candidates), sink)
                .with_exceptions(exceptions)
                .with_signatures(signatures)
                .with_rate_limit(options.rate)
                .with_progress(pb.clone()),
        );

        let stats = Scheduler::new(Arc::clone(&ctx))
            .with_signature_output(signature_output)
            .run(make_transport)?;
        pb.finish_and_clear();

        Ok(ScanSummary {
            targets: targets.len(),
            words: words.len(),
            candidates: total,
            results_written: stats.results_written,
            timeouts: stats.totals.sessions.timeouts,
            tls_sessions: stats.totals.tls_sessions,
            signature_hits: stats.signature_hits,
            signature_file: stats.signature_file,
            elapsed: started_at.elapsed(),
        })
    }
}

fn progress_bar(len: u64) -> Result<ProgressBar, RunnerError> {
    let pb = ProgressBar::new(len.max(1));
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| RunnerError::ProgressStyle {
            message: e.to_string(),
        })?
        .progress_chars(r#"#>-"#),
    );
    Ok(pb)
}

/// Reads a list file as a sorted set of trimmed, non-blank lines. Lines that are not valid UTF-8
/// are decoded lossily rather than rejected.
pub fn read_list(kind: &'static str, path: &str) -> Result<Vec<String>, RunnerError> {
    let path = config::expand_tilde_string(path);
    let handle = File::open(&path).map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut lines = Vec::new();
    for line in BufReader::new(handle).split(b'\n') {
        let line = line.map_err(|e| RunnerError::FileRead {
            kind,
            path: path.clone(),
            source: e,
        })?;
        lines.push(String::from_utf8_lossy(&line).into_owned());
    }
    Ok(utils::normalize_list(lines))
}

fn parse_proxies(entries: &[String]) -> Result<Vec<ProxyEndpoint>, RunnerError> {
    entries
        .iter()
        .map(|entry| {
            ProxyEndpoint::parse(entry).map_err(|message| RunnerError::InvalidProxy { message })
        })
        .collect()
}
