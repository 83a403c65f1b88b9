use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirhammer",
    version,
    about = "concurrent HTTP/HTTPS directory brute-forcer",
    long_about = "Dirhammer probes every target x word combination at high concurrency, drops soft-404s and duplicate bodies, and streams what it finds.\n\nExamples:\n  dirhammer -T http://target.tld -w words.txt\n  dirhammer -t targets.txt -w words.txt -c 8 --max-sockets 2000 -o found.txt\n  dirhammer -T https://target.tld -w words.txt --signatures sigs.json --os hits.json\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        long = "no-progress",
        help_heading = "Output",
        help = "Do not draw the progress bar."
    )]
    pub no_progress: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write results to FILE instead of stdout (\"stdout\" for stdout)."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'T',
        long = "target",
        value_name = "URL",
        help_heading = "Input",
        help = "Single target, e.g. http://example.com."
    )]
    pub target: Option<String>,

    #[arg(
        short = 't',
        long = "target-list",
        value_name = "FILE",
        help_heading = "Input",
        help = "Load targets from a file (one per line)."
    )]
    pub target_list: Option<String>,

    #[arg(
        short = 'w',
        long = "word-list",
        value_name = "FILE",
        help_heading = "Input",
        help = "Words to append to every target (required)."
    )]
    pub word_list: Option<String>,

    #[arg(
        short = 'p',
        long = "proxy",
        value_name = "FILE",
        help_heading = "Input",
        help = "Rotate plain-http requests through the HOST:PORT proxies in FILE."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.dirhammer/config.yml when present)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 'c',
        long = "threads",
        value_name = "N",
        help_heading = "Performance",
        help = "Worker threads (defaults to the number of CPUs)."
    )]
    pub threads: Option<usize>,

    #[arg(
        long = "max-sockets",
        value_name = "N",
        help_heading = "Performance",
        help = "Open sockets shared by all workers (default 1000)."
    )]
    pub max_sockets: Option<usize>,

    #[arg(
        short = 'n',
        long = "wait-for",
        value_name = "SECS",
        help_heading = "Performance",
        help = "Connect and send deadline in seconds (default 5)."
    )]
    pub wait_for: Option<u64>,

    #[arg(
        long = "read-for",
        value_name = "SECS",
        help_heading = "Performance",
        help = "Receive deadline in seconds (default 10)."
    )]
    pub read_for: Option<u64>,

    #[arg(
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Cap requests per second across all workers (0 = unlimited)."
    )]
    pub rate: Option<u32>,

    #[arg(
        long = "max-reconnect",
        value_name = "N",
        help_heading = "Retries",
        help = "Connect attempts per candidate (default 5)."
    )]
    pub max_reconnect: Option<u32>,

    #[arg(
        long = "max-redirect",
        value_name = "N",
        help_heading = "Retries",
        help = "Redirects followed per candidate (default 5)."
    )]
    pub max_redirect: Option<u32>,

    #[arg(
        long = "max-send",
        value_name = "N",
        help_heading = "Retries",
        help = "Send and TLS handshake attempts per candidate (default 5)."
    )]
    pub max_send: Option<u32>,

    #[arg(
        long = "max-body-bytes",
        value_name = "BYTES",
        help_heading = "Retries",
        help = "Largest response body read per probe (default 8 MiB)."
    )]
    pub max_body_bytes: Option<usize>,

    #[arg(
        short = 's',
        long = "statuscodes",
        value_name = "CODES",
        help_heading = "Matching",
        help = "Accepted status codes (default 200,204,301,302,307,401,403,408)."
    )]
    pub statuscodes: Option<String>,

    #[arg(
        short = 'b',
        long = "statuscodesblacklist",
        value_name = "CODES",
        help_heading = "Matching",
        help = "Status codes never reported, wins over --statuscodes (default 400,404)."
    )]
    pub statuscodesblacklist: Option<String>,

    #[arg(
        short = 'e',
        long = "exceptions",
        value_name = "FILE",
        help_heading = "Matching",
        help = "Drop responses whose body contains any of these words (case-insensitive)."
    )]
    pub exceptions: Option<String>,

    #[arg(
        long = "signatures",
        value_name = "FILE",
        help_heading = "Signatures",
        help = "JSON signature definitions to run against every reported body."
    )]
    pub signatures: Option<String>,

    #[arg(
        long = "os",
        value_name = "FILE",
        help_heading = "Signatures",
        help = "Where signature hits are written as JSON (required with --signatures)."
    )]
    pub signature_output: Option<String>,
}
