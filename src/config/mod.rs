pub mod runtime;

pub use runtime::{RetryLimits, RuntimeConfig, StatusClass, StatusPolicy, Timeouts};

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub target: Option<String>,
    pub target_list: Option<String>,
    pub word_list: Option<String>,
    pub proxy_list: Option<String>,
    pub exceptions: Option<String>,
    pub output: Option<String>,
    pub threads: Option<usize>,
    pub max_sockets: Option<usize>,
    #[serde(alias = "wait_for")]
    pub connect_timeout: Option<u64>,
    #[serde(alias = "read_for")]
    pub read_timeout: Option<u64>,
    #[serde(alias = "statuscodes")]
    pub accepted_status: Option<String>,
    #[serde(alias = "statuscodesblacklist")]
    pub exempt_status: Option<String>,
    pub max_reconnect: Option<u32>,
    pub max_redirect: Option<u32>,
    pub max_send: Option<u32>,
    pub max_body_bytes: Option<usize>,
    pub signatures: Option<String>,
    pub signature_output: Option<String>,
    pub rate: Option<u32>,
    pub no_color: Option<bool>,
    pub no_progress: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".dirhammer").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}
