use std::fmt;
use std::sync::Mutex;

use super::lock;

/// Round-robin index over a fixed number of slots.
#[derive(Debug)]
pub struct ProxyRotator {
    current: Mutex<usize>,
    total: usize,
}

impl ProxyRotator {
    /// `None` for an empty rotation.
    pub fn new(total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        Some(Self {
            current: Mutex::new(0),
            total,
        })
    }

    /// Returns the current index and advances it, wrapping at `total`.
    pub fn next(&self) -> usize {
        let mut current = lock(&self.current);
        let index = *current;
        *current = (index + 1) % self.total;
        index
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    /// Accepts `host:port`, optionally prefixed with `http://` and suffixed with `/`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let raw = value.trim();
        let raw = raw
            .strip_prefix("http://")
            .or_else(|| raw.strip_prefix("HTTP://"))
            .unwrap_or(raw)
            .trim_end_matches('/');
        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| format!("expected HOST:PORT, got '{value}'"))?;
        if host.is_empty() {
            return Err(format!("missing proxy host in '{value}'"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid proxy port in '{value}'"))?;
        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configured proxies plus the rotator that hands them out.
#[derive(Debug)]
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    rotator: ProxyRotator,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Option<Self> {
        let rotator = ProxyRotator::new(endpoints.len())?;
        Some(Self { endpoints, rotator })
    }

    pub fn next(&self) -> &ProxyEndpoint {
        &self.endpoints[self.rotator.next()]
    }
}
