use std::collections::HashSet;
use std::time::Duration;

use crate::shared::ProxyEndpoint;

pub const DEFAULT_ACCEPTED_STATUS: &str = "200,204,301,302,307,401,403,408";
pub const DEFAULT_EXEMPT_STATUS: &str = "400,404";
pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub const SYNTHETIC_TIMEOUT_STATUS: u16 = 408;
pub const REDIRECT_STATUSES: [u16; 5] = [300, 301, 302, 307, 308];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Exempt,
    Accepted,
    Unlisted,
}

#[derive(Clone, Debug, Default)]
pub struct StatusPolicy {
    accepted: HashSet<u16>,
    exempt: HashSet<u16>,
}

impl StatusPolicy {
    pub fn new(accepted: HashSet<u16>, exempt: HashSet<u16>) -> Self {
        Self { accepted, exempt }
    }

    /// Exempt wins over accepted when a code is in both sets.
    pub fn classify(&self, status: u16) -> StatusClass {
        if self.exempt.contains(&status) {
            StatusClass::Exempt
        } else if self.accepted.contains(&status) {
            StatusClass::Accepted
        } else {
            StatusClass::Unlisted
        }
    }

    /// Whether a probe that never got a status should be reported as a 408.
    pub fn reports_timeout(&self) -> bool {
        self.classify(SYNTHETIC_TIMEOUT_STATUS) == StatusClass::Accepted
    }
}

pub fn is_redirect(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for resolve, connect, handshake and send.
    pub connect: Duration,
    pub receive: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            receive: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryLimits {
    pub max_reconnect: u32,
    pub max_redirect: u32,
    /// Also bounds handshake attempts.
    pub max_send: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            max_reconnect: 5,
            max_redirect: 5,
            max_send: 5,
        }
    }
}

/// Process-wide settings, frozen before the first worker starts.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub statuses: StatusPolicy,
    pub timeouts: Timeouts,
    pub limits: RetryLimits,
    pub max_body_bytes: usize,
    pub threads: usize,
    pub max_sockets: usize,
    pub proxies: Vec<ProxyEndpoint>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let accepted = crate::utils::parse_u16_set_csv(DEFAULT_ACCEPTED_STATUS).unwrap_or_default();
        let exempt = crate::utils::parse_u16_set_csv(DEFAULT_EXEMPT_STATUS).unwrap_or_default();
        Self {
            statuses: StatusPolicy::new(accepted, exempt),
            timeouts: Timeouts::default(),
            limits: RetryLimits::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            threads: 1,
            max_sockets: 1000,
            proxies: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Concurrent pooled sessions per worker.
    pub fn slots_per_worker(&self, total_candidates: usize) -> usize {
        let per_thread = self.max_sockets / self.threads.max(1);
        per_thread.min(total_candidates).max(1)
    }
}
