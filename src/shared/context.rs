use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use indicatif::ProgressBar;
use tracing::{debug, warn};

use super::{ContentDigest, DedupRegistry, ProxyPool, SharedQueue};
use crate::config::runtime::SYNTHETIC_TIMEOUT_STATUS;
use crate::config::RuntimeConfig;
use crate::output::ResultSink;
use crate::signature::{ExceptionMatcher, HitLog, SignatureMatcher};

pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// What happened to a terminal response handed to [`ScanContext::record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    Written { signature_hits: usize },
    ExceptionListed,
    Duplicate,
    WriteFailed,
}

/// All state shared by the workers of one scan. Built once by the runner, then only read or
/// mutated through the single-operation locks of its members.
pub struct ScanContext {
    pub config: RuntimeConfig,
    pub queue: SharedQueue,
    pub proxies: Option<ProxyPool>,
    pub dedup: DedupRegistry,
    pub sink: ResultSink,
    pub hits: HitLog,
    pub exceptions: Option<ExceptionMatcher>,
    pub signatures: Option<SignatureMatcher>,
    pub limiter: Option<DirectRateLimiter>,
    pub progress: ProgressBar,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("proxies", &self.proxies)
            .field("sink", &self.sink)
            .field("signatures", &self.signatures)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ScanContext {
    pub fn new(config: RuntimeConfig, queue: SharedQueue, sink: ResultSink) -> Self {
        let proxies = ProxyPool::new(config.proxies.clone());
        Self {
            config,
            queue,
            proxies,
            dedup: DedupRegistry::new(),
            sink,
            hits: HitLog::new(),
            exceptions: None,
            signatures: None,
            limiter: None,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_exceptions(mut self, exceptions: Option<ExceptionMatcher>) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn with_signatures(mut self, signatures: Option<SignatureMatcher>) -> Self {
        self.signatures = signatures;
        self
    }

    /// `0` leaves requests unthrottled.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn next_candidate(&self) -> Option<String> {
        let next = self.queue.pop();
        if next.is_some() {
            self.progress.inc(1);
        }
        next
    }

    pub async fn throttle(&self) {
        if let Some(limiter) = self.limiter.as_ref() {
            limiter.until_ready().await;
        }
    }

    /// Reports a probe that never produced a status as a 408, when 408 is wanted.
    pub fn report_timeout(&self, url: &str, path: &str) -> bool {
        if !self.config.statuses.reports_timeout() {
            return false;
        }
        if let Err(e) = self.sink.write_result(url, path, SYNTHETIC_TIMEOUT_STATUS) {
            warn!("failed to write result for {url}: {e}");
            return false;
        }
        true
    }

    /// Exception check, then dedup, then output, then signatures.
    pub fn record(&self, url: &str, path: &str, status: u16, body: &[u8]) -> Recorded {
        if let Some(exceptions) = self.exceptions.as_ref() {
            if exceptions.matches(body) {
                debug!("exception word found in body of {url}, dropping");
                return Recorded::ExceptionListed;
            }
        }

        let digest = ContentDigest::of(body);
        if !self.dedup.admit(digest) {
            debug!("hash {digest} already reported, dropping {url}");
            return Recorded::Duplicate;
        }

        if let Err(e) = self.sink.write_result(url, path, status) {
            warn!("failed to write result for {url}: {e}");
            self.dedup.forget(&digest);
            return Recorded::WriteFailed;
        }

        let signature_hits = match self.signatures.as_ref() {
            Some(matcher) => {
                let hits = matcher.scan(body, url);
                let count = hits.len();
                self.hits.extend(hits);
                count
            }
            None => 0,
        };
        Recorded::Written { signature_hits }
    }
}
