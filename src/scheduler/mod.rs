use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::probe::{drive, ProbeSession, SessionStats, Transport};
use crate::shared::ScanContext;
use crate::signature::{write_hits, SignatureError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to start worker {worker}: {source}")]
    WorkerStart {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("failed to write signature hits: {source}")]
    SignatureFlush {
        #[source]
        source: SignatureError,
    },
}

/// A pooled session asking its worker to run a TLS session for a redirected url.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnRequest {
    pub owner: usize,
    pub url: String,
}

/// TLS sessions alive per owning slot, keyed by an id that is never reused.
#[derive(Debug, Default)]
pub struct TlsRegistry {
    next_id: u64,
    live: HashMap<usize, HashSet<u64>>,
}

impl TlsRegistry {
    pub fn register(&mut self, owner: usize) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.entry(owner).or_default().insert(id);
        id
    }

    /// Returns false when the id was not registered to `owner`.
    pub fn remove(&mut self, owner: usize, id: u64) -> bool {
        let Some(ids) = self.live.get_mut(&owner) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            self.live.remove(&owner);
        }
        removed
    }

    #[cfg(test)]
    pub fn live_for(&self, owner: usize) -> usize {
        self.live.get(&owner).map_or(0, HashSet::len)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn issued(&self) -> u64 {
        self.next_id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub slots: usize,
    pub sessions: SessionStats,
    pub tls_sessions: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.slots += other.slots;
        self.sessions.merge(&other.sessions);
        self.tls_sessions += other.tls_sessions;
    }
}

enum Finished {
    Pooled { slot: usize, stats: SessionStats },
    Detached { owner: usize, id: u64, stats: SessionStats },
}

/// A fixed pool of pooled sessions plus whatever TLS sessions they spawn, all multiplexed on the
/// calling thread's reactor.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    ctx: Arc<ScanContext>,
    slots: usize,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<ScanContext>) -> Self {
        let slots = ctx.config.slots_per_worker(ctx.queue.total());
        Self { id, ctx, slots }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Runs until every pooled session has drained the queue and every TLS session it spawned
    /// has retired.
    pub async fn run<T: Transport>(self, transport: &T) -> WorkerStats {
        let (spawn_tx, mut spawn_rx) = mpsc::unbounded_channel::<SpawnRequest>();
        let mut sessions: FuturesUnordered<LocalBoxFuture<'_, Finished>> = FuturesUnordered::new();
        let mut registry = TlsRegistry::default();
        let mut stats = WorkerStats {
            slots: self.slots,
            ..WorkerStats::default()
        };

        for slot in 0..self.slots {
            let session = ProbeSession::pooled(Arc::clone(&self.ctx));
            let tx = spawn_tx.clone();
            sessions.push(
                async move {
                    let stats = drive(session, transport, |url| {
                        let _ = tx.send(SpawnRequest { owner: slot, url });
                    })
                    .await;
                    Finished::Pooled { slot, stats }
                }
                .boxed_local(),
            );
        }
        info!("worker {} started {} sessions", self.id, self.slots);

        loop {
            tokio::select! {
                biased;
                Some(request) = spawn_rx.recv() => {
                    let id = registry.register(request.owner);
                    debug!(
                        "worker {}: slot {} spawned tls session {id} for {}",
                        self.id, request.owner, request.url
                    );
                    let session = ProbeSession::detached(Arc::clone(&self.ctx), request.url);
                    let owner = request.owner;
                    sessions.push(
                        async move {
                            let stats = drive(session, transport, |_| {}).await;
                            Finished::Detached { owner, id, stats }
                        }
                        .boxed_local(),
                    );
                }
                done = sessions.next() => match done {
                    Some(Finished::Pooled { slot, stats: finished }) => {
                        debug!("worker {}: slot {slot} retired", self.id);
                        stats.sessions.merge(&finished);
                    }
                    Some(Finished::Detached { owner, id, stats: finished }) => {
                        if !registry.remove(owner, id) {
                            error!("worker {}: tls session {id} was not registered", self.id);
                        }
                        stats.sessions.merge(&finished);
                    }
                    None => break,
                },
            }
        }

        stats.tls_sessions = registry.issued();
        info!(
            "worker {} done: {} candidates, {} tls sessions",
            self.id, stats.sessions.candidates, stats.tls_sessions
        );
        stats
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub workers: usize,
    pub totals: WorkerStats,
    pub results_written: usize,
    pub signature_hits: usize,
    pub signature_file: Option<PathBuf>,
}

/// Runs one worker per thread, each on its own single-threaded runtime, then flushes signature
/// hits when a destination was configured.
#[derive(Debug)]
pub struct Scheduler {
    ctx: Arc<ScanContext>,
    threads: usize,
    signature_output: Option<PathBuf>,
}

impl Scheduler {
    pub fn new(ctx: Arc<ScanContext>) -> Self {
        let threads = ctx.config.threads.max(1);
        Self {
            ctx,
            threads,
            signature_output: None,
        }
    }

    pub fn with_signature_output(mut self, path: Option<PathBuf>) -> Self {
        self.signature_output = path;
        self
    }

    /// `make_transport` is called once on every worker thread.
    pub fn run<T, F>(self, make_transport: F) -> Result<ScanStats, SchedulerError>
    where
        T: Transport,
        F: Fn() -> io::Result<T> + Sync,
    {
        let make_transport = &make_transport;
        let outcomes: Vec<Result<WorkerStats, SchedulerError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..self.threads)
                .map(|worker| {
                    let ctx = Arc::clone(&self.ctx);
                    let handle = s.spawn(move || -> Result<WorkerStats, SchedulerError> {
                        let runtime = tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                            .map_err(|e| SchedulerError::WorkerStart { worker, source: e })?;
                        let transport = make_transport()
                            .map_err(|e| SchedulerError::WorkerStart { worker, source: e })?;
                        Ok(runtime.block_on(Worker::new(worker, ctx).run(&transport)))
                    });
                    (worker, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(worker, handle)| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SchedulerError::WorkerPanicked { worker }),
                })
                .collect()
        });

        let mut totals = WorkerStats::default();
        for outcome in outcomes {
            totals.merge(&outcome?);
        }

        let mut stats = ScanStats {
            workers: self.threads,
            totals,
            results_written: self.ctx.sink.written(),
            signature_hits: self.ctx.hits.len(),
            signature_file: None,
        };

        if let Some(path) = self.signature_output.as_ref() {
            let hits = self.ctx.hits.snapshot();
            let written =
                write_hits(&hits, path).map_err(|e| SchedulerError::SignatureFlush { source: e })?;
            info!("wrote {} signature hits to {}", hits.len(), written.display());
            stats.signature_file = Some(written);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::output::{ResultSink, SharedBuffer};
    use crate::probe::testing::FakeTransport;
    use crate::shared::SharedQueue;
    use crate::signature::{SignatureMatcher, SignatureSet};

    fn context(cfg: RuntimeConfig, urls: Vec<String>, buffer: &SharedBuffer) -> Arc<ScanContext> {
        Arc::new(ScanContext::new(
            cfg,
            SharedQueue::new(urls),
            ResultSink::new(Box::new(buffer.clone())),
        ))
    }

    #[test]
    fn registry_ids_are_never_reused() {
        let mut registry = TlsRegistry::default();
        let a = registry.register(0);
        let b = registry.register(0);
        let c = registry.register(3);
        assert_ne!(a, b);
        assert_eq!(registry.live_for(0), 2);
        assert!(registry.remove(0, a));
        assert!(!registry.remove(0, a));
        assert!(!registry.remove(3, b));
        assert!(registry.remove(0, b));
        assert!(registry.remove(3, c));
        assert!(registry.is_empty());
        assert_eq!(registry.register(0), 3);
    }

    #[tokio::test]
    async fn worker_waits_for_spawned_tls_sessions() {
        let buffer = SharedBuffer::new();
        let mut cfg = RuntimeConfig::default();
        cfg.max_sockets = 2;
        let urls = vec![
            "http://a.com/login".to_string(),
            "http://a.com/plain".to_string(),
            "http://a.com/gone".to_string(),
        ];
        let ctx = context(cfg, urls, &buffer);
        let transport = FakeTransport::new()
            .redirect("a.com/login", 302, "https://secure.a.com/login")
            .respond("secure.a.com/login", 401, "sign in")
            .redirect("a.com/plain", 301, "/moved")
            .respond("a.com/moved", 403, "moved here");

        let worker = Worker::new(0, Arc::clone(&ctx));
        assert_eq!(worker.slots(), 2);
        let stats = worker.run(&transport).await;

        assert_eq!(stats.tls_sessions, 1);
        assert_eq!(stats.sessions.tls_spawned, 1);
        // three pooled candidates plus the redirected tls url
        assert_eq!(stats.sessions.candidates, 4);
        assert_eq!(transport.handshakes(), 1);
        assert_eq!(ctx.queue.remaining(), 0);

        let mut lines = buffer.lines();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "http://a.com/moved, moved, 403",
                "https://secure.a.com/login, login, 401",
            ]
        );
    }

    #[test]
    fn scheduler_runs_every_candidate_once_and_flushes_hits() {
        let dir = tempfile::tempdir().unwrap();
        let hits_path = dir.path().join("hits.json");
        let buffer = SharedBuffer::new();
        let mut cfg = RuntimeConfig::default();
        cfg.threads = 3;
        cfg.max_sockets = 6;

        let words: Vec<String> = (0..40).map(|i| format!("w{i}")).collect();
        let urls = crate::utils::generate_candidates(&["http://t.com".to_string()], &words, false);
        let set = SignatureSet::parse(
            r#"[{"type": "string", "alertDescription": "marker", "signatures": ["needle"]}]"#,
        )
        .unwrap();
        let ctx = Arc::new(
            ScanContext::new(
                cfg,
                SharedQueue::new(urls),
                ResultSink::new(Box::new(buffer.clone())),
            )
            .with_signatures(Some(SignatureMatcher::compile(set).unwrap())),
        );

        let stats = Scheduler::new(Arc::clone(&ctx))
            .with_signature_output(Some(hits_path.clone()))
            .run(|| {
                let mut transport = FakeTransport::new();
                for i in 0..40 {
                    // every fourth word exists, each with its own body
                    if i % 4 == 0 {
                        let body = format!("page {i} with a needle");
                        transport = transport.respond(&format!("t.com/w{i}"), 403, &body);
                    }
                }
                Ok(transport)
            })
            .unwrap();

        assert_eq!(stats.workers, 3);
        assert_eq!(stats.totals.slots, 6);
        assert_eq!(stats.totals.sessions.candidates, 40);
        assert_eq!(stats.results_written, 10);
        assert_eq!(stats.signature_hits, 10);
        assert_eq!(stats.signature_file.as_deref(), Some(hits_path.as_path()));
        assert_eq!(buffer.lines().len(), 10);

        let raw = std::fs::read_to_string(&hits_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 10);
    }

    #[test]
    fn failing_transport_setup_is_reported() {
        let buffer = SharedBuffer::new();
        let ctx = context(RuntimeConfig::default(), vec!["http://a.com/x".to_string()], &buffer);
        let result = Scheduler::new(ctx).run(|| -> io::Result<FakeTransport> {
            Err(io::Error::other("no tls backend"))
        });
        assert!(matches!(
            result,
            Err(SchedulerError::WorkerStart { worker: 0, .. })
        ));
    }
}
