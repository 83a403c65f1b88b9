pub mod context;
pub mod dedup;
pub mod queue;
pub mod rotator;

pub use context::ScanContext;
pub use dedup::{ContentDigest, DedupRegistry};
pub use queue::SharedQueue;
pub use rotator::{ProxyEndpoint, ProxyPool, ProxyRotator};

use std::sync::{Mutex, MutexGuard};

// every guarded structure here stays consistent across a panicking holder,
// so a poisoned lock is taken over instead of propagated
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
