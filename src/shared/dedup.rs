use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use super::lock;

/// Fixed-width digest of a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(body: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(body);
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Set of body digests already reported. The first caller to present a digest wins.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: Mutex<HashSet<ContentDigest>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the digest was newly admitted. Check and insert happen under one lock.
    pub fn admit(&self, digest: ContentDigest) -> bool {
        lock(&self.seen).insert(digest)
    }

    /// Releases an admitted digest so a later body with the same content can be reported.
    pub fn forget(&self, digest: &ContentDigest) {
        lock(&self.seen).remove(digest);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
