use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use super::SignatureError;
use crate::shared::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    StringSearch,
    Regex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignatureHit {
    #[serde(rename = "string")]
    pub matched: String,
    pub found_in: String,
    pub alert: String,
    pub search_type: MatchKind,
}

/// Append-only hit sequence shared by all sessions, flushed once at the end of the scan.
#[derive(Debug, Default)]
pub struct HitLog {
    hits: Mutex<Vec<SignatureHit>>,
}

impl HitLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn push(&self, hit: SignatureHit) {
        lock(&self.hits).push(hit);
    }

    pub fn extend(&self, hits: Vec<SignatureHit>) {
        if hits.is_empty() {
            return;
        }
        lock(&self.hits).extend(hits);
    }

    pub fn len(&self) -> usize {
        lock(&self.hits).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<SignatureHit> {
        lock(&self.hits).clone()
    }
}

/// Writes the hits as a pretty-printed JSON array. When `path` cannot be created the array goes
/// to a randomly named file in the working directory instead; returns where it ended up.
pub fn write_hits(hits: &[SignatureHit], path: &Path) -> Result<PathBuf, SignatureError> {
    let mut rendered =
        serde_json::to_string_pretty(hits).map_err(|e| SignatureError::Serialize { source: e })?;
    rendered.push('\n');

    match std::fs::write(path, &rendered) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(e) => {
            warn!(
                "unable to open {} for signature output ({e}), falling back to a random file name",
                path.display()
            );
            let fallback = PathBuf::from(format!("{}.json", crate::utils::random_string(10)));
            std::fs::write(&fallback, &rendered).map_err(|e| SignatureError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
            Ok(fallback)
        }
    }
}
