pub mod hits;
pub mod matcher;

pub use hits::{write_hits, HitLog, MatchKind, SignatureHit};
pub use matcher::{ExceptionMatcher, SignatureMatcher};

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("failed to read signature file: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed signature file: {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("signature file contains no signatures: {path}")]
    Empty { path: String },

    #[error("invalid regex signature '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build literal matcher: {source}")]
    Automaton {
        #[source]
        source: aho_corasick::BuildError,
    },

    #[error("failed to serialize signature hits: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write signature hits to {path} or a fallback file: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// one entry of the definition file
#[derive(Clone, Debug, Deserialize)]
struct SignatureDefinition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "alertDescription")]
    alert_description: String,
    signatures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub pattern: String,
    /// Index into [`SignatureSet::alerts`].
    pub alert: usize,
}

/// Loaded signature definitions, split by match kind. Alert indices are stable once loaded.
#[derive(Clone, Debug, Default)]
pub struct SignatureSet {
    pub alerts: Vec<String>,
    pub literals: Vec<Signature>,
    pub regexes: Vec<Signature>,
}

impl SignatureSet {
    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| SignatureError::Read {
            path: display.clone(),
            source: e,
        })?;
        let set = Self::parse(&raw).map_err(|e| SignatureError::Parse {
            path: display.clone(),
            source: e,
        })?;
        if set.is_empty() {
            return Err(SignatureError::Empty { path: display });
        }
        Ok(set)
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let definitions: Vec<SignatureDefinition> = serde_json::from_str(raw)?;
        let mut set = SignatureSet::default();
        for def in definitions {
            set.alerts.push(def.alert_description);
            let alert = set.alerts.len() - 1;
            let is_regex = def.kind.eq_ignore_ascii_case("regex");
            for pattern in def.signatures {
                if is_regex {
                    set.regexes.push(Signature { pattern, alert });
                } else {
                    set.literals.push(Signature {
                        pattern: pattern.to_ascii_lowercase(),
                        alert,
                    });
                }
            }
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.regexes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.literals.len() + self.regexes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"[
        {"type": "string", "alertDescription": "admin panel exposed", "signatures": ["Admin-Panel", "phpMyAdmin"]},
        {"type": "REGEX", "alertDescription": "stack trace", "signatures": ["(?s).*Traceback.*"]},
        {"type": "string", "alertDescription": "debug", "signatures": []}
    ]"#;

    #[test]
    fn definitions_are_split_by_kind_with_stable_alerts() {
        let set = SignatureSet::parse(DEFINITIONS).unwrap();
        assert_eq!(set.alerts.len(), 3);
        assert_eq!(set.literals.len(), 2);
        assert_eq!(set.regexes.len(), 1);
        assert_eq!(set.literals[0].pattern, "admin-panel");
        assert_eq!(set.alerts[set.literals[1].alert], "admin panel exposed");
        assert_eq!(set.alerts[set.regexes[0].alert], "stack trace");
        assert_eq!(set.regexes[0].pattern, "(?s).*Traceback.*");
    }

    #[test]
    fn malformed_files_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"[{"type": "regex"}]"#).unwrap();
        assert!(matches!(
            SignatureSet::load(&bad),
            Err(SignatureError::Parse { .. })
        ));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(matches!(
            SignatureSet::load(&empty),
            Err(SignatureError::Empty { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            SignatureSet::load(&missing),
            Err(SignatureError::Read { .. })
        ));
    }
}
