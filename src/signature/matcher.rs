use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind as AcMatchKind};
use regex::bytes::Regex;

use super::hits::{MatchKind, SignatureHit};
use super::{SignatureError, SignatureSet};

struct CompiledRegex {
    regex: Regex,
    alert: usize,
}

/// Signature definitions compiled once, queried read-only from every session.
pub struct SignatureMatcher {
    alerts: Vec<String>,
    literals: Option<AhoCorasick>,
    literal_alerts: Vec<usize>,
    regexes: Vec<CompiledRegex>,
}

impl SignatureMatcher {
    pub fn compile(set: SignatureSet) -> Result<Self, SignatureError> {
        let literals = if set.literals.is_empty() {
            None
        } else {
            let automaton = AhoCorasickBuilder::new()
                .ascii_case_insensitive(true)
                .match_kind(AcMatchKind::Standard)
                .build(set.literals.iter().map(|s| s.pattern.as_str()))
                .map_err(|e| SignatureError::Automaton { source: e })?;
            Some(automaton)
        };
        let literal_alerts = set.literals.iter().map(|s| s.alert).collect();

        let mut regexes = Vec::with_capacity(set.regexes.len());
        for sig in set.regexes {
            // anchored at both ends: the whole body has to match, not a substring of it
            let regex = Regex::new(&format!(r"\A(?:{})\z", sig.pattern)).map_err(|e| {
                SignatureError::InvalidRegex {
                    pattern: sig.pattern.clone(),
                    source: e,
                }
            })?;
            regexes.push(CompiledRegex {
                regex,
                alert: sig.alert,
            });
        }

        Ok(Self {
            alerts: set.alerts,
            literals,
            literal_alerts,
            regexes,
        })
    }

    /// Every literal occurrence and every fully matching regex yields its own hit.
    pub fn scan(&self, body: &[u8], url: &str) -> Vec<SignatureHit> {
        let mut hits = Vec::new();

        if let Some(automaton) = self.literals.as_ref().filter(|_| !body.is_empty()) {
            for m in automaton.find_overlapping_iter(body) {
                let alert = self.literal_alerts[m.pattern().as_usize()];
                hits.push(SignatureHit {
                    matched: String::from_utf8_lossy(&body[m.start()..m.end()]).into_owned(),
                    found_in: url.to_string(),
                    alert: self.alerts[alert].clone(),
                    search_type: MatchKind::StringSearch,
                });
            }
        }

        for compiled in self.regexes.iter() {
            if let Some(m) = compiled.regex.find(body) {
                hits.push(SignatureHit {
                    matched: String::from_utf8_lossy(m.as_bytes()).into_owned(),
                    found_in: url.to_string(),
                    alert: self.alerts[compiled.alert].clone(),
                    search_type: MatchKind::Regex,
                });
            }
        }
        hits
    }
}

impl std::fmt::Debug for SignatureMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureMatcher")
            .field("literals", &self.literal_alerts.len())
            .field("regexes", &self.regexes.len())
            .finish()
    }
}

/// Case-insensitive containment test over the exception words; a hit marks a soft 404.
#[derive(Debug)]
pub struct ExceptionMatcher {
    automaton: AhoCorasick,
}

impl ExceptionMatcher {
    /// `Ok(None)` for an empty word list.
    pub fn build(words: &[String]) -> Result<Option<Self>, SignatureError> {
        if words.is_empty() {
            return Ok(None);
        }
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(words)
            .map_err(|e| SignatureError::Automaton { source: e })?;
        Ok(Some(Self { automaton }))
    }

    pub fn matches(&self, body: &[u8]) -> bool {
        self.automaton.is_match(body)
    }
}
