use std::collections::HashSet;

use itertools::iproduct;
use rand::Rng;
use url::{Host, Url};

const RANDOM_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz_ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// the pieces of a candidate url the probe sessions care about
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    /// Authority as sent in `Host`: host name plus `:port` when the url names a non-default one.
    pub host: String,
    pub name: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: String,
}

impl UrlParts {
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// Host name without an explicit `:port` suffix or ipv6 brackets.
    pub fn hostname(&self) -> &str {
        &self.name
    }

    pub fn explicit_port(&self) -> Option<u16> {
        self.port
    }

    /// Origin-form request target, never empty.
    pub fn request_target(&self) -> String {
        let mut target = if self.path.is_empty() {
            "/".to_string()
        } else {
            self.path.clone()
        };
        if !self.query.is_empty() {
            target.push('?');
            target.push_str(&self.query);
        }
        target
    }
}

// "http://a.com" and "http://a.com/" both parse to path "/", only the latter names it
fn names_a_path(url: &str) -> bool {
    url.split(['?', '#'])
        .next()
        .map_or(false, |head| head.matches('/').count() > 2)
}

fn parts_of(parsed: &Url, raw: &str, scheme: String) -> UrlParts {
    let name = match parsed.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    };
    let host_str = parsed.host_str().unwrap_or_default();
    let host = match parsed.port() {
        Some(port) => format!("{host_str}:{port}"),
        None => host_str.to_string(),
    };
    let path = if parsed.path() == "/" && !names_a_path(raw) {
        String::new()
    } else {
        parsed.path().to_string()
    };
    UrlParts {
        scheme,
        host,
        name,
        port: parsed.port(),
        path,
        query: parsed.query().unwrap_or_default().to_string(),
    }
}

/// Splits `scheme://host/path?query`. Scheme and host are lowercased; a url without `://` is
/// treated as starting at the host.
pub fn split_url(url: &str) -> UrlParts {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.has_host() {
            return parts_of(&parsed, url, parsed.scheme().to_string());
        }
    }
    let prefixed = format!("http://{url}");
    match Url::parse(&prefixed) {
        Ok(parsed) => parts_of(&parsed, &prefixed, String::new()),
        Err(_) => {
            let (authority, path) = match url.find('/') {
                Some(idx) => (&url[..idx], &url[idx..]),
                None => (url, ""),
            };
            let authority = authority.to_ascii_lowercase();
            UrlParts {
                name: authority.clone(),
                host: authority,
                path: path.to_string(),
                ..UrlParts::default()
            }
        }
    }
}

/// Path column of a result line: the path without its leading slash, or `/` when empty.
pub fn display_path(path: &str) -> &str {
    if path.is_empty() {
        return "/";
    }
    let mut chars = path.chars();
    chars.next();
    chars.as_str()
}

/// Turns a `Location` value into an absolute url; values starting with `/` are joined to the
/// current host over plain http.
pub fn absolutize_location(location: &str, host: &str) -> String {
    if !location.starts_with('/') {
        return location.to_string();
    }
    Url::parse(&format!("http://{host}/"))
        .and_then(|base| base.join(location))
        .map(String::from)
        .unwrap_or_else(|_| format!("http://{host}{location}"))
}

pub fn is_https(url: &str) -> bool {
    Url::parse(url).map_or(false, |u| u.scheme() == "https")
}

// builds the full candidate list: every word under every target, plus the bare targets
// when signature matching wants the landing pages too
pub fn generate_candidates(
    targets: &[String],
    words: &[String],
    include_bare_targets: bool,
) -> Vec<String> {
    let capacity =
        targets.len() * words.len() + if include_bare_targets { targets.len() } else { 0 };
    let mut out = Vec::with_capacity(capacity);
    for (word, target) in iproduct!(words.iter(), targets.iter()) {
        let word = word.strip_prefix('/').unwrap_or(word);
        if target.ends_with('/') {
            out.push(format!("{target}{word}"));
        } else {
            out.push(format!("{target}/{word}"));
        }
    }
    if include_bare_targets {
        out.extend(targets.iter().cloned());
    }
    out
}

pub fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

pub fn parse_u16_set_csv(value: &str) -> Result<HashSet<u16>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("list is empty".to_string());
    }
    let mut out = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let code: u16 = item
            .parse()
            .map_err(|_| format!("invalid status code '{item}'"))?;
        out.insert(code);
    }
    if out.is_empty() {
        return Err("list is empty".to_string());
    }
    Ok(out)
}

// list files are read as sets: trimmed, blank lines dropped, sorted and unique
pub fn normalize_list<I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
