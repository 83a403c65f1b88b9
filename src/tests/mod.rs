use std::collections::HashSet;
use std::path::Path;

use crate::probe::testing::FakeTransport;
use crate::runner::{Options, Runner, ScanSummary};

struct Scan {
    dir: tempfile::TempDir,
    options: Options,
}

fn write_list(dir: &Path, name: &str, lines: &[&str]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n")).unwrap();
    path.to_str().unwrap().to_string()
}

impl Scan {
    fn new(targets: &[&str], words: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let options = Options {
            target_list: Some(write_list(dir.path(), "targets.txt", targets)),
            word_list: Some(write_list(dir.path(), "words.txt", words)),
            output: Some(dir.path().join("found.txt").to_str().unwrap().to_string()),
            threads: 2,
            max_sockets: 4,
            show_progress: false,
            ..Options::default()
        };
        Self { dir, options }
    }

    fn list(&mut self, name: &str, lines: &[&str]) -> String {
        write_list(self.dir.path(), name, lines)
    }

    fn run<F>(&self, transport: F) -> (ScanSummary, Vec<String>)
    where
        F: Fn() -> FakeTransport + Sync,
    {
        let runner = Runner::new(self.options.clone()).unwrap();
        let summary = runner.run_with(|| Ok(transport())).unwrap();
        let raw = std::fs::read_to_string(self.dir.path().join("found.txt")).unwrap();
        let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();
        lines.sort();
        (summary, lines)
    }
}

#[test]
fn every_candidate_is_probed_exactly_once() {
    let words: Vec<String> = (0..120).map(|i| format!("page{i}")).collect();
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let scan = Scan::new(&["http://a.com", "http://b.com/"], &word_refs);

    let (summary, lines) = scan.run(|| {
        let mut transport = FakeTransport::new();
        for word in words.iter() {
            for host in ["a.com", "b.com"] {
                let body = format!("{host} {word}");
                transport = transport.respond(&format!("{host}/{word}"), 403, &body);
            }
        }
        transport
    });

    assert_eq!(summary.targets, 2);
    assert_eq!(summary.words, 120);
    assert_eq!(summary.candidates, 240);
    assert_eq!(summary.results_written, 240);
    assert_eq!(lines.len(), 240);
    let unique: HashSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), 240);
    assert!(lines.contains(&"http://b.com/page7, page7, 403".to_string()));
}

#[test]
fn exempt_and_unlisted_statuses_are_dropped() {
    let mut scan = Scan::new(&["http://a.com"], &["admin", "backup", "missing", "teapot"]);
    scan.options.accepted_status = HashSet::from([200, 403]);
    scan.options.exempt_status = HashSet::from([403, 404]);

    let (_, lines) = scan.run(|| {
        FakeTransport::new()
            .respond("a.com/admin", 403, "forbidden")
            .respond("a.com/backup", 200, "backup index")
            .respond("a.com/teapot", 418, "short and stout")
    });

    assert_eq!(lines, vec!["http://a.com/backup, backup, 200"]);
}

#[test]
fn identical_bodies_are_reported_once() {
    let scan = Scan::new(&["http://a.com"], &["one", "three", "two"]);

    let (summary, lines) = scan.run(|| {
        FakeTransport::new()
            .respond("a.com/one", 403, "custom soft 404 page")
            .respond("a.com/two", 403, "custom soft 404 page")
            .respond("a.com/three", 401, "real login")
    });

    assert_eq!(summary.results_written, 2);
    assert_eq!(lines.len(), 2);
    assert!(lines.contains(&"http://a.com/three, three, 401".to_string()));
}

#[test]
fn exception_words_suppress_results() {
    let mut scan = Scan::new(&["http://a.com"], &["gone", "kept"]);
    let exceptions = scan.list("exceptions.txt", &["page not found"]);
    scan.options.exceptions = Some(exceptions);

    let (_, lines) = scan.run(|| {
        FakeTransport::new()
            .respond("a.com/gone", 403, "<h1>Page Not Found</h1>")
            .respond("a.com/kept", 403, "<h1>Forbidden</h1>")
    });

    assert_eq!(lines, vec!["http://a.com/kept, kept, 403"]);
}

#[test]
fn redirects_are_followed_to_their_final_status() {
    let scan = Scan::new(&["http://a.com"], &["old", "secure"]);

    let (summary, lines) = scan.run(|| {
        FakeTransport::new()
            .redirect("a.com/old", 301, "/new")
            .respond("a.com/new", 403, "the new place")
            .redirect("a.com/secure", 302, "https://login.a.com/portal")
            .respond("login.a.com/portal", 401, "portal login")
    });

    assert_eq!(summary.tls_sessions, 1);
    assert_eq!(
        lines,
        vec![
            "http://a.com/new, new, 403",
            "https://login.a.com/portal, portal, 401",
        ]
    );
}

#[test]
fn unreachable_targets_report_timeouts() {
    let mut scan = Scan::new(&["http://dead.com", "https://tls.com"], &["admin"]);
    scan.options.max_send = 2;

    let (summary, lines) = scan.run(|| {
        FakeTransport::new()
            .unresolvable("dead.com")
            .refuse_tls("tls.com")
    });

    assert_eq!(summary.timeouts, 2);
    assert_eq!(
        lines,
        vec![
            "http://dead.com/admin, admin, 408",
            "https://tls.com/admin, admin, 408",
        ]
    );
}

#[test]
fn timeouts_are_silent_when_408_is_not_accepted() {
    let mut scan = Scan::new(&["http://dead.com"], &["admin"]);
    scan.options.accepted_status = HashSet::from([200]);

    let (_, lines) = scan.run(|| FakeTransport::new().unresolvable("dead.com"));

    assert!(lines.is_empty());
}

#[test]
fn proxied_requests_reach_the_origin() {
    let mut scan = Scan::new(&["http://a.com"], &["admin"]);
    let proxies = scan.list("proxies.txt", &["proxy.local:8080"]);
    scan.options.proxy_list = Some(proxies);

    let (_, lines) = scan.run(|| FakeTransport::new().respond("a.com/admin", 401, "admin"));

    assert_eq!(lines, vec!["http://a.com/admin, admin, 401"]);
}

#[test]
fn signature_hits_are_flushed_as_json() {
    let mut scan = Scan::new(&["http://a.com"], &["config", "readme"]);
    let signatures = scan.list(
        "signatures.json",
        &[r#"[
            {"type": "string", "alertDescription": "leaked key", "signatures": ["API_KEY"]},
            {"type": "regex", "alertDescription": "readme page", "signatures": ["read me[a-z ]*"]}
        ]"#],
    );
    let hits_path = scan.dir.path().join("hits.json");
    scan.options.signatures = Some(signatures);
    scan.options.signature_output = Some(hits_path.to_str().unwrap().to_string());

    let (summary, lines) = scan.run(|| {
        FakeTransport::new()
            .respond("a.com/config", 200, "api_key=abc")
            .respond("a.com/readme", 403, "read me first")
            .respond("a.com/", 200, "landing")
    });

    // the bare target is probed too when signatures are on
    assert_eq!(summary.candidates, 3);
    assert_eq!(
        lines,
        vec![
            "http://a.com, /, 200",
            "http://a.com/config, config, 200",
            "http://a.com/readme, readme, 403",
        ]
    );
    assert_eq!(summary.signature_hits, 2);
    assert_eq!(summary.signature_file.as_deref(), Some(hits_path.as_path()));

    let raw = std::fs::read_to_string(&hits_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let mut hits: Vec<(String, String, String, String)> = parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| {
            (
                hit["found_in"].as_str().unwrap().to_string(),
                hit["string"].as_str().unwrap().to_string(),
                hit["alert"].as_str().unwrap().to_string(),
                hit["search_type"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    hits.sort();
    assert_eq!(
        hits,
        vec![
            (
                "http://a.com/config".to_string(),
                "api_key".to_string(),
                "leaked key".to_string(),
                "string_search".to_string(),
            ),
            (
                "http://a.com/readme".to_string(),
                "read me first".to_string(),
                "readme page".to_string(),
                "regex".to_string(),
            ),
        ]
    );
}

#[test]
fn missing_word_list_file_fails_before_scanning() {
    let mut scan = Scan::new(&["http://a.com"], &["admin"]);
    scan.options.word_list = Some(scan.dir.path().join("nope.txt").to_str().unwrap().to_string());

    let runner = Runner::new(scan.options.clone()).unwrap();
    let result = runner.run_with(|| Ok(FakeTransport::new()));
    assert!(matches!(
        result,
        Err(crate::runner::RunnerError::FileOpen { kind: "word list", .. })
    ));
}
