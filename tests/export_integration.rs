//! End-to-end export tests against a mock portal.
//!
//! The mock serves a TOC page, per-unit pages referencing NOR documents,
//! and the NOR documents themselves; everything else answers 404, which
//! doubles as the miss signal for probing and suffix walks.

use std::time::Duration;

use ris_harvester::config::RisEndpoints;
use ris_harvester::export::{run_export, ExportOptions};
use ris_harvester::http::{create_client, RetryPolicy};
use ris_harvester::jsonl::JsonlWriter;
use ris_harvester::probe::ProbeLimits;
use ris_harvester::types::UnitKind;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Long enough to satisfy every minimum-body-length check.
fn padding(len: usize) -> String {
    format!("<!-- {} -->", "x".repeat(len))
}

const BODY_TEXT: &str = "Wer einen Vertrag schließt, hat die im redlichen Verkehr \
gebotene Sorgfalt anzuwenden und den anderen Teil über erhebliche Umstände aufzuklären.";

fn toc_link(gesetzesnummer: &str, par: &str, extra: &str) -> String {
    format!(
        "<li><a href=\"NormDokument.wxe?Abfrage=Bundesnormen&amp;Gesetzesnummer={gesetzesnummer}&amp;Paragraf={par}\">§ {par}</a>{extra}</li>"
    )
}

fn toc_page(entries: &str) -> String {
    format!(
        "<html><body><div id=\"content\"><ul>{entries}</ul></div>{}</body></html>",
        padding(2200)
    )
}

fn unit_page(nors: &[&str]) -> String {
    let links: String = nors
        .iter()
        .map(|nor| {
            format!("<a href=\"/Dokumente/Bundesnormen/{nor}/{nor}.html\">Dokument {nor}</a>")
        })
        .collect();
    format!(
        "<html><body><div id=\"content\">{links}</div>{}</body></html>",
        padding(600)
    )
}

fn document_page(heading: &str, nor: &str) -> String {
    format!(
        "<html><body><div id=\"content\"><div class=\"norm\"><h1>{heading}</h1>\
<p>{BODY_TEXT}</p><p>Dokumentnummer {nor}</p></div></div>{}</body></html>",
        padding(600)
    )
}

async fn mount_toc(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/NormDokument.wxe"))
        .and(query_param("Paragraf", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_unit(server: &MockServer, par: &str, body: String) {
    Mock::given(method("GET"))
        .and(path("/NormDokument.wxe"))
        .and(query_param("Paragraf", par))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_unit_error(server: &MockServer, par: &str, code: u16) {
    Mock::given(method("GET"))
        .and(path("/NormDokument.wxe"))
        .and(query_param("Paragraf", par))
        .respond_with(ResponseTemplate::new(code))
        .mount(server)
        .await;
}

async fn mount_document(server: &MockServer, nor: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/Dokumente/Bundesnormen/{nor}/{nor}.html")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_document_error(server: &MockServer, nor: &str, code: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/Dokumente/Bundesnormen/{nor}/{nor}.html")))
        .respond_with(ResponseTemplate::new(code))
        .mount(server)
        .await;
}

/// Fast options pointed at the mock server.
fn test_opts(base: &str, gesetzesnummer: &str) -> ExportOptions {
    let mut opts = ExportOptions::new("ABGB", gesetzesnummer, UnitKind::Paragraf);
    opts.delay = Duration::ZERO;
    opts.policy = RetryPolicy {
        max_attempts: 1,
        base_delay_ms: 1,
    };
    opts.limits = ProbeLimits {
        context_guess_cap: 0,
        delay_ms: 0,
        ..ProbeLimits::default()
    };
    opts.endpoints = RisEndpoints::with_base(base);
    opts
}

/// Portal for the TOC-tracked scenario: units 1, 2, 2a, 2b, 5..9 declared,
/// 3 repealed, 4 missing entirely; 6 fails at document fetch, 7 has no
/// text, 8 deduplicates onto 1's document, 9 fails at resolution.
async fn tracked_portal() -> MockServer {
    let server = MockServer::start().await;
    let g = "10001622";

    let entries = [
        toc_link(g, "1", ""),
        toc_link(g, "2", ""),
        toc_link(g, "2a", ""),
        toc_link(g, "2b", ""),
        toc_link(g, "3", " (aufgehoben)"),
        toc_link(g, "5", ""),
        toc_link(g, "6", ""),
        toc_link(g, "7", ""),
        toc_link(g, "8", ""),
        toc_link(g, "9", ""),
    ]
    .join("\n");
    mount_toc(&server, toc_page(&entries)).await;

    mount_unit(&server, "1", unit_page(&["NOR40000001"])).await;
    mount_unit(&server, "2", unit_page(&["NOR40000002"])).await;
    mount_unit(&server, "2a", unit_page(&["NOR40000021"])).await;
    mount_unit(&server, "2b", unit_page(&["NOR40000022"])).await;
    mount_unit(&server, "5", unit_page(&["NOR40000005"])).await;
    mount_unit(&server, "6", unit_page(&["NOR40000006"])).await;
    mount_unit(&server, "7", unit_page(&["NOR40000007"])).await;
    mount_unit(&server, "8", unit_page(&["NOR40000001"])).await; // shared document
    mount_unit_error(&server, "9", 500).await;

    mount_document(&server, "NOR40000001", document_page("§ 1", "NOR40000001")).await;
    mount_document(&server, "NOR40000002", document_page("§ 2", "NOR40000002")).await;
    mount_document(&server, "NOR40000021", document_page("§ 2a", "NOR40000021")).await;
    mount_document(&server, "NOR40000022", document_page("§ 2b", "NOR40000022")).await;
    mount_document(&server, "NOR40000005", document_page("§ 5", "NOR40000005")).await;
    mount_document_error(&server, "NOR40000006", 500).await;
    // Reachable but without any visible text.
    mount_document(
        &server,
        "NOR40000007",
        format!("<html><body>{}</body></html>", padding(600)),
    )
    .await;

    server
}

fn parse_lines(raw: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8(raw.to_vec())
        .expect("output is UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tracked_export_produces_dense_classified_sequence() {
    let server = tracked_portal().await;
    let uri = server.uri();

    let (summary, raw) = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        let opts = test_opts(&uri, "10001622");
        let summary = run_export(&client, &opts, &mut writer).expect("export");
        (summary, writer.into_inner())
    })
    .await
    .expect("join");

    let lines = parse_lines(&raw);
    let got: Vec<(String, String)> = lines
        .iter()
        .map(|v| {
            (
                v["unit"].as_str().expect("unit").to_string(),
                v["status"].as_str().expect("status").to_string(),
            )
        })
        .collect();

    let expected = [
        ("§ 1", "ok"),
        ("§ 2", "ok"),
        ("§ 2a", "ok"),
        ("§ 2b", "ok"),
        ("§ 3", "not_in_toc"),
        ("§ 4", "not_in_toc"),
        ("§ 5", "ok"),
        ("§ 6", "http_500"),
        ("§ 7", "empty_text"),
        ("§ 8", "no_nor_found"),
        ("§ 9", "resolve_failed"),
    ];
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(u, s)| (u.to_string(), s.to_string()))
        .collect();
    assert_eq!(got, expected);

    assert_eq!(summary.expected_base, 9);
    assert_eq!(summary.base_records, 9);
    assert_eq!(summary.suffix_records, 2);
    assert_eq!(summary.records_written, 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn records_carry_required_fields_and_text_invariant() {
    let server = tracked_portal().await;
    let uri = server.uri();

    let raw = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        run_export(&client, &test_opts(&uri, "10001622"), &mut writer).expect("export");
        writer.into_inner()
    })
    .await
    .expect("join");

    for line in parse_lines(&raw) {
        for field in ["law", "gesetzesnummer", "unit_type", "unit", "status", "text", "url", "retrieved_at"] {
            assert!(line.get(field).is_some(), "missing field {field}: {line}");
        }
        let status = line["status"].as_str().expect("status");
        let text = line["text"].as_str().expect("text");
        if status == "ok" {
            assert!(!text.is_empty(), "ok record without text: {line}");
        } else {
            assert!(text.is_empty(), "non-ok record with text: {line}");
        }
        assert_eq!(line["gesetzesnummer"], "10001622");
        assert_eq!(line["unit_type"], "paragraf");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn suffix_walk_stops_at_first_missing_letter() {
    let server = tracked_portal().await;
    let uri = server.uri();

    let raw = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        run_export(&client, &test_opts(&uri, "10001622"), &mut writer).expect("export");
        writer.into_inner()
    })
    .await
    .expect("join");

    let units: Vec<String> = parse_lines(&raw)
        .iter()
        .map(|v| v["unit"].as_str().expect("unit").to_string())
        .collect();

    assert!(units.contains(&"§ 2a".to_string()));
    assert!(units.contains(&"§ 2b".to_string()));
    assert!(!units.iter().any(|u| u == "§ 2c"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn export_is_idempotent_modulo_timestamps() {
    let server = tracked_portal().await;
    let uri = server.uri();

    let (first, second) = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let opts = test_opts(&uri, "10001622");

        let mut writer = JsonlWriter::new(Vec::new());
        run_export(&client, &opts, &mut writer).expect("first export");
        let first = writer.into_inner();

        let mut writer = JsonlWriter::new(Vec::new());
        run_export(&client, &opts, &mut writer).expect("second export");
        (first, writer.into_inner())
    })
    .await
    .expect("join");

    let strip = |raw: &[u8]| {
        parse_lines(raw)
            .into_iter()
            .map(|mut v| {
                v["retrieved_at"] = serde_json::Value::String(String::new());
                v
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
}

/// Portal without a TOC: units 1..4 plus 2a exist, everything else is 404.
/// The boundary has to come from the probe engine.
async fn probe_portal() -> MockServer {
    let server = MockServer::start().await;

    for (par, nor) in [
        ("1", "NOR50000001"),
        ("2", "NOR50000002"),
        ("2a", "NOR50000021"),
        ("3", "NOR50000003"),
        ("4", "NOR50000004"),
    ] {
        mount_unit(&server, par, unit_page(&[nor])).await;
        let heading = format!("§ {par}");
        mount_document(&server, nor, document_page(&heading, nor)).await;
    }

    server
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn probe_driven_export_discovers_boundary() {
    let server = probe_portal().await;
    let uri = server.uri();

    let (summary, raw) = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        let opts = test_opts(&uri, "10002296");
        let summary = run_export(&client, &opts, &mut writer).expect("export");
        (summary, writer.into_inner())
    })
    .await
    .expect("join");

    let got: Vec<(String, String)> = parse_lines(&raw)
        .iter()
        .map(|v| {
            (
                v["unit"].as_str().expect("unit").to_string(),
                v["status"].as_str().expect("status").to_string(),
            )
        })
        .collect();

    let expected = [
        ("§ 1", "ok"),
        ("§ 2", "ok"),
        ("§ 2a", "ok"),
        ("§ 3", "ok"),
        ("§ 4", "ok"),
    ];
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(u, s)| (u.to_string(), s.to_string()))
        .collect();
    assert_eq!(got, expected);

    assert_eq!(summary.end, 4);
    assert_eq!(summary.expected_base, 4);
    assert_eq!(summary.suffix_records, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_fallback_bounds_a_dead_portal() {
    // Nothing mounted: every request answers 404. The probe finds no
    // unit 1, so the registry fallback bound drives a dense sequence of
    // not_found placeholders.
    let server = MockServer::start().await;
    let uri = server.uri();

    let (summary, raw) = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        let mut opts = test_opts(&uri, "99990001");
        opts.fallback_end = Some(3);
        let summary = run_export(&client, &opts, &mut writer).expect("export");
        (summary, writer.into_inner())
    })
    .await
    .expect("join");

    let got: Vec<(String, String)> = parse_lines(&raw)
        .iter()
        .map(|v| {
            (
                v["unit"].as_str().expect("unit").to_string(),
                v["status"].as_str().expect("status").to_string(),
            )
        })
        .collect();

    let expected: Vec<(String, String)> = [
        ("§ 1", "not_found"),
        ("§ 2", "not_found"),
        ("§ 3", "not_found"),
    ]
    .iter()
    .map(|(u, s)| (u.to_string(), s.to_string()))
    .collect();
    assert_eq!(got, expected);
    assert_eq!(summary.records_written, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unresolvable_boundary_is_fatal() {
    let server = MockServer::start().await;
    let uri = server.uri();

    let result = tokio::task::spawn_blocking(move || {
        let client = create_client().expect("client");
        let mut writer = JsonlWriter::new(Vec::new());
        let opts = test_opts(&uri, "99990001");
        run_export(&client, &opts, &mut writer)
    })
    .await
    .expect("join");

    let err = result.expect_err("no boundary should be resolvable");
    assert!(
        err.to_string().contains("No unit boundary determinable"),
        "unexpected error: {err}"
    );
}
