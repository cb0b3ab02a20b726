use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chapter_harvester::fetcher::{FetchOutcome, ImageJob};
use chapter_harvester::http_client::{HttpClientConfig, HttpError, HttpSource, ReqwestSource};
use chapter_harvester::{CacheStore, ImageFetcher, RecordingReporter};

/// The blocking client must run outside the runtime that serves the mocks
fn start_server(rt: &Runtime) -> MockServer {
    rt.block_on(MockServer::start())
}

fn source() -> ReqwestSource {
    ReqwestSource::with_config(HttpClientConfig {
        timeout: Duration::from_secs(5),
        rotate_user_agent: false,
        ..HttpClientConfig::default()
    })
    .unwrap()
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

fn count(rt: &Runtime, server: &MockServer, verb: &str) -> usize {
    rt.block_on(server.received_requests())
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb)
        .count()
}

#[test]
fn test_fetch_streams_body() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    let body = vec![3u8; 64 * 1024];
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/img/001.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server),
    );

    let mut sink = Vec::new();
    let written = source().fetch(&url(&server, "/img/001.webp"), &mut sink).unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(sink, body);
}

#[test]
fn test_fetch_rejects_non_ok_status() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(
        Mock::given(method("GET"))
            .and(path("/img/missing.webp"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server),
    );

    let mut sink = Vec::new();
    let result = source().fetch(&url(&server, "/img/missing.webp"), &mut sink);

    assert!(matches!(result, Err(HttpError::Status(404))));
    assert!(sink.is_empty());
}

#[test]
fn test_head_reports_status_and_length() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(
        Mock::given(method("HEAD"))
            .and(path("/img/small.webp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "30000")
                    .set_body_bytes(vec![0u8; 30_000]),
            )
            .mount(&server),
    );

    let head = source().head(&url(&server, "/img/small.webp")).unwrap();
    assert_eq!(head.status, 200);
    assert_eq!(head.reported_length(), Some(30_000));

    let missing = source().head(&url(&server, "/img/other.webp")).unwrap();
    assert_eq!(missing.status, 404);
    assert_eq!(missing.reported_length(), None);
}

#[test]
fn test_small_image_is_never_downloaded() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    rt.block_on(async {
        Mock::given(method("HEAD"))
            .and(path("/img/thumb.webp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "30000")
                    .set_body_bytes(vec![0u8; 30_000]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/thumb.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 30_000]))
            .mount(&server)
            .await;
    });

    let dir = tempfile::tempdir().unwrap();
    let chapter = dir.path().join("1");
    std::fs::create_dir_all(&chapter).unwrap();
    let fetcher = ImageFetcher::new(
        source(),
        CacheStore::new(dir.path().join("cache"), 40 * 1024),
        Arc::new(RecordingReporter::new()),
    );
    let page = url(&server, "/read/ch-1");
    let job = ImageJob {
        index: 1,
        source: "/img/thumb.webp".to_string(),
    };

    let outcome = fetcher.fetch_one(&page, &job, &chapter);

    assert!(matches!(outcome, FetchOutcome::TooSmall { bytes: 30_000, .. }));
    assert_eq!(count(&rt, &server, "HEAD"), 1);
    assert_eq!(count(&rt, &server, "GET"), 0);
    assert_eq!(std::fs::read_dir(&chapter).unwrap().count(), 0);
}

#[test]
fn test_large_image_lands_in_cache_and_chapter() {
    let rt = Runtime::new().unwrap();
    let server = start_server(&rt);
    let body = vec![8u8; 50_000];
    rt.block_on(
        Mock::given(path("/img/page.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server),
    );

    let dir = tempfile::tempdir().unwrap();
    let chapter = dir.path().join("1");
    std::fs::create_dir_all(&chapter).unwrap();
    let cache = CacheStore::new(dir.path().join("cache"), 40 * 1024);
    let entry = cache.entry_path(&url(&server, "/img/page.webp"), ".webp");
    let fetcher = ImageFetcher::new(source(), cache, Arc::new(RecordingReporter::new()));

    let job = ImageJob {
        index: 2,
        source: "/img/page.webp".to_string(),
    };
    let outcome = fetcher.fetch_one(&url(&server, "/read/ch-1"), &job, &chapter);

    assert!(matches!(outcome, FetchOutcome::Downloaded { bytes: 50_000, .. }));
    assert_eq!(std::fs::read(&entry).unwrap(), body);
    assert_eq!(std::fs::read(chapter.join("imagen_002.webp")).unwrap(), body);
}
