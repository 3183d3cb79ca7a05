//! HTTP range fetcher against a mock server

mod common;

use common::stock_csv;
use std::sync::Arc;
use stockimport_common::ImportError;
use stockimport_ingest::fetcher::{HttpRangeFetcher, RangeFetcher};
use stockimport_ingest::pipeline::{ImportPipeline, PipelineOptions};
use stockimport_ingest::sink::MemorySink;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

/// Answers `Range: bytes=a-b` requests from a fixed body
struct RangeResponder {
    body: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split_once('-'))
            .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)));

        match range {
            Some((start, end)) if start < self.body.len() => {
                let end = end.min(self.body.len() - 1);
                ResponseTemplate::new(206)
                    .insert_header(
                        "content-range",
                        format!("bytes {}-{}/{}", start, end, self.body.len()),
                    )
                    .set_body_bytes(self.body[start..=end].to_vec())
            },
            Some(_) => ResponseTemplate::new(416)
                .insert_header("content-range", format!("bytes */{}", self.body.len())),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        }
    }
}

async fn serve(body: &[u8]) -> MockServer {
    let server = MockServer::start().await;

    // no HEAD support: size comes from a one-byte ranged GET
    Mock::given(method("HEAD"))
        .and(path("/stock.csv"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/stock.csv"))
        .respond_with(RangeResponder {
            body: body.to_vec(),
        })
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_size_from_ranged_get() {
    let body = stock_csv(10);
    let server = serve(body.as_bytes()).await;
    let fetcher = HttpRangeFetcher::new(None).unwrap();

    let size = fetcher
        .size(&format!("{}/stock.csv", server.uri()))
        .await
        .unwrap();

    assert_eq!(size, body.len() as u64);
}

#[tokio::test]
async fn test_fetch_range_sends_inclusive_range_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stock.csv"))
        .and(header("range", "bytes=10-19"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123456789".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpRangeFetcher::new(None).unwrap();
    let data = fetcher
        .fetch_range(&format!("{}/stock.csv", server.uri()), 10, 10)
        .await
        .unwrap();

    assert_eq!(data, b"0123456789");
}

#[tokio::test]
async fn test_missing_resource() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/missing.csv"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpRangeFetcher::new(None).unwrap();
    let err = fetcher
        .size(&format!("{}/missing.csv", server.uri()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_server_ignoring_range_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stock.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"whole file".to_vec()))
        .mount(&server)
        .await;

    let fetcher = HttpRangeFetcher::new(None).unwrap();
    let uri = format!("{}/stock.csv", server.uri());

    assert!(fetcher.fetch_range(&uri, 3, 4).await.is_err());
    // a 200 is fine when the range is the whole body
    assert_eq!(fetcher.fetch_range(&uri, 0, 10).await.unwrap(), b"whole file");
}

#[tokio::test]
async fn test_import_over_http() {
    let body = stock_csv(50);
    let server = serve(body.as_bytes()).await;

    let sink = Arc::new(MemorySink::new());
    let pipeline = ImportPipeline::new(
        Arc::new(HttpRangeFetcher::new(None).unwrap()),
        sink.clone(),
        PipelineOptions::new(256),
    );

    let summary = pipeline
        .run(&format!("{}/stock.csv", server.uri()))
        .await
        .unwrap();

    assert_eq!(summary.elements_saved, 50);
    assert_eq!(sink.elements().len(), 50);
}

#[tokio::test]
async fn test_http_error_becomes_fetch_error() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/stock.csv"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    // the size request succeeds, every data range fails
    Mock::given(method("GET"))
        .and(path("/stock.csv"))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/100")
                .set_body_bytes(b"P".to_vec()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stock.csv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pipeline = ImportPipeline::new(
        Arc::new(HttpRangeFetcher::new(None).unwrap()),
        Arc::new(MemorySink::new()),
        PipelineOptions::new(64),
    );

    let err = pipeline
        .run(&format!("{}/stock.csv", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Fetch { chunk: Some(0), .. }));
}
