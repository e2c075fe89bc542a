//! Tests for `HttpJobApi` against a one-shot local HTTP responder.

use assert_matches::assert_matches;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use quill_client::api::{HttpJobApi, JobApi};
use quill_client::error::TransportError;
use quill_core::job::Phase;
use quill_core::request::GenerateRequest;
use quill_core::types::JobId;

/// Serve one request with `status` and a JSON `body`; the join handle
/// yields the raw request text.
async fn serve_once(status: &'static str, body: impl Into<String>) -> (String, JoinHandle<String>) {
    let body = body.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (url, server)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

const STATUS_BODY: &str = r#"{
    "job_id": "7f0c",
    "status": "completed",
    "progress": 100.0,
    "topic": "Async Rust",
    "created_at": "2026-01-05T10:00:00",
    "completed_at": "2026-01-05T10:04:12",
    "result": {"title": "Async Rust", "word_count": 1320, "seo_score": 87.5},
    "error": null,
    "logs": [{"message": "Done", "timestamp": "2026-01-05T10:04:12"}]
}"#;

#[tokio::test]
async fn create_job_posts_request() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"job_id":"7f0c","status":"queued","message":"Content generation started for: Async Rust"}"#,
    )
    .await;

    let created = HttpJobApi::new(url)
        .create_job(&GenerateRequest::new("Async Rust").with_tags(vec!["tokio".into()]))
        .await
        .unwrap();

    assert_eq!(created.job_id, JobId::new("7f0c"));
    assert_eq!(created.status, "queued");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/generate/ HTTP/1.1"), "{request}");
    assert!(request.contains(r#""topic":"Async Rust""#), "{request}");
    assert!(request.contains(r#""length":"medium""#), "{request}");
    assert!(request.contains(r#""tags":["tokio"]"#), "{request}");
}

#[tokio::test]
async fn poll_status_reduces_record_to_report() {
    let (url, server) = serve_once("200 OK", STATUS_BODY).await;

    let report = HttpJobApi::new(url)
        .poll_status(&JobId::new("7f0c"))
        .await
        .unwrap();

    assert_eq!(report.phase, Phase::Completed);
    assert_eq!(report.progress, 100);
    let result = report.result.unwrap();
    assert_eq!(result.word_count, Some(1320));
    assert_eq!(result.seo_score, Some(87.5));
    assert!(server
        .await
        .unwrap()
        .starts_with("GET /api/generate/status/7f0c HTTP/1.1"));
}

#[tokio::test]
async fn list_jobs_sends_limit_and_status_filter() {
    let (url, server) = serve_once("200 OK", format!("[{STATUS_BODY}]")).await;

    let jobs = HttpJobApi::new(url)
        .list_jobs(5, Some(Phase::Completed))
        .await
        .unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].logs.len(), 1);
    assert!(server
        .await
        .unwrap()
        .starts_with("GET /api/generate/jobs?limit=5&status=completed HTTP/1.1"));
}

#[tokio::test]
async fn delete_job_returns_message() {
    let (url, server) = serve_once("200 OK", r#"{"message":"Job 7f0c deleted"}"#).await;

    let response = HttpJobApi::new(url)
        .delete_job(&JobId::new("7f0c"))
        .await
        .unwrap();

    assert_eq!(response.message, "Job 7f0c deleted");
    assert!(server
        .await
        .unwrap()
        .starts_with("DELETE /api/generate/jobs/7f0c HTTP/1.1"));
}

#[tokio::test]
async fn error_status_becomes_api_error() {
    let (url, _server) = serve_once("404 Not Found", r#"{"detail":"Job not found"}"#).await;

    let result = HttpJobApi::new(url).poll_status(&JobId::new("gone")).await;

    assert_matches!(
        result,
        Err(TransportError::Api { status: 404, body }) if body.contains("Job not found")
    );
}

#[tokio::test]
async fn unknown_status_is_a_decode_error() {
    let (url, _server) = serve_once(
        "200 OK",
        r#"{"job_id":"7f0c","status":"paused","progress":10}"#,
    )
    .await;

    let result = HttpJobApi::new(url).poll_status(&JobId::new("7f0c")).await;

    assert_matches!(result, Err(TransportError::Decode(_)));
}
