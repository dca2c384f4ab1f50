//! AbsHttpClient against a loopback HTTP stub

use labour_force_fetcher::downloader::{ApiKey, RateLimiter};
use labour_force_fetcher::fetcher::{AbsHttpClient, CombinationFetcher, FetchOutcome, FetcherError};
use labour_force_fetcher::grid::Combination;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serve one canned response; the task yields the raw request head
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/lfs", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (url, task)
}

fn client(url: String) -> AbsHttpClient {
    AbsHttpClient::new(
        Arc::new(reqwest::Client::new()),
        url,
        ApiKey::new("test-key-0123456789"),
        Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
    )
}

fn combination() -> Combination {
    Combination::new("VICTORIA", "LABOUR_FORCE", "15_AND_OVER", "PERSONS", "TREND")
}

#[tokio::test]
async fn test_records_under_named_key_and_request_shape() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"labour_force_statistics": [
            {"region_description": "Victoria", "observation_month": "2024-04", "observation_value": 3612.5},
            {"region_description": "Victoria", "observation_month": "2024-05", "observation_value": null}
        ]}"#,
    )
    .await;

    let outcome = client(url).fetch(&combination()).await;
    let FetchOutcome::Records(records) = outcome else {
        panic!("expected records, got {outcome:?}");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("observation_value"), Some("3612.5"));
    assert_eq!(records[1].get("observation_value"), Some(""));

    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("get /lfs?"));
    assert!(request.contains("region=victoria"));
    assert!(request.contains("data_item=labour_force"));
    assert!(request.contains("age=15_and_over"));
    assert!(request.contains("sex=persons"));
    assert!(request.contains("adjustment_type=trend"));
    assert!(request.contains("apikey: test-key-0123456789"));
    assert!(request.contains("accept: application/json"));
}

#[tokio::test]
async fn test_bare_list_and_data_key() {
    let (url, _server) = serve_once("200 OK", r#"[{"observation_month": "2024-01"}]"#).await;
    assert!(matches!(
        client(url).fetch(&combination()).await,
        FetchOutcome::Records(records) if records.len() == 1
    ));

    let (url, _server) = serve_once("200 OK", r#"{"data": [{"observation_month": "2024-01"}, {"observation_month": "2024-02"}]}"#).await;
    assert!(matches!(
        client(url).fetch(&combination()).await,
        FetchOutcome::Records(records) if records.len() == 2
    ));
}

#[tokio::test]
async fn test_unrecognized_body_yields_no_records() {
    let (url, _server) = serve_once("200 OK", r#"{"message": "ok"}"#).await;
    assert!(matches!(
        client(url).fetch(&combination()).await,
        FetchOutcome::Records(records) if records.is_empty()
    ));
}

#[tokio::test]
async fn test_not_found_is_not_available() {
    let (url, _server) = serve_once("404 Not Found", r#"{"error": "no data"}"#).await;
    assert!(matches!(
        client(url).fetch(&combination()).await,
        FetchOutcome::NotAvailable
    ));
}

#[tokio::test]
async fn test_server_error_is_failure() {
    let (url, _server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#).await;
    match client(url).fetch(&combination()).await {
        FetchOutcome::Failure(FetcherError::HttpError(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("boom"));
        }
        other => panic!("expected HTTP failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_key_is_fatal() {
    let (url, _server) = serve_once("401 Unauthorized", r#"{"error": "invalid key"}"#).await;
    match client(url).fetch(&combination()).await {
        FetchOutcome::Failure(e) => {
            assert!(matches!(e, FetcherError::Unauthorized { status: 401 }));
            assert!(e.is_fatal());
        }
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_json_is_parse_failure() {
    let (url, _server) = serve_once("200 OK", "{not json").await;
    assert!(matches!(
        client(url).fetch(&combination()).await,
        FetchOutcome::Failure(FetcherError::ParseError(_))
    ));
}
