//! End-to-end tests for the HTTP surface
//!
//! Most requests go straight through the router with `oneshot`; the
//! WebSocket tests bind a real listener so the upgrade can complete.

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use futures_util::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tower::ServiceExt;
use wisp_core::TransferId;
use wisp_integration_tests::{TEST_PASSWORD, file_count, test_state};
use wisp_server::{AppState, router};

const PASSWORD_HEADER: &str = "x-upload-password";

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn raw_upload(path: &str, password: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::put(path).header(header::HOST, "drop.test");
    if let Some(password) = password {
        builder = builder.header(PASSWORD_HEADER, password);
    }
    builder.body(body.into()).unwrap()
}

/// Pull the identifier out of the "Download URL:" line
fn id_from_message(message: &str) -> TransferId {
    let url = message
        .lines()
        .find_map(|line| line.strip_prefix("Download URL: "))
        .expect("no download URL in response");
    url.rsplit('/').next().unwrap().parse().unwrap()
}

fn uploads(dir: &Path) -> std::path::PathBuf {
    dir.join("uploads")
}

/// Delivered bytes are removed off the runtime thread; give it a moment
async fn wait_for_empty(dir: &Path) {
    for _ in 0..200 {
        if file_count(dir) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} still has files", dir.display());
}

fn download_request(method: Method, id: &TransferId) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(format!("/download/{id}"))
        .body(Body::empty())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Upload and download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_raw_upload_then_single_download() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, _, body) = send(
        &state,
        raw_upload("/hello.txt", Some(TEST_PASSWORD), "hello, wisp"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let message = String::from_utf8(body).unwrap();
    assert!(message.starts_with("File uploaded successfully!\n"));
    assert!(message.contains("Original name: hello.txt\n"));
    assert!(message.contains("http://drop.test/download/"));
    assert!(message.contains("cURL command: curl -o \"hello.txt\" "));
    assert_eq!(file_count(&uploads(dir.path())), 1);

    let id = id_from_message(&message);
    let (status, headers, body) = send(
        &state,
        Request::get(format!("/download/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello, wisp");
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(headers[header::CONTENT_LENGTH], "11");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("hello.txt"));

    // Bytes are gone once the body has been read
    wait_for_empty(&uploads(dir.path())).await;

    let (status, _, _) = send(
        &state,
        Request::get(format!("/download/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_leaves_transfer_downloadable() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, _, body) = send(
        &state,
        raw_upload("/a.txt", Some(TEST_PASSWORD), "peek, don't take"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = id_from_message(&String::from_utf8(body).unwrap());
    let watcher = std::sync::Arc::new(wisp_integration_tests::RecordingSink::default());
    let _ = state.store.subscribe(&id, watcher.clone());

    let (status, headers, body) = send(&state, download_request(Method::HEAD, &id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers[header::CONTENT_LENGTH], "16");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("a.txt")
    );
    assert!(watcher.events().is_empty());
    assert_eq!(file_count(&uploads(dir.path())), 1);

    let (status, _, body) = send(&state, download_request(Method::GET, &id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"peek, don't take");
    assert_eq!(watcher.events(), vec![wisp_core::TransferEvent::Delivered]);

    let (status, _, _) = send(&state, download_request(Method::HEAD, &id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_unknown_id_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let id = TransferId::generate().unwrap();
    let (status, _, _) = send(&state, download_request(Method::HEAD, &id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_password_in_query() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let request = Request::post("/notes.md?password=correct%20horse")
        .header(header::HOST, "drop.test")
        .body(Body::from("# notes"))
        .unwrap();
    let (status, _, _) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.store.len(), 1);
}

#[tokio::test]
async fn test_upload_wrong_password_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let (status, _, _) = send(&state, raw_upload("/x.bin", Some("nope"), "data")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&state, raw_upload("/x.bin", None, "data")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(file_count(&uploads(dir.path())), 0);
    assert!(state.store.is_empty());
}

#[tokio::test]
async fn test_upload_declared_length_over_limit() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let request = Request::put("/big.bin")
        .header(PASSWORD_HEADER, TEST_PASSWORD)
        .header(header::CONTENT_LENGTH, (2u64 << 20).to_string())
        .body(Body::from("small"))
        .unwrap();
    let (status, _, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, b"File too large (max: 1 MB)");
    assert_eq!(file_count(&uploads(dir.path())), 0);
}

#[tokio::test]
async fn test_upload_streamed_body_over_limit() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let oversized = vec![0u8; (1 << 20) + 1];
    let (status, _, _) = send(&state, raw_upload("/big.bin", Some(TEST_PASSWORD), oversized)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(file_count(&uploads(dir.path())), 0);
    assert!(state.store.is_empty());
}

#[tokio::test]
async fn test_upload_exactly_at_limit_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let exact = vec![7u8; 1 << 20];
    let (status, _, _) = send(&state, raw_upload("/exact.bin", Some(TEST_PASSWORD), exact)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.store.len(), 1);
}

fn multipart_body(boundary: &str, password: Option<&str>, file: Option<(&str, &str)>) -> String {
    let mut body = String::new();
    if let Some(password) = password {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"password\"\r\n\
             \r\n{password}\r\n"
        ));
    }
    if let Some((name, contents)) = file {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

fn multipart_request(body: String) -> Request<Body> {
    Request::post("/")
        .header(header::HOST, "drop.test")
        .header(
            header::CONTENT_TYPE,
            "multipart/form-data; boundary=wispboundary",
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_multipart_upload_with_password_field() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let body = multipart_body(
        "wispboundary",
        Some(TEST_PASSWORD),
        Some(("report.pdf", "%PDF-fake")),
    );
    let (status, _, body) = send(&state, multipart_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let message = String::from_utf8(body).unwrap();
    assert!(message.contains("Original name: report.pdf\n"));
    let id = id_from_message(&message);
    assert_eq!(state.store.get(&id).unwrap().display_name, "report.pdf");
}

#[tokio::test]
async fn test_multipart_wrong_password_discards_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let body = multipart_body("wispboundary", Some("nope"), Some(("a.txt", "secret")));
    let (status, _, _) = send(&state, multipart_request(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(file_count(&uploads(dir.path())), 0);
    assert!(state.store.is_empty());
}

#[tokio::test]
async fn test_multipart_without_file_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let body = multipart_body("wispboundary", Some(TEST_PASSWORD), None);
    let (status, _, _) = send(&state, multipart_request(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(file_count(&uploads(dir.path())), 0);
}

#[tokio::test]
async fn test_download_malformed_or_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    for path in [
        "/download/not-hex".to_string(),
        "/download/abcd".to_string(),
        format!("/download/{}", TransferId::generate().unwrap()),
    ] {
        let (status, _, body) = send(&state, Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"File not found");
    }
}

// ---------------------------------------------------------------------------
// Auxiliary routes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let ok = Request::post("/login")
        .header(PASSWORD_HEADER, TEST_PASSWORD)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&state, ok).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);

    let bad = Request::post("/login")
        .header(PASSWORD_HEADER, "nope")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&state, bad).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_config() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let request = Request::get("/config").body(Body::empty()).unwrap();
    let (status, _, body) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["isDefaultPassword"], false);
    assert_eq!(json["fileExpiryMinutes"], 1);
    assert_eq!(json["maxFileSizeMB"], 1);
}

#[tokio::test]
async fn test_static_index_served() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    std::fs::write(dir.path().join("public/index.html"), "<h1>wisp</h1>").unwrap();

    let (status, _, body) = send(&state, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>wisp</h1>");
}

// ---------------------------------------------------------------------------
// WebSocket watchers
// ---------------------------------------------------------------------------

async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn wait_for_watcher(state: &AppState, id: &TransferId) {
    for _ in 0..200 {
        if state.store.watcher_count(id) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("watcher never attached");
}

fn event_of(message: Message) -> serde_json::Value {
    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watcher_sees_delivery_then_close() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let addr = spawn_server(state.clone()).await;

    let id = state
        .store
        .register_default(dir.path().join("uploads/none"), "a.txt")
        .unwrap();
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{id}"))
        .await
        .unwrap();
    wait_for_watcher(&state, &id).await;

    state.store.consume(&id).unwrap();

    let event = event_of(socket.next().await.unwrap().unwrap());
    assert_eq!(event["event"], "delivered");
    assert_eq!(event["identifier"], id.to_string());

    match socket.next().await {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watcher_receives_broadcast_message() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let addr = spawn_server(state.clone()).await;

    let id = state
        .store
        .register_default(dir.path().join("uploads/none"), "")
        .unwrap();
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{id}"))
        .await
        .unwrap();
    wait_for_watcher(&state, &id).await;

    let sent = state
        .store
        .broadcast(&id, serde_json::json!({ "progress": 50 }))
        .unwrap();
    assert_eq!(sent, 1);

    let event = event_of(socket.next().await.unwrap().unwrap());
    assert_eq!(event["event"], "message");
    assert_eq!(event["detail"]["progress"], 50);
    assert!(state.store.get(&id).is_ok());
}

#[tokio::test]
async fn test_watcher_on_unknown_transfer_told_gone() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let addr = spawn_server(state.clone()).await;

    let id = TransferId::generate().unwrap();
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{id}"))
        .await
        .unwrap();

    let event = event_of(socket.next().await.unwrap().unwrap());
    assert_eq!(event["event"], "gone");
    assert_eq!(event["identifier"], id.to_string());
}

#[tokio::test]
async fn test_watcher_disconnect_unsubscribes() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let addr = spawn_server(state.clone()).await;

    let id = state
        .store
        .register_default(dir.path().join("uploads/none"), "")
        .unwrap();
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{id}"))
        .await
        .unwrap();
    wait_for_watcher(&state, &id).await;

    socket.close(None).await.unwrap();
    drop(socket);

    for _ in 0..200 {
        if state.store.watcher_count(&id) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.store.watcher_count(&id), 0);
    assert!(state.store.get(&id).is_ok());
}

#[tokio::test]
async fn test_watcher_foreign_origin_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let addr = spawn_server(state.clone()).await;

    let id = TransferId::generate().unwrap();
    let mut request = format!("ws://{addr}/ws/{id}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static("https://evil.example"));

    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 403);
        }
        other => panic!("expected 403, got {:?}", other.map(|(_, r)| r.status())),
    }
}
