//! HTTP API tests. The router is driven in-process with `tower::ServiceExt`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use doc_chat::config::{CatalogEntry, Config};
use doc_chat::context::AppContext;
use doc_chat::server::router;

async fn setup() -> (TempDir, Router) {
    setup_with(|_| {}).await
}

async fn setup_with(adjust: impl FnOnce(&mut Config)) -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal(tmp.path().join("dchat.sqlite"));
    config.storage.root = tmp.path().join("files");
    config.catalog = vec![CatalogEntry {
        title: "Operations".to_string(),
        subcategories: Vec::new(),
    }];
    adjust(&mut config);
    let ctx = AppContext::open_storage(config).await.unwrap();
    (tmp, router(ctx))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(name: &str, content_type: &str, body: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(format!("/documents/upload?name={}&category=Operations", name))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

/// Upload a text file and process it; returns the document id.
async fn add_processed(app: &Router, name: &str, body: &'static [u8]) -> String {
    let (status, doc) = send(app, upload(name, "text/plain", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = doc["id"].as_str().unwrap().to_string();

    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/documents/{}/process", id))
        .body(Body::empty())
        .unwrap();
    let (status, report) = send(app, req).await;
    assert_eq!(status, StatusCode::OK, "process failed: {}", report);
    id
}

#[tokio::test]
async fn health_reports_version() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn missing_document_is_404() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(&app, get("/documents/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn upload_and_toggle() {
    let (_tmp, app) = setup().await;

    let (status, doc) = send(&app, upload("notes.txt", "text/plain", b"Docker compose notes")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["name"], "notes.txt");
    assert_eq!(doc["enabled"], true);
    assert_eq!(doc["processed"], false);
    assert_eq!(doc["category"], "Operations");
    let id = doc["id"].as_str().unwrap();

    let (status, pending) = send(&app, get("/documents/pending")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["documents"].as_array().unwrap().len(), 1);

    let (status, doc) = send(
        &app,
        json_request(Method::PATCH, &format!("/documents/{}", id), json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["enabled"], false);

    let (_, list) = send(&app, get("/documents")).await;
    assert_eq!(list["documents"][0]["enabled"], false);
}

#[tokio::test]
async fn unsupported_upload_is_415() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(&app, upload("logo.png", "image/png", b"\x89PNG")).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "unsupported");
}

#[tokio::test]
async fn empty_upload_is_400() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(&app, upload("empty.txt", "text/plain", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn add_url_rejects_non_http() {
    let (_tmp, app) = setup().await;

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/documents", json!({"url": "file:///etc/passwd"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, doc) = send(
        &app,
        json_request(
            Method::POST,
            "/documents",
            json!({"url": "https://example.com/policy.pdf", "category": "Operations"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(doc["name"], "policy.pdf");
    assert_eq!(doc["file_type"], "application/pdf");
}

#[tokio::test]
async fn process_then_search() {
    let (_tmp, app) = setup().await;
    let id = add_processed(&app, "deploy.txt", b"Kubernetes rollout steps for the website.").await;

    let (status, detail) = send(&app, get(&format!("/documents/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["document"]["processed"], true);
    assert_eq!(detail["chunks"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/search", json!({"query": "kubernetes"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["document_id"], id.as_str());
    assert_eq!(results[0]["document_name"], "deploy.txt");
}

#[tokio::test]
async fn process_with_supplied_content() {
    let (_tmp, app) = setup().await;
    let (_, doc) = send(&app, upload("draft.txt", "text/plain", b"old words")).await;
    let id = doc["id"].as_str().unwrap();

    let (status, report) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/documents/{}/process", id),
            json!({"content": "Replacement text about budgets."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["chunks"], 1);

    let (_, body) = send(
        &app,
        json_request(Method::POST, "/search", json!({"query": "budgets"})),
    )
    .await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("/documents/{}/process", id))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_validation() {
    let (_tmp, app) = setup().await;

    let (status, body) = send(&app, json_request(Method::POST, "/search", json!({"query": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/search", json!({"query": "x", "limit": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_paths() {
    let (_tmp, app) = setup().await;

    let (status, body) = send(&app, json_request(Method::POST, "/chat", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/chat", json!({"question": "What is deployed?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["answer"]
        .as_str()
        .unwrap()
        .starts_with("No documents are currently enabled"));
    assert_eq!(body["sources"], json!([]));

    add_processed(&app, "deploy.txt", b"Kubernetes rollout steps.").await;

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/chat", json!({"question": "What about invoices?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "No relevant information was found in the enabled documents."
    );

    // Matching chunks exist but no chat provider is configured.
    let (status, body) = send(
        &app,
        json_request(Method::POST, "/chat", json!({"question": "Kubernetes rollout?"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "provider_disabled");
}

#[tokio::test]
async fn delete_returns_204() {
    let (_tmp, app) = setup().await;
    let id = add_processed(&app, "old.txt", b"Outdated notes.").await;

    let req = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/documents/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&app, get(&format!("/documents/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_and_stats() {
    let (_tmp, app) = setup().await;
    add_processed(&app, "runbook.txt", b"Restart the workers.").await;
    send(&app, upload("later.txt", "text/plain", b"Not processed yet.")).await;

    let (status, body) = send(&app, get("/documents/catalog")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["groups"][0]["title"], "Operations");
    assert_eq!(body["groups"][0]["documents"].as_array().unwrap().len(), 2);

    let (status, stats) = send(&app, get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["documents"], 2);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["embedding_model"], Value::Null);

    let (status, report) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/documents/process-pending")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 0);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (_tmp, app) = setup().await;
    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

fn assert_error(status: StatusCode, body: &Value, expected: StatusCode, code: &str) {
    assert_eq!(status, expected, "unexpected body: {}", body);
    assert_eq!(body["error"]["code"], code);
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_uses_error_envelope() {
    let (_tmp, app) = setup().await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "bad_request");

    // Well-formed JSON of the wrong shape.
    let (status, body) = send(&app, json_request(Method::POST, "/search", json!({"query": 7}))).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "bad_request");
}

#[tokio::test]
async fn missing_content_type_is_415() {
    let (_tmp, app) = setup().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/search")
        .body(Body::from(r#"{"query":"rollout"}"#))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_error(status, &body, StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported");
}

#[tokio::test]
async fn upload_without_name_is_400() {
    let (_tmp, app) = setup().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/documents/upload?category=Operations")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("Some notes"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST, "bad_request");

    let (_, list) = send(&app, get("/documents")).await;
    assert_eq!(list["documents"], json!([]));
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let (_tmp, app) = setup_with(|config| config.server.max_upload_bytes = 64).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/documents/upload?name=big.txt")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(vec![b'a'; 1024]))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_error(status, &body, StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large");

    let (status, _) = send(&app, upload("small.txt", "text/plain", b"fits")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(&app, get("/nowhere")).await;
    assert_error(status, &body, StatusCode::NOT_FOUND, "not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("/nowhere"));
}

#[tokio::test]
async fn linked_document_with_unsupported_type_is_415() {
    let (_tmp, app) = setup().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/documents",
            json!({"url": "https://example.com/logo", "file_type": "image/png"}),
        ),
    )
    .await;
    assert_error(status, &body, StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported");
}
