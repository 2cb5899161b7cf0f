//! API integration tests
//!
//! Drive the router in-process with `oneshot`. The pool is lazy, so only
//! endpoints that answer before touching MySQL are exercised here; the
//! database-backed paths live in `db_integration_tests.rs`.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bidaudit_common::config::AppConfig;
use bidaudit_server::build_router;
use bidaudit_server::models::TaskKind;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use helpers::db_utils::{lazy_pool, test_state};
use helpers::fake_agent::FakeAgent;

fn create_test_app() -> (Router, bidaudit_server::AppState) {
    let state = test_state(lazy_pool(), AppConfig::default(), Arc::new(FakeAgent::answering("通过")));
    (build_router(state.clone()), state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_envelope() {
    let (app, _) = create_test_app();
    let (status, body) = send(app, get("/api/app/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["module"], "bidaudit-server");
    assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["data"]["uptimeSeconds"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_health_reports_last_error() {
    let (app, state) = create_test_app();
    *state.last_error.write().await = Some("upload failed".to_string());

    let (_, body) = send(app, get("/api/app/health")).await;
    assert_eq!(body["data"]["lastError"], "upload failed");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = create_test_app();
    let (status, _) = send(app, get("/api/app/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_session_missing_is_404() {
    let (app, _) = create_test_app();
    let (status, body) = send(app, get("/api/app/projects/p-1/audit/session")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
    assert!(body["message"].as_str().unwrap().contains("p-1"));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_confirm_requires_rule_code() {
    let (app, _) = create_test_app();
    let (status, body) = send(
        app,
        post_json("/api/app/projects/p-1/audit/confirm", json!({"ruleCode": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "ruleCode is required");
}

#[tokio::test]
async fn test_confirm_without_session_is_404() {
    let (app, _) = create_test_app();
    let (status, body) = send(
        app,
        post_json("/api/app/projects/p-1/audit/confirm", json!({"ruleCode": "R1"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_create_project_requires_name() {
    let (app, _) = create_test_app();
    let (status, body) = send(app, post_json("/api/app/projects", json!({"name": ""}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "name is required");
}

#[tokio::test]
async fn test_upload_without_file_part_is_400() {
    let (app, _) = create_test_app();
    let boundary = "XBOUNDARY";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n标书\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/app/projects/upload")
        .header("content-type", format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "file is required");
}

#[tokio::test]
async fn test_rule_sync_without_data_hub_is_500() {
    let (app, _) = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/app/audit-rules/sync")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 500);
    assert!(body["message"].as_str().unwrap().contains("DATA_HUB_HOST"));
}

#[tokio::test]
async fn test_task_endpoints() {
    let (app, state) = create_test_app();
    let first = state.tasks.create(TaskKind::TenderUpload, "p-1", Some("f-1"), "标书.pdf");
    state.tasks.create(TaskKind::FileUpload, "p-2", Some("f-2"), "资质.pdf");

    let (status, body) = send(app.clone(), get("/api/app/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = send(app.clone(), get("/api/app/tasks?projectId=p-1")).await;
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], first.id.as_str());
    assert_eq!(tasks[0]["kind"], "tender_upload");
    assert_eq!(tasks[0]["status"], "pending");

    let (status, body) = send(app.clone(), get(&format!("/api/app/tasks/{}", first.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["label"], "标书.pdf");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/app/tasks/{}", first.id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app.clone(), delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get(&format!("/api/app/tasks/{}", first.id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}
