//! HTTP API integration tests
//!
//! The full router is driven in-process with `tower::ServiceExt::oneshot`
//! over memory-backed storage and the log provider.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use community_mailer::clock::SystemClock;
use community_mailer::config::Settings;
use community_mailer::email::EmailService;
use community_mailer::server::{create_app, AppState};
use community_mailer::store::MemoryMessageStore;
use community_mailer::template::{EmailTemplate, MemoryTemplateStore, TemplateRenderer};

fn create_test_app(api_key: Option<&str>) -> Router {
    let mut settings = Settings::default();
    settings.api.key = api_key.map(str::to_string);
    settings.email.sender_address = "events@example.org".to_string();

    let templates = Arc::new(MemoryTemplateStore::new());
    let now = Utc::now();
    templates
        .create(EmailTemplate {
            name: "welcome".to_string(),
            subject_template: "Hi {{name}}".to_string(),
            html_template: Some("{{#vip}}VIP perk{{/vip}} Welcome".to_string()),
            text_template: None,
            is_active: true,
            description: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    let service = EmailService::new(
        Arc::new(MemoryMessageStore::new()),
        Arc::new(TemplateRenderer::new(templates, None)),
        Arc::new(SystemClock),
        settings.email.clone(),
        settings.queue.max_retry_attempts,
    );

    create_app(AppState::new(settings, Arc::new(service), "log"))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn test_send_email_is_accepted_and_queued() {
    let app = create_test_app(None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails",
            json!({
                "to": ["sam@example.com"],
                "subject": "Meetup tonight",
                "text_body": "Doors open at 7"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");

    let id = body["id"].as_str().unwrap();
    let (status, body) = send(&app, get(&format!("/api/v1/emails/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "Meetup tonight");
    assert_eq!(body["retry_count"], 0);
    assert!(body.get("text_body").is_none());
}

#[tokio::test]
async fn test_invalid_recipient_is_bad_request() {
    let app = create_test_app(None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails",
            json!({"to": ["not-an-email"], "subject": "Hi", "text_body": "Hi"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (_, stats) = send(&app, get("/api/v1/emails/stats")).await;
    assert_eq!(stats["total"], 0);
}

#[tokio::test]
async fn test_templated_email_renders_before_queueing() {
    let app = create_test_app(None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails/templated",
            json!({
                "template_name": "welcome",
                "params": {"name": "Sam", "vip": true},
                "to": ["sam@example.com"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let id = body["id"].as_str().unwrap();
    let (_, body) = send(&app, get(&format!("/api/v1/emails/{}", id))).await;
    assert_eq!(body["subject"], "Hi Sam");
    assert_eq!(body["template_name"], "welcome");
}

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    let app = create_test_app(None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails/templated",
            json!({"template_name": "missing", "to": ["sam@example.com"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, get("/api/v1/templates/missing/validate")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/api/v1/templates/welcome/validate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn test_bulk_reports_partial_failures() {
    let app = create_test_app(None);

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/emails/bulk",
            json!([
                {"to": ["a@example.com"], "subject": "One", "text_body": "1"},
                {"to": ["broken"], "subject": "Two", "text_body": "2"},
                {"to": ["c@example.com"], "subject": "Three", "html_body": "<p>3</p>"}
            ]),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["total"], 3);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 1);
    assert_eq!(body["errors"][0]["index"], 1);

    let (status, _) = send(&app, post_json("/api/v1/emails/bulk", json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let app = create_test_app(None);

    let (status, _) = send(
        &app,
        get("/api/v1/emails/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/v1/emails/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_key_is_enforced_when_configured() {
    let app = create_test_app(Some("s3cret"));

    let (status, body) = send(&app, get("/api/v1/templates")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let wrong = Request::builder()
        .uri("/api/v1/templates")
        .header("X-API-Key", "guess")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/api/v1/templates")
        .header("X-API-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, authorized).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["templates"][0]["name"], "welcome");

    // Health stays open for probes
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_components() {
    let app = create_test_app(None);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["storage"]["connected"], true);
    assert_eq!(body["provider"], "log");
    assert_eq!(body["templates"]["cache_enabled"], false);
    assert_eq!(body["queue"]["total"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let app = create_test_app(None);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("mailer_queue_depth"));
}
