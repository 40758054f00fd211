//! Router integration tests.
//!
//! Drives the full axum router through tower's `oneshot` with fake deploy
//! hooks and a mock automation destination, asserting the HTTP status
//! mapping of the inbound and outbound endpoints.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use tether_api::{create_router, AppState};
use tether_core::{signature, Clock, DeploymentRecord, TestClock};
use tether_deploy::{
    DeployHook, DeploymentPipeline, HealthProbe, HookError, InMemoryRecordStore, PipelineConfig,
    ProbeError, ProbeReport, WebhookReceiver,
};
use tether_outbound::{
    BackoffConfig, CircuitBreaker, CircuitConfig, CircuitState, HttpTransport, SendConfig,
    WebhookSender,
};

const INBOUND_SECRET: &[u8] = b"inbound-test-secret";
const OUTBOUND_SECRET: &[u8] = b"outbound-test-secret";

#[derive(Debug)]
struct NoopHook;

#[async_trait]
impl DeployHook for NoopHook {
    async fn backup(&self, _record: &DeploymentRecord) -> Result<String, HookError> {
        Ok("snapshot-test".to_string())
    }

    async fn deploy(&self, _record: &DeploymentRecord) -> Result<(), HookError> {
        Ok(())
    }

    async fn rollback(&self, _record: &DeploymentRecord, _backup_ref: &str) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Debug)]
struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        Ok(ProbeReport { latency: Duration::from_millis(1) })
    }
}

struct TestApp {
    router: Router,
    breaker: Arc<CircuitBreaker>,
    store: Arc<InMemoryRecordStore>,
    automation_url: String,
}

fn build_app(automation_url: &str) -> TestApp {
    let clock = Arc::new(TestClock::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitConfig::default(), clock.clone()));

    let sender = Arc::new(WebhookSender::new(
        HttpTransport::with_defaults().unwrap(),
        breaker.clone(),
        clock.clone() as Arc<dyn Clock>,
        OUTBOUND_SECRET,
        SendConfig {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            backoff: BackoffConfig { jitter_factor: 0.0, ..BackoffConfig::default() },
            deadline: None,
        },
    ));

    let store = Arc::new(InMemoryRecordStore::new());
    let pipeline = Arc::new(DeploymentPipeline::new(
        store.clone(),
        Arc::new(NoopHook),
        Arc::new(AlwaysHealthy),
        clock.clone() as Arc<dyn Clock>,
        PipelineConfig::default(),
    ));
    let receiver = Arc::new(WebhookReceiver::new(INBOUND_SECRET, pipeline));

    let state = AppState {
        sender,
        receiver,
        breaker: breaker.clone(),
        clock,
        automation_url: automation_url.to_string(),
        shutdown: CancellationToken::new(),
    };

    TestApp {
        router: create_router(state, Duration::from_secs(30)),
        breaker,
        store,
        automation_url: automation_url.to_string(),
    }
}

fn deploy_body() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": "completed",
        "workflow_run": {
            "id": 77,
            "name": "deploy",
            "conclusion": "success",
            "head_sha": "abc123def"
        },
        "repository": { "full_name": "acme/chat" }
    }))
    .unwrap()
}

fn deploy_request(body: Vec<u8>, signature_header: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/hooks/deploy")
        .header("content-type", "application/json");
    if let Some(sig) = signature_header {
        builder = builder.header("x-hub-signature-256", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = build_app("http://127.0.0.1:9/hook");

    for path in ["/health", "/ready", "/live"] {
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
    }
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = build_app("http://127.0.0.1:9/hook");

    let response = app
        .router
        .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("X-Request-Id"));
}

#[tokio::test]
async fn deploy_without_signature_is_unauthorized() {
    let app = build_app("http://127.0.0.1:9/hook");

    let response = app.router.oneshot(deploy_request(deploy_body(), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.store.is_empty().await, "rejected delivery must not create a record");
}

#[tokio::test]
async fn deploy_with_wrong_signature_is_unauthorized() {
    let app = build_app("http://127.0.0.1:9/hook");

    let body = deploy_body();
    let wrong = signature::header_value(b"wrong-secret", &body).unwrap();
    let response = app.router.oneshot(deploy_request(body, Some(&wrong))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.store.is_empty().await, "rejected delivery must not create a record");
}

#[tokio::test]
async fn deploy_with_signed_garbage_is_bad_request() {
    let app = build_app("http://127.0.0.1:9/hook");

    let body = b"definitely not json".to_vec();
    let sig = signature::header_value(INBOUND_SECRET, &body).unwrap();
    let response = app.router.oneshot(deploy_request(body, Some(&sig))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert_eq!(json["error"]["code"], "invalid_payload");
}

#[tokio::test]
async fn valid_deploy_event_returns_deployed_record() {
    let app = build_app("http://127.0.0.1:9/hook");

    let body = deploy_body();
    let sig = signature::header_value(INBOUND_SECRET, &body).unwrap();
    let response = app.router.oneshot(deploy_request(body, Some(&sig))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["key"], "abc123def-77");
    assert_eq!(json["state"], "deployed");
}

#[tokio::test]
async fn redelivered_deploy_event_replays_stored_record() {
    let app = build_app("http://127.0.0.1:9/hook");

    let body = deploy_body();
    let sig = signature::header_value(INBOUND_SECRET, &body).unwrap();

    let first = app
        .router
        .clone()
        .oneshot(deploy_request(body.clone(), Some(&sig)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.router.oneshot(deploy_request(body, Some(&sig))).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let json = response_json(second).await;
    assert_eq!(json["state"], "deployed");
}

fn dispatch_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/dispatch")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&serde_json::json!({
                "message": "release v2 to staging",
                "user_id": "u-42",
                "tool": "deploy-bot"
            }))
            .unwrap(),
        ))
        .unwrap()
}

#[tokio::test]
async fn dispatch_delivers_to_automation_destination() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .and(matchers::header_exists("x-tether-signature"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_app(&format!("{}/hook", server.uri()));
    let response = app.router.oneshot(dispatch_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = response_json(response).await;
    assert_eq!(json["outcome"], "success");
    assert_eq!(json["status_code"], 200);
}

#[tokio::test]
async fn dispatch_failure_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let app = build_app(&format!("{}/hook", server.uri()));
    let response = app.router.oneshot(dispatch_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = response_json(response).await;
    assert_eq!(json["outcome"], "failure");
    assert_eq!(json["kind"], "server");
}

#[tokio::test]
async fn dispatch_with_open_circuit_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = build_app(&format!("{}/hook", server.uri()));
    app.breaker.force_state(&app.automation_url, CircuitState::Open).await;

    let response = app.router.oneshot(dispatch_request()).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = response_json(response).await;
    assert_eq!(json["kind"], "circuit_open");
}
