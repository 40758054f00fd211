//! Integration tests for the retrying webhook sender.
//!
//! Exercises the full delivery policy against a mock destination: retry
//! counts, classification of terminal failures, circuit breaker
//! interaction, deadlines, and cancellation.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

use tether_core::{signature, Clock, ErrorKind, RealClock, TestClock, WebhookOutcome};
use tether_outbound::{
    BackoffConfig, CircuitBreaker, CircuitConfig, CircuitState, HttpTransport, SendConfig,
    WebhookSender, SIGNATURE_HEADER,
};

const SECRET: &[u8] = b"test-signing-secret";

fn instant_backoff() -> BackoffConfig {
    BackoffConfig { jitter_factor: 0.0, ..BackoffConfig::default() }
}

fn send_config(max_retries: u32) -> SendConfig {
    SendConfig {
        timeout: Duration::from_secs(5),
        max_retries,
        backoff: instant_backoff(),
        deadline: None,
    }
}

struct TestHarness {
    sender: WebhookSender,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<TestClock>,
}

fn harness(config: SendConfig) -> TestHarness {
    let clock = Arc::new(TestClock::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitConfig::default(), clock.clone()));
    let sender = WebhookSender::new(
        HttpTransport::with_defaults().unwrap(),
        breaker.clone(),
        clock.clone() as Arc<dyn Clock>,
        SECRET,
        config,
    );
    TestHarness { sender, breaker, clock }
}

fn payload() -> Bytes {
    Bytes::from(r#"{"message":"deploy finished","user_id":"u-1"}"#)
}

#[tokio::test]
async fn success_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(send_config(3));
    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    assert_eq!(outcome, WebhookOutcome::Success { status_code: 200, body: "ok".to_string() });
}

#[tokio::test]
async fn payload_is_signed_with_shared_secret() {
    let server = MockServer::start().await;
    let body = payload();
    let expected = signature::header_value(SECRET, &body).unwrap();

    Mock::given(matchers::method("POST"))
        .and(matchers::header(SIGNATURE_HEADER, expected.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(send_config(0));
    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), body, &CancellationToken::new())
        .await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn server_errors_retried_until_attempts_exhausted() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    // max_retries 2 means exactly 3 attempts
    let harness = harness(send_config(2));
    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    let WebhookOutcome::Failure { kind, retryable, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::Server);
    assert!(retryable);
}

#[tokio::test]
async fn auth_failure_returns_without_retry() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad signature"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(send_config(5));
    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    let WebhookOutcome::Failure { kind, retryable, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::Auth);
    assert!(!retryable);
}

#[tokio::test]
async fn client_error_returns_without_retry() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unprocessable"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(send_config(5));
    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    let WebhookOutcome::Failure { kind, retryable, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::Client);
    assert!(!retryable);
}

#[tokio::test]
async fn open_circuit_rejects_without_touching_the_wire() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let destination = format!("{}/hook", server.uri());
    let harness = harness(send_config(3));
    harness.breaker.force_state(&destination, CircuitState::Open).await;

    let outcome = harness.sender.send(&destination, payload(), &CancellationToken::new()).await;

    let WebhookOutcome::Failure { kind, retryable, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::CircuitOpen);
    assert!(!retryable);
}

#[tokio::test]
async fn repeated_failures_open_circuit_mid_send() {
    let server = MockServer::start().await;
    // Threshold is 5: attempts 6+ must be rejected before reaching the wire
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let destination = format!("{}/hook", server.uri());
    let harness = harness(send_config(7));

    let outcome = harness.sender.send(&destination, payload(), &CancellationToken::new()).await;

    let WebhookOutcome::Failure { kind, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::CircuitOpen);

    let stats = harness.breaker.stats(&destination).await.unwrap();
    assert_eq!(stats.state, CircuitState::Open);
}

#[tokio::test]
async fn deadline_stops_retrying_early() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = SendConfig {
        timeout: Duration::from_secs(5),
        max_retries: 5,
        backoff: BackoffConfig {
            base: Duration::from_secs(10),
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        },
        deadline: Some(Duration::from_secs(5)),
    };
    let harness = harness(config);

    let outcome = harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    let WebhookOutcome::Failure { kind, message, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert_eq!(kind, ErrorKind::Server);
    assert!(message.contains("deadline"), "message should mention the deadline: {message}");
}

#[tokio::test]
async fn virtual_time_advances_across_retries() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let harness = harness(send_config(2));
    harness
        .sender
        .send(&format!("{}/hook", server.uri()), payload(), &CancellationToken::new())
        .await;

    // Backoff waits of 1s and 2s happened on the virtual clock
    assert!(harness.clock.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn cancellation_stops_between_attempts() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    // Real clock with a long backoff: cancellation must win the wait
    let clock = Arc::new(RealClock::new());
    let breaker = Arc::new(CircuitBreaker::new(CircuitConfig::default(), clock.clone()));
    let sender = WebhookSender::new(
        HttpTransport::with_defaults().unwrap(),
        breaker,
        clock,
        SECRET,
        SendConfig {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff: BackoffConfig {
                base: Duration::from_secs(30),
                jitter_factor: 0.0,
                ..BackoffConfig::default()
            },
            deadline: None,
        },
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = sender.send(&format!("{}/hook", server.uri()), payload(), &cancel).await;

    let WebhookOutcome::Failure { message, .. } = outcome else {
        unreachable!("expected failure outcome");
    };
    assert!(message.contains("cancelled"), "message should mention cancellation: {message}");
}
