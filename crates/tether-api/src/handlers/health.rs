//! Health check handlers for service monitoring.
//!
//! Provides liveness, readiness, and health endpoints. The health report
//! includes the circuit breaker state for the automation destination so
//! operators can see delivery degradation without reading logs.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tether_outbound::CircuitState;
use tracing::{debug, instrument};

use crate::server::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when the health check was performed
    pub timestamp: DateTime<Utc>,
    /// Delivery health for the automation destination
    pub delivery: DeliveryHealth,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Outbound delivery is impaired but the service is up
    Degraded,
}

/// Circuit breaker view for the automation destination.
#[derive(Debug, Serialize)]
pub struct DeliveryHealth {
    /// Circuit state: closed, open, or half_open
    pub circuit_state: String,
    /// Recent failures counted against the circuit
    pub failure_count: u32,
}

/// Primary health check endpoint.
///
/// Reports degraded while the automation circuit is open; the service
/// itself keeps serving, so the status code stays 200 either way.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let stats = state.breaker.stats(&state.automation_url).await;

    let (circuit_state, failure_count) = stats
        .map_or((CircuitState::Closed, 0), |s| (s.state, s.failure_count));

    let status = match circuit_state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::Open | CircuitState::HalfOpen => HealthStatus::Degraded,
    };

    debug!(circuit = %circuit_state, "health check completed");

    let response = HealthResponse {
        status,
        timestamp: DateTime::<Utc>::from(state.clock.now_system()),
        delivery: DeliveryHealth { circuit_state: circuit_state.to_string(), failure_count },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness check endpoint for orchestration probes.
#[instrument(name = "readiness_check", skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    health_check(State(state)).await
}

/// Liveness check endpoint for orchestration probes.
///
/// Minimal check that only proves the HTTP server is responding.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": DateTime::<Utc>::from(state.clock.now_system()),
        "service": "tether-api"
    });

    (StatusCode::OK, Json(response)).into_response()
}
