//! Domain models for outbound delivery and deployment tracking.
//!
//! Defines the immutable request/outcome types of the outbound client and
//! the deployment event/record pair driven by the inbound receiver. State
//! transition rules for deployments live on [`DeployState`] and
//! [`DeploymentRecord`].

use std::{fmt, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// A fully-built outbound webhook request.
///
/// Immutable once constructed; the sender builds a fresh request for every
/// attempt, including retries, so no attempt observes state from a previous
/// one.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Destination URL.
    pub url: String,
    /// HTTP method, in practice always POST.
    pub method: String,
    /// Request headers, including the signature header.
    pub headers: Vec<(String, String)>,
    /// Serialized body. Signed exactly as transmitted.
    pub body: Bytes,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

/// Terminal result of an outbound send, surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The destination acknowledged the payload with a 2xx status.
    Success {
        /// HTTP status returned by the destination.
        status_code: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Delivery failed; `retryable` reflects the policy for `kind`.
    Failure {
        /// Classified failure kind.
        kind: ErrorKind,
        /// Context from the final attempt.
        message: String,
        /// Whether the failing kind is retryable by policy.
        retryable: bool,
    },
}

impl WebhookOutcome {
    /// Builds a failure outcome with retryability derived from the kind.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure { kind, message: message.into(), retryable: kind.is_retryable() }
    }

    /// Whether this outcome is a success.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Workflow conclusion reported by the CI pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// The workflow finished successfully; a deploy may proceed.
    Success,
    /// The workflow failed; the event is rejected without deploying.
    Failure,
}

/// A completion event received from the CI pipeline.
///
/// Created on receipt and immutable afterwards. The idempotency key is
/// derived from the source commit and the workflow run, so redelivery of
/// the same run never produces a second deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Source commit SHA the workflow ran against.
    pub head_sha: String,
    /// Workflow run identifier from the CI system.
    pub run_id: u64,
    /// Workflow conclusion.
    pub conclusion: Conclusion,
    /// Workflow name, for logging.
    pub workflow: String,
    /// Repository the event originated from.
    pub repository: String,
    /// Git ref that was built.
    pub git_ref: String,
    /// Actor that pushed the triggering commit.
    pub actor: String,
    /// When the workflow completed.
    pub timestamp: DateTime<Utc>,
    /// Image or version tag produced by the build, when present.
    pub version: Option<String>,
    /// Free-form tags attached by the pipeline.
    pub tags: Vec<String>,
    /// Link back to the workflow run.
    pub workflow_url: Option<String>,
}

impl DeploymentEvent {
    /// Stable idempotency key: commit SHA plus workflow run id.
    pub fn idempotency_key(&self) -> String {
        format!("{}-{}", self.head_sha, self.run_id)
    }
}

/// Lifecycle state of a deployment driven by one CI event.
///
/// ```text
/// Received -> Verified -> Deploying -> HealthChecking -> Deployed
///                |             |              |
///                |             +--> RollingBack --> RolledBack
///                +--> Rejected
/// ```
///
/// `Deployed`, `RolledBack`, and `Rejected` are terminal. A record that has
/// reached a terminal state is never re-entered into `Deploying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Event accepted for processing.
    Received,
    /// Signature and payload checks passed.
    Verified,
    /// Deploy hook running.
    Deploying,
    /// Deploy finished; waiting for the health probe to pass.
    HealthChecking,
    /// Health check passed; the deploy is complete.
    Deployed,
    /// A deploy or health-check failure triggered rollback.
    RollingBack,
    /// Rollback completed.
    RolledBack,
    /// Event rejected before any deploy started.
    Rejected,
}

impl DeployState {
    /// Whether this state ends the lifecycle.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deployed | Self::RolledBack | Self::Rejected)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Verified => write!(f, "verified"),
            Self::Deploying => write!(f, "deploying"),
            Self::HealthChecking => write!(f, "health_checking"),
            Self::Deployed => write!(f, "deployed"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State entered.
    pub state: DeployState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// Persistent record of a deployment, keyed by idempotency key.
///
/// Owned by the deployment pipeline and persisted after every transition so
/// duplicate deliveries of the same event short-circuit to the stored
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Idempotency key (`<head_sha>-<run_id>`).
    pub key: String,
    /// Commit the deployment was built from.
    pub head_sha: String,
    /// Version tag being deployed, when the pipeline supplied one.
    pub version: Option<String>,
    /// Current lifecycle state.
    pub state: DeployState,
    /// Backup reference taken before the deploy, used for rollback.
    pub backup_ref: Option<String>,
    /// Why the deploy or health check failed, when it did.
    pub failure_reason: Option<String>,
    /// Error from a failed rollback. A record with this set is settled even
    /// though `RollingBack` is not a terminal state; no further automatic
    /// recovery is attempted.
    pub rollback_error: Option<String>,
    /// When the event was first received.
    pub received_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// Every transition in order, including the initial `Received`.
    pub history: Vec<Transition>,
}

impl DeploymentRecord {
    /// Creates a new record in `Received` for the given event.
    pub fn new(event: &DeploymentEvent, now: DateTime<Utc>) -> Self {
        Self {
            key: event.idempotency_key(),
            head_sha: event.head_sha.clone(),
            version: event.version.clone(),
            state: DeployState::Received,
            backup_ref: None,
            failure_reason: None,
            rollback_error: None,
            received_at: now,
            updated_at: now,
            history: vec![Transition { state: DeployState::Received, at: now }],
        }
    }

    /// Moves the record into `next`, appending to the transition history.
    ///
    /// Callers must not transition out of a terminal state; the pipeline
    /// guarantees this by checking [`Self::is_settled`] before driving a
    /// record.
    pub fn transition(&mut self, next: DeployState, at: DateTime<Utc>) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state {}", self.state);
        self.state = next;
        self.updated_at = at;
        self.history.push(Transition { state: next, at });
    }

    /// Whether processing has finished for this record.
    ///
    /// True for terminal states, and for `RollingBack` with a recorded
    /// rollback error: rollback failure is surfaced to operators instead of
    /// retried, so the record will never advance on its own.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || self.rollback_error.is_some()
    }

    /// The states visited so far, in order.
    pub fn state_sequence(&self) -> Vec<DeployState> {
        self.history.iter().map(|t| t.state).collect()
    }
}
