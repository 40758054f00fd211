//! Inbound CI event parsing.
//!
//! Decodes the raw JSON payload of a workflow completion webhook into a
//! [`DeploymentEvent`]. Parsing happens only after the payload signature
//! has been verified; nothing here trusts the body beyond being bytes.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use tether_core::{Conclusion, DeploymentEvent};

/// The payload could not be turned into a deployment event.
#[derive(Debug, Error)]
pub enum ParseEventError {
    /// Body is not valid JSON or misses required fields.
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The event is not a workflow completion.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The workflow run carries no conclusion yet.
    #[error("workflow run {0} has no conclusion")]
    MissingConclusion(u64),
}

/// Wire shape of the inbound webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Event action; only `completed` is deployable.
    pub action: String,
    /// The workflow run this event reports on.
    pub workflow_run: WorkflowRun,
    /// Repository the run belongs to.
    pub repository: Repository,
    /// Who pushed the triggering commit.
    #[serde(default)]
    pub pusher: Option<Pusher>,
    /// Git ref that was built, when the sender includes it at the top level.
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    /// Optional deployment metadata attached by the pipeline.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Workflow run fields we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    /// Run identifier, unique per repository.
    pub id: u64,
    /// Workflow name.
    pub name: String,
    /// Conclusion string; absent while the run is in progress.
    #[serde(default)]
    pub conclusion: Option<String>,
    /// Commit the run executed against.
    pub head_sha: String,
    /// Branch the run executed against.
    #[serde(default)]
    pub head_branch: Option<String>,
    /// Link to the run.
    #[serde(default)]
    pub html_url: Option<String>,
    /// When the run last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository fields we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// `owner/name` slug.
    pub full_name: String,
}

/// Pusher fields we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    /// Account name of the pusher.
    pub name: String,
}

/// Deployment metadata the CI pipeline may attach.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    /// Version or image tag produced by the build.
    #[serde(default)]
    pub version: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parses a raw verified payload into a [`DeploymentEvent`].
///
/// Any conclusion other than `success` maps to [`Conclusion::Failure`], so
/// cancelled or skipped runs are rejected by the pipeline rather than
/// bounced with a parse error.
pub fn parse_event(raw_body: &[u8]) -> Result<DeploymentEvent, ParseEventError> {
    let envelope: InboundEnvelope = serde_json::from_slice(raw_body)?;

    if envelope.action != "completed" {
        return Err(ParseEventError::UnsupportedAction(envelope.action));
    }

    let run = envelope.workflow_run;
    let conclusion = match run.conclusion.as_deref() {
        Some("success") => Conclusion::Success,
        Some(_) => Conclusion::Failure,
        None => return Err(ParseEventError::MissingConclusion(run.id)),
    };

    let git_ref = envelope
        .git_ref
        .or_else(|| run.head_branch.as_ref().map(|branch| format!("refs/heads/{branch}")))
        .unwrap_or_default();

    Ok(DeploymentEvent {
        head_sha: run.head_sha,
        run_id: run.id,
        conclusion,
        workflow: run.name,
        repository: envelope.repository.full_name,
        git_ref,
        actor: envelope.pusher.map_or_else(|| "unknown".to_string(), |p| p.name),
        timestamp: run.updated_at.unwrap_or_else(Utc::now),
        version: envelope.metadata.version,
        tags: envelope.metadata.tags,
        workflow_url: run.html_url,
    })
}
