//! Inbound webhook handling and deployment automation.
//!
//! Receives signed CI completion events, verifies and parses them, and
//! drives deployments through a persisted state machine with automatic
//! rollback on failure. [`WebhookReceiver`] is the entry point; the
//! pipeline, store, and hook seams underneath are swappable for tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod hooks;
pub mod pipeline;
pub mod receiver;
pub mod store;

pub use event::{parse_event, InboundEnvelope, ParseEventError};
pub use hooks::{
    DeployHook, HealthProbe, HookError, HttpHealthProbe, ProbeError, ProbeReport, ScriptHook,
};
pub use pipeline::{DeploymentPipeline, PipelineConfig};
pub use receiver::{ReceiveError, WebhookReceiver};
pub use store::{InMemoryRecordStore, RecordStore, StoreError};
