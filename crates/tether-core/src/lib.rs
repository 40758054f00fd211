//! Core domain types for the webhook reliability layer.
//!
//! Provides the closed error taxonomy, transport-outcome classification,
//! HMAC signature codec, deployment domain models, and the clock abstraction
//! the other crates build on. Everything here is free of I/O beyond the
//! async sleep on [`Clock`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod models;
pub mod signature;
pub mod time;

pub use classify::{classify, TransportOutcome};
pub use error::{ErrorKind, WebhookError};
pub use models::{
    Conclusion, DeployState, DeploymentEvent, DeploymentRecord, Transition, WebhookOutcome,
    WebhookRequest,
};
pub use time::{Clock, RealClock, TestClock};
