//! Deployment pipeline state machine.
//!
//! Drives one deployment per CI event through the lifecycle:
//!
//! ```text
//! Received -> Verified -> Deploying -> HealthChecking -> Deployed
//!                |             |              |
//!                |             +--> RollingBack --> RolledBack
//!                +--> Rejected
//! ```
//!
//! Processing is idempotent per event key. The record is persisted after
//! every transition, and duplicate deliveries of a settled event replay the
//! stored record without touching the deployment again. Deploy and
//! health-check failures trigger automatic rollback to the pre-deploy
//! backup; a rollback failure settles the record where it stands and is
//! surfaced to operators through the error log.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use tether_core::{Clock, Conclusion, DeployState, DeploymentEvent, DeploymentRecord};

use crate::{
    hooks::{DeployHook, HealthProbe},
    store::{RecordStore, StoreError},
};

/// Pipeline timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total time the health check may take before rollback.
    pub health_check_timeout: Duration,
    /// Wait between health probe attempts.
    pub health_check_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            health_check_timeout: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(2),
        }
    }
}

/// Drives deployments through their lifecycle.
///
/// One pipeline serves all events; a per-key mutex serializes concurrent
/// deliveries of the same event so exactly one of them deploys.
#[derive(Debug)]
pub struct DeploymentPipeline {
    store: Arc<dyn RecordStore>,
    hook: Arc<dyn DeployHook>,
    probe: Arc<dyn HealthProbe>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeploymentPipeline {
    /// Creates a pipeline over the given store, hooks, and probe.
    pub fn new(
        store: Arc<dyn RecordStore>,
        hook: Arc<dyn DeployHook>,
        probe: Arc<dyn HealthProbe>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self { store, hook, probe, clock, config, key_locks: Mutex::new(HashMap::new()) }
    }

    /// Processes one verified deployment event to completion.
    ///
    /// Returns the final record. A key that already has a record replays it
    /// without re-deploying; this is the idempotency guarantee for webhook
    /// redelivery. Errors are store failures only; deploy and health
    /// failures are captured in the record itself.
    pub async fn process(&self, event: DeploymentEvent) -> Result<DeploymentRecord, StoreError> {
        let key = event.idempotency_key();

        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };

        let result = {
            let _guard = key_lock.lock().await;
            self.run(&key, event).await
        };

        // Prune the lock entry once no other delivery holds it.
        drop(key_lock);
        let mut locks = self.key_locks.lock().await;
        if locks.get(&key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(&key);
        }

        result
    }

    /// Number of per-key locks currently retained. Exposed for tests.
    pub async fn key_lock_count(&self) -> usize {
        self.key_locks.lock().await.len()
    }

    async fn run(&self, key: &str, event: DeploymentEvent) -> Result<DeploymentRecord, StoreError> {
        if let Some(existing) = self.store.find(key).await? {
            tracing::info!(key, state = %existing.state, "duplicate event, replaying stored record");
            return Ok(existing);
        }

        let mut record = DeploymentRecord::new(&event, self.now());
        self.store.upsert(&record).await?;

        record.transition(DeployState::Verified, self.now());
        self.store.upsert(&record).await?;

        if event.conclusion == Conclusion::Failure {
            record.failure_reason = Some("workflow did not conclude successfully".to_string());
            record.transition(DeployState::Rejected, self.now());
            self.store.upsert(&record).await?;
            tracing::info!(key, "event rejected, workflow run was not successful");
            return Ok(record);
        }

        match self.hook.backup(&record).await {
            Ok(backup_ref) => {
                tracing::debug!(key, backup_ref, "backup taken");
                record.backup_ref = Some(backup_ref);
            },
            Err(e) => {
                // Nothing was deployed, so there is nothing to restore
                tracing::error!(key, error = %e, "backup failed, aborting before deploy");
                record.failure_reason = Some(format!("backup failed: {e}"));
                record.transition(DeployState::Rejected, self.now());
                self.store.upsert(&record).await?;
                return Ok(record);
            },
        }

        record.transition(DeployState::Deploying, self.now());
        self.store.upsert(&record).await?;
        tracing::info!(
            event = "DEPLOYMENT_START",
            key,
            sha = record.head_sha,
            version = record.version.as_deref().unwrap_or("unversioned"),
            "deployment started"
        );

        if let Err(e) = self.hook.deploy(&record).await {
            return self.fail_and_rollback(record, format!("deploy failed: {e}")).await;
        }

        record.transition(DeployState::HealthChecking, self.now());
        self.store.upsert(&record).await?;

        if let Err(reason) = self.await_healthy(&record.key).await {
            return self.fail_and_rollback(record, reason).await;
        }

        record.transition(DeployState::Deployed, self.now());
        self.store.upsert(&record).await?;
        tracing::info!(
            event = "DEPLOYMENT_SUCCESS",
            key,
            sha = record.head_sha,
            states = ?record.state_sequence(),
            "deployment succeeded"
        );

        Ok(record)
    }

    /// Polls the health probe until it passes or the timeout elapses.
    async fn await_healthy(&self, key: &str) -> Result<(), String> {
        let deadline = self.clock.now() + self.config.health_check_timeout;
        let mut last_error;

        loop {
            match self.probe.check().await {
                Ok(report) => {
                    tracing::debug!(key, latency_ms = report.latency.as_millis(), "health check passed");
                    return Ok(());
                },
                Err(e) => {
                    tracing::debug!(key, error = %e, "health check attempt failed");
                    last_error = e.to_string();
                },
            }

            if self.clock.now() + self.config.health_check_interval >= deadline {
                return Err(format!("health check timed out: {last_error}"));
            }
            self.clock.sleep(self.config.health_check_interval).await;
        }
    }

    /// Records the failure and rolls back to the pre-deploy backup.
    ///
    /// A successful rollback ends in `RolledBack`. A failed rollback leaves
    /// the record in `RollingBack` with `rollback_error` set; the record is
    /// settled and the failure is logged at error level for operators.
    async fn fail_and_rollback(
        &self,
        mut record: DeploymentRecord,
        reason: String,
    ) -> Result<DeploymentRecord, StoreError> {
        tracing::warn!(key = record.key, reason, "deployment failed, rolling back");
        record.failure_reason = Some(reason);
        record.transition(DeployState::RollingBack, self.now());
        self.store.upsert(&record).await?;

        let rollback_result = match record.backup_ref.clone() {
            Some(backup_ref) => self.hook.rollback(&record, &backup_ref).await.map_err(|e| e.to_string()),
            None => Err("no backup reference recorded".to_string()),
        };

        match rollback_result {
            Ok(()) => {
                record.transition(DeployState::RolledBack, self.now());
                tracing::info!(event = "ROLLBACK", key = record.key, "rollback completed");
            },
            Err(e) => {
                record.rollback_error = Some(e.clone());
                record.updated_at = self.now();
                tracing::error!(
                    event = "ROLLBACK_FAILED",
                    key = record.key,
                    error = e,
                    "rollback failed, manual intervention required"
                );
            },
        }

        self.store.upsert(&record).await?;
        Ok(record)
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.now_system())
    }
}
