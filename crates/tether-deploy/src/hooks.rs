//! Deploy hooks and health probing.
//!
//! The pipeline drives deployments through two seams: [`DeployHook`] for
//! the backup/deploy/rollback actions and [`HealthProbe`] for post-deploy
//! verification. Production uses shell commands and an HTTP endpoint; tests
//! substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use tether_core::DeploymentRecord;

/// A deploy hook command failed.
#[derive(Debug, Error)]
pub enum HookError {
    /// The command ran and exited non-zero.
    #[error("hook exited with status {code}: {stderr}")]
    NonZeroExit {
        /// Exit code of the command.
        code: i32,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// The command could not be started or was killed by a signal.
    #[error("failed to run hook: {0}")]
    Spawn(String),
}

/// Actions the pipeline invokes around a deployment.
#[async_trait]
pub trait DeployHook: Send + Sync + std::fmt::Debug {
    /// Snapshots the current deployment and returns a reference usable by
    /// [`Self::rollback`].
    async fn backup(&self, record: &DeploymentRecord) -> Result<String, HookError>;

    /// Deploys the version named by the record.
    async fn deploy(&self, record: &DeploymentRecord) -> Result<(), HookError>;

    /// Restores the deployment snapshotted as `backup_ref`.
    async fn rollback(&self, record: &DeploymentRecord, backup_ref: &str) -> Result<(), HookError>;
}

/// Deploy hook that shells out to configured commands.
///
/// Commands run through `sh -c` with the deployment context exported as
/// `DEPLOY_KEY`, `DEPLOY_SHA`, and `DEPLOY_VERSION`; rollback additionally
/// receives `DEPLOY_BACKUP_REF`. The backup command's stdout (trimmed)
/// becomes the backup reference.
#[derive(Debug, Clone)]
pub struct ScriptHook {
    backup_command: String,
    deploy_command: String,
    rollback_command: String,
}

impl ScriptHook {
    /// Creates a hook from the three commands.
    pub fn new(
        backup_command: impl Into<String>,
        deploy_command: impl Into<String>,
        rollback_command: impl Into<String>,
    ) -> Self {
        Self {
            backup_command: backup_command.into(),
            deploy_command: deploy_command.into(),
            rollback_command: rollback_command.into(),
        }
    }

    async fn run(
        &self,
        command: &str,
        record: &DeploymentRecord,
        backup_ref: Option<&str>,
    ) -> Result<String, HookError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env("DEPLOY_KEY", &record.key)
            .env("DEPLOY_SHA", &record.head_sha)
            .env("DEPLOY_VERSION", record.version.as_deref().unwrap_or(""));
        if let Some(backup_ref) = backup_ref {
            cmd.env("DEPLOY_BACKUP_REF", backup_ref);
        }

        let output = cmd.output().await.map_err(|e| HookError::Spawn(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            match output.status.code() {
                Some(code) => Err(HookError::NonZeroExit { code, stderr }),
                None => Err(HookError::Spawn("hook terminated by signal".to_string())),
            }
        }
    }
}

#[async_trait]
impl DeployHook for ScriptHook {
    async fn backup(&self, record: &DeploymentRecord) -> Result<String, HookError> {
        let stdout = self.run(&self.backup_command, record, None).await?;
        if stdout.is_empty() {
            Ok(format!("backup-{}", record.head_sha))
        } else {
            Ok(stdout)
        }
    }

    async fn deploy(&self, record: &DeploymentRecord) -> Result<(), HookError> {
        self.run(&self.deploy_command, record, None).await.map(|_| ())
    }

    async fn rollback(&self, record: &DeploymentRecord, backup_ref: &str) -> Result<(), HookError> {
        self.run(&self.rollback_command, record, Some(backup_ref)).await.map(|_| ())
    }
}

/// A health probe attempt failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The health endpoint could not be reached.
    #[error("health endpoint unreachable: {0}")]
    Unreachable(String),

    /// The health endpoint answered with a non-2xx status.
    #[error("health endpoint returned status {0}")]
    Unhealthy(u16),
}

/// Result of a passing health probe.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// How long the probe took.
    pub latency: Duration,
}

/// Checks whether the freshly deployed service is healthy.
#[async_trait]
pub trait HealthProbe: Send + Sync + std::fmt::Debug {
    /// Runs one health check.
    async fn check(&self) -> Result<ProbeReport, ProbeError>;
}

/// Health probe that GETs an HTTP endpoint and expects a 2xx.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    /// Creates a probe for the given URL with a per-attempt timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;

        if response.status().is_success() {
            Ok(ProbeReport { latency: start.elapsed() })
        } else {
            Err(ProbeError::Unhealthy(response.status().as_u16()))
        }
    }
}
