//! Tether webhook reliability service.
//!
//! Main entry point. Wires the outbound sender, the deployment pipeline,
//! and the HTTP server together from configuration, then serves until a
//! shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tether_api::{start_server, AppState, Config};
use tether_core::{Clock, RealClock};
use tether_deploy::{
    DeploymentPipeline, HttpHealthProbe, InMemoryRecordStore, ScriptHook, WebhookReceiver,
};
use tether_outbound::{CircuitBreaker, ClientConfig, HttpTransport, WebhookSender};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Tether webhook reliability service");

    let config = Config::load()?;
    let addr = config.parse_server_addr()?;
    info!(
        addr = %addr,
        automation_url = %config.automation_url,
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let shutdown = CancellationToken::new();

    let breaker = Arc::new(CircuitBreaker::new(config.to_circuit_config(), clock.clone()));
    let transport = HttpTransport::new(&ClientConfig::default())?;
    let sender = Arc::new(WebhookSender::new(
        transport,
        breaker.clone(),
        clock.clone(),
        config.outbound_secret.as_bytes(),
        config.to_send_config(),
    ));

    let hook = ScriptHook::new(
        &config.backup_command,
        &config.deploy_command,
        &config.rollback_command,
    );
    let probe = HttpHealthProbe::new(
        &config.health_check_url,
        Duration::from_secs(config.health_check_interval_seconds),
    );
    let pipeline = Arc::new(DeploymentPipeline::new(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(hook),
        Arc::new(probe),
        clock.clone(),
        config.to_pipeline_config(),
    ));
    let receiver = Arc::new(WebhookReceiver::new(config.inbound_secret.as_bytes(), pipeline));

    let state = AppState {
        sender,
        receiver,
        breaker,
        clock,
        automation_url: config.automation_url.clone(),
        shutdown,
    };

    info!("Tether is ready to receive webhooks");
    start_server(state, addr, Duration::from_secs(config.request_timeout)).await?;

    info!("Tether shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tether=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
