//! k8spulse - Kubernetes cluster health snapshot agent
//!
//! Runs monitoring cycles on a fixed interval, stores every snapshot in
//! SQLite, renders an HTML report per environment and serves health,
//! metrics and history over HTTP.

use anyhow::{Context, Result};
use k8spulse_agent::{api, config::PulseConfig};
use pulse_lib::{
    collaborators::{
        credential_from_env, AuditEventsClient, GitPublisher, OpenAiRecommender,
        OPENAI_API_KEY_VAR,
    },
    cycle::{MonitorCycleBuilder, MonitorLoop},
    health::{components, HealthRegistry},
    history::HistoryStore,
    observability::{PulseMetrics, StructuredLogger},
    source::KubeSource,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = PulseConfig::load()?;
    let logger = StructuredLogger::new(config.env_name.clone());
    logger.log_startup(AGENT_VERSION, config.interval_secs);

    let health_registry = HealthRegistry::with_default_components().await;
    let metrics = PulseMetrics::new().context("Failed to register metrics")?;

    let source = KubeSource::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let store = HistoryStore::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    info!(path = %config.database_path.display(), "History store opened");

    let mut builder = MonitorCycleBuilder::new()
        .source(Arc::new(source))
        .store(store.clone())
        .health(health_registry.clone())
        .metrics(metrics)
        .config(config.cycle_config());

    if config.use_ai {
        let recommender = OpenAiRecommender::new(
            config.openai_base_url.clone(),
            credential_from_env(OPENAI_API_KEY_VAR),
        )?;
        builder = builder.recommender(Arc::new(recommender));
    }
    if config.audit_events {
        builder = builder.audit_events(Arc::new(AuditEventsClient::from_env()?));
    }
    if config.git_commit {
        builder = builder.publisher(GitPublisher::new(None));
    }
    let cycle = builder.build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut monitor = tokio::spawn(MonitorLoop::new(cycle, config.interval()).run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), store.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = &mut monitor => {
            // the loop only returns on its own after a store failure
            health_registry
                .set_unhealthy(components::HISTORY_STORE, "monitoring loop stopped")
                .await;
            api_handle.abort();
            store.close().await;
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Monitoring loop failed");
                    Err(e)
                }
                Err(e) => Err(anyhow::Error::new(e).context("Monitoring task panicked")),
            };
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    // a send error means the loop already exited
    let _ = shutdown_tx.send(());
    if let Err(e) = monitor.await {
        error!(error = %e, "Monitoring task panicked");
    }
    api_handle.abort();
    store.close().await;
    info!("Shutting down");

    Ok(())
}
