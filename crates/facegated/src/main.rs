use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use facegate_ledger::{AuditLog, InventoryLedger};
use facegated::config::Config;
use facegated::engine::{self, DecisionPolicy};
use facegated::http::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();
    let seed = config.load_seed()?;
    tracing::info!(items = seed.len(), "inventory seeded");

    let ledger = Arc::new(Mutex::new(InventoryLedger::new(seed)));
    let audit = Arc::new(AuditLog::new());

    // A missing model is not fatal for the process: the inventory side
    // keeps serving, and /initialize can retry the load.
    let policy = DecisionPolicy {
        authorized_label: config.authorized_label,
        match_threshold: config.match_threshold,
    };
    let engine = match engine::spawn_engine(
        &config.detector_model_path(),
        &config.classifier_model_path(),
        config.detect_score_threshold,
        policy,
    ) {
        Ok(handle) => {
            tracing::info!("verification engine ready");
            Some(handle)
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                "verification engine unavailable; /verify-face will fail until /initialize succeeds"
            );
            None
        }
    };

    let state = AppState {
        engine: Arc::new(RwLock::new(engine)),
        ledger,
        audit,
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "facegated listening");

    axum::serve(listener, http::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
