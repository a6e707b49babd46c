// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;
use std::sync::Arc;

use relational_trust::audit::StoreAuditSink;
use relational_trust::clock::SystemClock;
use relational_trust::config::TrustConfig;
use relational_trust::logging::{init_logging, LogFormat, DEFAULT_LOG_FILTER};
use relational_trust::state::TrustState;
use relational_trust::store::{KeyedStore, RedbStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIRMATION_QUEUE_DEPTH: usize = 1_024;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging(DEFAULT_LOG_FILTER, LogFormat::from_env()) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match TrustConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(
        rp_id = %config.rp_id,
        db_path = %config.db_path.display(),
        threat_feed = config.threat_feed_url.is_some(),
        "Configuration loaded"
    );

    let store: Arc<dyn KeyedStore> = match RedbStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, db_path = %config.db_path.display(), "Failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let audit = Arc::new(StoreAuditSink::new(store.clone()));
    let state = match TrustState::new(&config, store, Arc::new(SystemClock), audit) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to build trust state");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(
        state.maintenance_sweeper().run(shutdown.clone()),
    ));

    // Held until shutdown so the listener stays up for in-process producers
    let (confirmations, listener) =
        state.spawn_confirmation_listener(CONFIRMATION_QUEUE_DEPTH, shutdown.clone());
    tasks.push(listener);

    match state.threat_refresher() {
        Ok(Some(refresher)) => tasks.push(tokio::spawn(refresher.run(shutdown.clone()))),
        Ok(None) => info!("No threat feed configured; refresher disabled"),
        Err(e) => warn!(error = %e, "Threat feed refresher disabled"),
    }

    info!("Relational trust service running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutdown requested");
    shutdown.cancel();
    drop(confirmations);
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("Relational trust service stopped");
    ExitCode::SUCCESS
}
