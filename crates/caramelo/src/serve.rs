// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `caramelo serve` command implementation.
//!
//! Opens the store, wires the four components (customer memory,
//! opportunity tracker, follow-up scheduler, payment ledger) around a
//! shared database handle and the WAHA gateway, starts the two dispatch
//! loops, and serves the webhook endpoints until shutdown.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use caramelo_config::model::CarameloConfig;
use caramelo_core::CarameloError;
use caramelo_core::traits::ChatGateway;
use caramelo_storage::Database;
use tracing::{info, warn};

use crate::followup::FollowUpScheduler;
use crate::gateway::WahaGateway;
use crate::memory::CustomerMemory;
use crate::opportunities::OpportunityTracker;
use crate::payments::PaymentLedger;
use crate::shutdown;
use crate::webhook::{self, AppState};

/// Runs the `caramelo serve` command.
pub async fn run_serve(config: CarameloConfig) -> Result<(), CarameloError> {
    init_tracing(&config.agent.log_level);

    info!("starting caramelo serve");

    let db = Database::open(&config.storage.database_path).await?;
    let caps = db.capabilities();
    info!(
        immediate_followups = caps.immediate_followups,
        appointment_reminders = caps.appointment_reminders,
        payments = caps.payments,
        "store ready"
    );

    let api_url = config.waha.api_url.as_deref().ok_or_else(|| {
        CarameloError::Config(
            "waha.api_url is required for serve. Set it in caramelo.toml or CARAMELO_WAHA_API_URL."
                .to_string(),
        )
    })?;
    let gateway: Arc<dyn ChatGateway> = Arc::new(WahaGateway::new(
        api_url,
        config.waha.api_key.as_deref(),
        &config.waha.session,
    )?);
    match gateway.session_status().await {
        Ok(status) => info!(status = %status, session = %config.waha.session, "WAHA session"),
        Err(e) => warn!(error = %e, "WAHA session status unavailable, continuing"),
    }

    let memory = CustomerMemory::new(db.clone());
    let tracker = OpportunityTracker::new(db.clone());
    let scheduler = FollowUpScheduler::new(
        db.clone(),
        gateway.clone(),
        config.followup.max_unanswered,
    );
    let ledger = PaymentLedger::new(db.clone(), config.payments.provider.clone(), tracker);

    if config.payments.enabled && !caps.payments {
        warn!("payments enabled in config but ledger schema unavailable, events will degrade");
    }

    // Install signal handler.
    let cancel = shutdown::install_signal_handler();

    // Spawn the follow-up poll loop.
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(config.followup.poll_interval_secs);
        tokio::spawn(async move {
            scheduler.run_followup_loop(interval, cancel).await;
        });
        info!(
            poll_interval_secs = config.followup.poll_interval_secs,
            "follow-up loop started"
        );
    }

    // Spawn the appointment-reminder sweep loop.
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(config.followup.reminder_poll_interval_secs);
        tokio::spawn(async move {
            scheduler.run_reminder_loop(interval, cancel).await;
        });
        info!(
            poll_interval_secs = config.followup.reminder_poll_interval_secs,
            "reminder loop started"
        );
    }

    let state = AppState {
        agent_name: config.agent.name.clone(),
        session: config.waha.session.clone(),
        webhook_path: config.server.webhook_path.clone(),
        payments_enabled: config.payments.enabled,
        memory,
        ledger,
        gateway,
        started_at: Instant::now(),
        messages_processed: Arc::new(AtomicU64::new(0)),
    };
    let app = webhook::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CarameloError::Gateway {
            message: format!("failed to bind webhook server to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;
    info!(addr = %addr, webhook_path = %config.server.webhook_path, "webhook server listening");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_cancel.cancelled().await })
        .await
        .map_err(|e| CarameloError::Gateway {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    db.close().await?;
    info!("caramelo serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("caramelo={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
