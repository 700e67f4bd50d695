// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `leadgate serve` command implementation.
//!
//! Wires the storage layer, upstream gateway client, dispatch pipeline,
//! session monitor, scheduler and classifier together, then serves the
//! webhook and management HTTP API until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use leadgate_config::LeadgateConfig;
use leadgate_core::{ClassifierProvider, GatewayApi, LeadgateError};
use leadgate_engine::{
    AlertBus, AlertEvent, Dispatcher, FunnelPipeline, Scheduler, SessionManager, SessionMonitor,
    WebhookProcessor,
};
use leadgate_llm::ChatClassifier;
use leadgate_server::{AppState, start_server};
use leadgate_storage::{Database, queries};
use leadgate_waha::WahaClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs the `leadgate serve` command.
pub async fn run_serve(config: LeadgateConfig) -> Result<(), LeadgateError> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting leadgate serve");

    let db = Database::open(&config.storage.database_path).await?;

    let gateway: Arc<dyn GatewayApi> = Arc::new(WahaClient::new(
        &config.gateway.base_url,
        config.gateway.api_key.as_deref(),
        config.gateway.request_timeout_secs,
        config.gateway.max_retries,
    )?);

    let classifier: Option<Arc<dyn ClassifierProvider>> = if config.classifier.enabled {
        let client = ChatClassifier::new(
            &config.classifier.base_url,
            config.classifier.api_key.as_deref(),
            &config.classifier.model,
            config.classifier.temperature,
            config.classifier.max_tokens,
            config.classifier.timeout_secs,
        )?;
        info!(model = %config.classifier.model, "classifier enabled");
        Some(Arc::new(client))
    } else {
        info!("classifier disabled, falling back to keyword heuristics");
        None
    };

    let alerts = AlertBus::new(64);
    let dispatcher = Arc::new(Dispatcher::new(
        db.clone(),
        gateway.clone(),
        alerts.clone(),
        config.dispatch.clone(),
    ));
    let sessions = Arc::new(SessionManager::new(db.clone(), gateway.clone()));
    let scheduler = Arc::new(Scheduler::new(
        db.clone(),
        dispatcher.clone(),
        alerts.clone(),
        config.scheduler.clone(),
    ));
    let monitor = Arc::new(SessionMonitor::new(
        db.clone(),
        gateway,
        alerts.clone(),
        config.monitor.clone(),
    ));
    let pipeline = Arc::new(FunnelPipeline::new(
        db.clone(),
        classifier,
        scheduler.clone(),
        alerts.clone(),
        config.classifier.clone(),
    ));
    let processor = Arc::new(WebhookProcessor::new(
        db.clone(),
        dispatcher,
        sessions.clone(),
        pipeline,
    ));

    // Install signal handler.
    let cancel = install_signal_handler();

    // Alert log sink. Operators tail the log for these.
    {
        let mut receiver = alerts.subscribe();
        let alert_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv() => match event {
                        Ok(AlertEvent::SessionFailed { session, reason }) => {
                            error!(session = %session, reason = %reason, "session failed");
                        }
                        Ok(AlertEvent::MessageFailed { message_id, reason }) => {
                            warn!(message_id = %message_id, reason = %reason, "message failed");
                        }
                        Ok(AlertEvent::HumanReviewNeeded { contact_id, reason }) => {
                            warn!(contact_id = %contact_id, reason = %reason, "human review needed");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "alert sink lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = alert_cancel.cancelled() => break,
                }
            }
        });
    }

    // Session health polling and scheduled sends.
    {
        let monitor = monitor.clone();
        let monitor_cancel = cancel.clone();
        tokio::spawn(async move {
            monitor.run(monitor_cancel).await;
        });
    }
    {
        let scheduler = scheduler.clone();
        let scheduler_cancel = cancel.clone();
        tokio::spawn(async move {
            scheduler.run(scheduler_cancel).await;
        });
    }

    // Daily pruning of webhook idempotency keys.
    {
        let prune_db = db.clone();
        let retention_days = i64::from(config.storage.webhook_retention_days);
        let prune_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            // Skip the first immediate tick.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match queries::webhook_events::prune_older_than(&prune_db, retention_days)
                            .await
                        {
                            Ok(removed) => debug!(removed, "pruned webhook idempotency keys"),
                            Err(e) => warn!(error = %e, "webhook key pruning failed"),
                        }
                    }
                    _ = prune_cancel.cancelled() => break,
                }
            }
        });
    }

    let state = AppState {
        db,
        sessions,
        scheduler,
        processor,
    };

    tokio::select! {
        result = start_server(&config.server, state) => result?,
        _ = cancel.cancelled() => {}
    }

    info!("leadgate serve shutdown complete");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is
/// received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence; the default keeps leadgate crates at info.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leadgate=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
