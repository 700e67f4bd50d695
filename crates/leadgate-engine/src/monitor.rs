// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background session health monitor.
//!
//! Polls the gateway for every active session, mirrors upstream state into
//! storage, refreshes stale QR challenges, and drives bounded
//! exponential-backoff reconnects. A session that exhausts its reconnect
//! budget is moved to `failed` and an alert is raised. The monitor itself
//! never gives up: poll and storage errors are logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use leadgate_config::model::MonitorConfig;
use leadgate_core::{GatewayApi, LeadgateError, SessionState};
use leadgate_storage::{Database, SessionRecord, queries};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{AlertBus, AlertEvent};

/// Watches session health and reconnects dropped sessions.
pub struct SessionMonitor {
    db: Database,
    gateway: Arc<dyn GatewayApi>,
    alerts: AlertBus,
    config: MonitorConfig,
    /// Consecutive failed polls per session.
    missed_polls: DashMap<String, u32>,
    /// Earliest time the next reconnect attempt is allowed, per session.
    retry_at: DashMap<String, Instant>,
}

impl SessionMonitor {
    pub fn new(
        db: Database,
        gateway: Arc<dyn GatewayApi>,
        alerts: AlertBus,
        config: MonitorConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            alerts,
            config,
            missed_polls: DashMap::new(),
            retry_at: DashMap::new(),
        }
    }

    /// Poll until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("session monitor stopped");
                    return;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    /// One monitoring pass over all active sessions.
    pub async fn tick(&self) {
        let sessions = match queries::sessions::list_sessions(&self.db, None).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "could not list sessions, skipping monitor pass");
                return;
            }
        };

        for record in sessions {
            if record.logged_out {
                continue;
            }
            let state: SessionState =
                record.state.parse().unwrap_or(SessionState::Disconnected);
            if state == SessionState::Created || state.is_terminal() {
                continue;
            }
            if let Err(e) = self.check_session(&record).await {
                warn!(session = %record.name, error = %e, "session check failed");
            }
        }
    }

    async fn check_session(&self, record: &SessionRecord) -> Result<(), LeadgateError> {
        match self.gateway.session_status(&record.name).await {
            Ok(status) => {
                self.missed_polls.remove(&record.name);
                self.apply_upstream_state(record, status.state, &status.raw).await
            }
            Err(e) => {
                let misses = {
                    let mut entry = self.missed_polls.entry(record.name.clone()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                warn!(session = %record.name, misses, error = %e, "status poll failed");
                if misses < self.config.grace_polls {
                    return Ok(());
                }
                self.missed_polls.remove(&record.name);
                queries::sessions::set_last_error(&self.db, &record.name, Some(&e.to_string()))
                    .await?;
                self.handle_disconnect(record).await
            }
        }
    }

    async fn apply_upstream_state(
        &self,
        record: &SessionRecord,
        state: SessionState,
        raw: &str,
    ) -> Result<(), LeadgateError> {
        match state {
            SessionState::Working => {
                self.retry_at.remove(&record.name);
                if record.state != "working" {
                    info!(session = %record.name, "session is working");
                    queries::sessions::update_state(&self.db, &record.name, "working").await?;
                    queries::sessions::set_reconnect_attempts(&self.db, &record.name, 0).await?;
                    queries::sessions::set_last_error(&self.db, &record.name, None).await?;
                }
                Ok(())
            }
            SessionState::Starting => {
                if record.state != "starting" {
                    queries::sessions::update_state(&self.db, &record.name, "starting").await?;
                }
                Ok(())
            }
            SessionState::AwaitingScan => {
                if record.state != "awaiting_scan" {
                    queries::sessions::update_state(&self.db, &record.name, "awaiting_scan")
                        .await?;
                }
                self.refresh_qr_if_stale(record).await
            }
            SessionState::Disconnected | SessionState::Failed => {
                queries::sessions::set_last_error(
                    &self.db,
                    &record.name,
                    Some(&format!("upstream reported {raw}")),
                )
                .await?;
                self.handle_disconnect(record).await
            }
            SessionState::Created => Ok(()),
        }
    }

    /// Re-fetch the QR challenge when the stored one is older than the
    /// refresh window. WhatsApp QR payloads expire upstream, so a stale one
    /// can never be scanned successfully.
    async fn refresh_qr_if_stale(&self, record: &SessionRecord) -> Result<(), LeadgateError> {
        let stale = match record.qr_fetched_at.as_deref().and_then(parse_timestamp) {
            Some(fetched_at) => {
                let age = Utc::now().signed_duration_since(fetched_at);
                age.num_seconds() >= self.config.qr_refresh_secs as i64
            }
            None => true,
        };
        if !stale {
            return Ok(());
        }
        match self.gateway.qr_code(&record.name).await {
            Ok(_) => {
                info!(session = %record.name, "QR challenge refreshed");
                queries::sessions::touch_qr_fetched(&self.db, &record.name).await
            }
            Err(e) => {
                warn!(session = %record.name, error = %e, "QR refresh failed");
                Ok(())
            }
        }
    }

    async fn handle_disconnect(&self, record: &SessionRecord) -> Result<(), LeadgateError> {
        let attempts = record.reconnect_attempts.max(0) as u32;
        if attempts >= self.config.max_reconnect_attempts {
            self.retry_at.remove(&record.name);
            queries::sessions::update_state(&self.db, &record.name, "failed").await?;
            warn!(session = %record.name, attempts, "reconnect attempts exhausted");
            self.alerts.publish(AlertEvent::SessionFailed {
                session: record.name.clone(),
                reason: format!("reconnect attempts exhausted after {attempts}"),
            });
            return Ok(());
        }

        if record.state != "disconnected" {
            queries::sessions::update_state(&self.db, &record.name, "disconnected").await?;
        }

        let not_before = self.retry_at.get(&record.name).map(|at| *at);
        if let Some(at) = not_before {
            if Instant::now() < at {
                return Ok(());
            }
        }

        info!(session = %record.name, attempt = attempts + 1, "attempting reconnect");
        match self.gateway.start_session(&record.name).await {
            Ok(()) => {
                queries::sessions::update_state(&self.db, &record.name, "starting").await?;
            }
            Err(e) => {
                warn!(session = %record.name, error = %e, "reconnect attempt failed");
                queries::sessions::set_last_error(&self.db, &record.name, Some(&e.to_string()))
                    .await?;
            }
        }
        queries::sessions::set_reconnect_attempts(&self.db, &record.name, i64::from(attempts) + 1)
            .await?;

        let backoff = self
            .config
            .reconnect_backoff_secs
            .saturating_mul(1u64 << attempts.min(16))
            .min(self.config.reconnect_backoff_cap_secs);
        self.retry_at.insert(
            record.name.clone(),
            Instant::now() + Duration::from_secs(backoff),
        );
        Ok(())
    }
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgate_test_utils::MockGateway;
    use tempfile::tempdir;

    fn test_config() -> MonitorConfig {
        MonitorConfig {
            max_reconnect_attempts: 2,
            reconnect_backoff_secs: 60,
            ..MonitorConfig::default()
        }
    }

    async fn setup(
        config: MonitorConfig,
    ) -> (Database, Arc<MockGateway>, SessionMonitor, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(MockGateway::new());
        let monitor = SessionMonitor::new(db.clone(), gateway.clone(), AlertBus::new(8), config);
        (db, gateway, monitor, dir)
    }

    async fn session_in_state(db: &Database, name: &str, state: &str) {
        queries::sessions::create_session(db, name, "5511999998888")
            .await
            .unwrap();
        queries::sessions::update_state(db, name, state).await.unwrap();
    }

    #[tokio::test]
    async fn disconnected_session_is_reconnected() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "s", "working").await;
        gateway.push_status(SessionState::Disconnected, "STOPPED");

        monitor.tick().await;

        assert_eq!(gateway.started_sessions(), vec!["s".to_string()]);
        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "starting");
        assert_eq!(record.reconnect_attempts, 1);
    }

    #[tokio::test]
    async fn second_disconnect_inside_backoff_window_waits() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "s", "working").await;

        gateway.push_status(SessionState::Disconnected, "STOPPED");
        monitor.tick().await;
        gateway.push_status(SessionState::Disconnected, "STOPPED");
        monitor.tick().await;

        // The second tick lands inside the 60 second backoff window, so no
        // new start is issued.
        assert_eq!(gateway.started_sessions().len(), 1);
        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.reconnect_attempts, 1);
    }

    #[tokio::test]
    async fn exhausted_reconnects_mark_session_failed() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        let mut alerts = monitor.alerts.subscribe();
        session_in_state(&db, "s", "disconnected").await;
        queries::sessions::set_reconnect_attempts(&db, "s", 2).await.unwrap();
        gateway.push_status(SessionState::Disconnected, "STOPPED");

        monitor.tick().await;

        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "failed");
        assert!(matches!(
            alerts.recv().await.unwrap(),
            AlertEvent::SessionFailed { .. }
        ));
        assert!(gateway.started_sessions().is_empty());
    }

    #[tokio::test]
    async fn poll_failures_are_tolerated_within_grace() {
        let config = MonitorConfig {
            grace_polls: 2,
            ..test_config()
        };
        let (db, gateway, monitor, _dir) = setup(config).await;
        session_in_state(&db, "s", "working").await;

        gateway.push_status_error(LeadgateError::TransientGateway {
            message: "connect refused".into(),
            source: None,
        });
        monitor.tick().await;

        // One miss is within grace: no state change, no reconnect.
        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "working");
        assert!(gateway.started_sessions().is_empty());

        gateway.push_status_error(LeadgateError::TransientGateway {
            message: "connect refused".into(),
            source: None,
        });
        monitor.tick().await;

        // Second consecutive miss crosses the threshold.
        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "starting");
        assert_eq!(gateway.started_sessions(), vec!["s".to_string()]);
    }

    #[tokio::test]
    async fn working_report_resets_reconnect_bookkeeping() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "s", "disconnected").await;
        queries::sessions::set_reconnect_attempts(&db, "s", 1).await.unwrap();
        gateway.push_status(SessionState::Working, "WORKING");

        monitor.tick().await;

        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "working");
        assert_eq!(record.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn awaiting_scan_refreshes_missing_qr() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "s", "awaiting_scan").await;
        gateway.push_status(SessionState::AwaitingScan, "SCAN_QR_CODE");

        monitor.tick().await;

        assert_eq!(gateway.qr_fetches(), 1);
        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert!(record.qr_fetched_at.is_some());
    }

    #[tokio::test]
    async fn fresh_qr_is_not_refetched() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "s", "awaiting_scan").await;
        queries::sessions::touch_qr_fetched(&db, "s").await.unwrap();
        gateway.push_status(SessionState::AwaitingScan, "SCAN_QR_CODE");

        monitor.tick().await;

        assert_eq!(gateway.qr_fetches(), 0);
    }

    #[tokio::test]
    async fn logged_out_and_terminal_sessions_are_skipped() {
        let (db, gateway, monitor, _dir) = setup(test_config()).await;
        session_in_state(&db, "out", "working").await;
        queries::sessions::mark_logged_out(&db, "out").await.unwrap();
        session_in_state(&db, "dead", "failed").await;
        session_in_state(&db, "new", "created").await;

        monitor.tick().await;

        assert!(gateway.started_sessions().is_empty());
        assert_eq!(gateway.qr_fetches(), 0);
    }
}
