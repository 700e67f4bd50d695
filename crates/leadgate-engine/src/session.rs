// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle management.
//!
//! A session is a named WhatsApp identity bound to one phone number. Its
//! state machine: `created -> starting -> awaiting_scan -> working`, with
//! `disconnected` on connection loss and `failed` as the dead end once
//! reconnect attempts are exhausted. Logout is a one-way door: a logged-out
//! session keeps its history but is never reconnected.

use std::sync::Arc;

use leadgate_core::{GatewayApi, LeadgateError, QrCode, SessionState, UpstreamSessionStatus};
use leadgate_storage::{Database, SessionRecord, queries};
use tracing::{info, warn};

/// Creates, starts, and tears down gateway sessions.
pub struct SessionManager {
    db: Database,
    gateway: Arc<dyn GatewayApi>,
}

impl SessionManager {
    pub fn new(db: Database, gateway: Arc<dyn GatewayApi>) -> Self {
        Self { db, gateway }
    }

    /// Register a new session bound to a phone identity.
    ///
    /// Rejects duplicate names and refuses to bind a phone that already has
    /// a working session, so one identity is never connected twice.
    pub async fn create_session(&self, name: &str, phone: &str) -> Result<(), LeadgateError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(LeadgateError::InvalidInput(format!(
                "invalid session name `{name}`"
            )));
        }
        if queries::sessions::get_session(&self.db, name).await?.is_some() {
            return Err(LeadgateError::SessionLifecycle {
                session: name.to_string(),
                message: "session already exists".into(),
            });
        }
        if let Some(existing) =
            queries::sessions::working_session_for_phone(&self.db, phone).await?
        {
            return Err(LeadgateError::SessionLifecycle {
                session: name.to_string(),
                message: format!(
                    "phone identity is already connected via session `{}`",
                    existing.name
                ),
            });
        }
        queries::sessions::create_session(&self.db, name, phone).await?;
        info!(session = name, "session created");
        Ok(())
    }

    /// Ask the gateway to start the session.
    pub async fn start(&self, name: &str) -> Result<(), LeadgateError> {
        let session = self.require_session(name).await?;
        if session.logged_out {
            return Err(LeadgateError::SessionLifecycle {
                session: name.to_string(),
                message: "session is logged out".into(),
            });
        }
        let state = parse_state(&session);
        if state.is_terminal() {
            return Err(LeadgateError::SessionLifecycle {
                session: name.to_string(),
                message: format!("session is {state} and cannot be started"),
            });
        }
        self.gateway.start_session(name).await?;
        queries::sessions::update_state(&self.db, name, &SessionState::Starting.to_string())
            .await?;
        info!(session = name, "session starting");
        Ok(())
    }

    /// Fetch the authentication QR payload for a session awaiting scan.
    pub async fn qr_code(&self, name: &str) -> Result<QrCode, LeadgateError> {
        let session = self.require_session(name).await?;
        let state = parse_state(&session);
        if !state.accepts_auth_challenge() {
            return Err(LeadgateError::SessionNotReady {
                session: name.to_string(),
                state,
            });
        }
        let qr = self.gateway.qr_code(name).await?;
        queries::sessions::touch_qr_fetched(&self.db, name).await?;
        Ok(qr)
    }

    /// Poll the upstream status without recording anything.
    pub async fn poll_status(&self, name: &str) -> Result<UpstreamSessionStatus, LeadgateError> {
        self.require_session(name).await?;
        self.gateway.session_status(name).await
    }

    /// Record a state observed upstream. Entering `working` resets the
    /// reconnect counter and clears the last error.
    pub async fn record_upstream_state(
        &self,
        name: &str,
        state: SessionState,
    ) -> Result<(), LeadgateError> {
        queries::sessions::update_state(&self.db, name, &state.to_string()).await?;
        if state == SessionState::Working {
            queries::sessions::set_reconnect_attempts(&self.db, name, 0).await?;
            queries::sessions::set_last_error(&self.db, name, None).await?;
        }
        Ok(())
    }

    /// Stop the session without discarding its credentials.
    pub async fn stop(&self, name: &str) -> Result<(), LeadgateError> {
        self.require_session(name).await?;
        self.gateway.stop_session(name).await?;
        queries::sessions::update_state(&self.db, name, &SessionState::Disconnected.to_string())
            .await?;
        info!(session = name, "session stopped");
        Ok(())
    }

    /// Log the session out, discarding upstream credentials.
    ///
    /// Idempotent: logging out a session that is already logged out or that
    /// the gateway no longer knows is a no-op.
    pub async fn logout(&self, name: &str) -> Result<(), LeadgateError> {
        let Some(session) = queries::sessions::get_session(&self.db, name).await? else {
            return Ok(());
        };
        if session.logged_out {
            return Ok(());
        }
        match self.gateway.logout_session(name).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(session = name, error = %e, "gateway rejected logout, marking locally");
            }
        }
        queries::sessions::mark_logged_out(&self.db, name).await?;
        info!(session = name, "session logged out");
        Ok(())
    }

    pub async fn list(&self, state: Option<&str>) -> Result<Vec<SessionRecord>, LeadgateError> {
        queries::sessions::list_sessions(&self.db, state).await
    }

    pub async fn get(&self, name: &str) -> Result<Option<SessionRecord>, LeadgateError> {
        queries::sessions::get_session(&self.db, name).await
    }

    async fn require_session(&self, name: &str) -> Result<SessionRecord, LeadgateError> {
        queries::sessions::get_session(&self.db, name)
            .await?
            .ok_or_else(|| LeadgateError::SessionLifecycle {
                session: name.to_string(),
                message: "unknown session".into(),
            })
    }
}

fn parse_state(session: &SessionRecord) -> SessionState {
    session.state.parse().unwrap_or(SessionState::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgate_test_utils::MockGateway;
    use tempfile::tempdir;

    async fn setup() -> (Database, Arc<MockGateway>, SessionManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(MockGateway::new());
        let manager = SessionManager::new(db.clone(), gateway.clone());
        (db, gateway, manager, dir)
    }

    #[tokio::test]
    async fn create_and_start_session() {
        let (db, gateway, manager, _dir) = setup().await;

        manager.create_session("sales", "5511999998888").await.unwrap();
        manager.start("sales").await.unwrap();

        assert_eq!(gateway.started_sessions(), vec!["sales".to_string()]);
        let record = queries::sessions::get_session(&db, "sales").await.unwrap().unwrap();
        assert_eq!(record.state, "starting");
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let (_db, _gateway, manager, _dir) = setup().await;
        manager.create_session("sales", "5511999998888").await.unwrap();

        let err = manager
            .create_session("sales", "5511777776666")
            .await
            .unwrap_err();
        assert!(matches!(err, LeadgateError::SessionLifecycle { .. }));
    }

    #[tokio::test]
    async fn phone_with_working_session_cannot_bind_again() {
        let (db, _gateway, manager, _dir) = setup().await;
        manager.create_session("a", "5511999998888").await.unwrap();
        queries::sessions::update_state(&db, "a", "working").await.unwrap();

        let err = manager
            .create_session("b", "5511999998888")
            .await
            .unwrap_err();
        assert!(matches!(err, LeadgateError::SessionLifecycle { .. }));
    }

    #[tokio::test]
    async fn qr_requires_auth_phase() {
        let (db, gateway, manager, _dir) = setup().await;
        manager.create_session("s", "5511999998888").await.unwrap();

        // Created sessions have no auth challenge yet.
        let err = manager.qr_code("s").await.unwrap_err();
        assert!(matches!(err, LeadgateError::SessionNotReady { .. }));

        queries::sessions::update_state(&db, "s", "awaiting_scan").await.unwrap();
        let qr = manager.qr_code("s").await.unwrap();
        assert!(!qr.payload.is_empty());
        assert_eq!(gateway.qr_fetches(), 1);

        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert!(record.qr_fetched_at.is_some());
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_blocks_restart() {
        let (db, gateway, manager, _dir) = setup().await;
        manager.create_session("s", "5511999998888").await.unwrap();
        queries::sessions::update_state(&db, "s", "working").await.unwrap();

        manager.logout("s").await.unwrap();
        manager.logout("s").await.unwrap();
        manager.logout("never-existed").await.unwrap();
        assert_eq!(gateway.logged_out_sessions(), vec!["s".to_string()]);

        let err = manager.start("s").await.unwrap_err();
        assert!(matches!(err, LeadgateError::SessionLifecycle { .. }));
    }

    #[tokio::test]
    async fn failed_session_cannot_be_started() {
        let (db, _gateway, manager, _dir) = setup().await;
        manager.create_session("s", "5511999998888").await.unwrap();
        queries::sessions::update_state(&db, "s", "failed").await.unwrap();

        let err = manager.start("s").await.unwrap_err();
        assert!(matches!(err, LeadgateError::SessionLifecycle { .. }));
    }

    #[tokio::test]
    async fn working_state_resets_reconnect_bookkeeping() {
        let (db, _gateway, manager, _dir) = setup().await;
        manager.create_session("s", "5511999998888").await.unwrap();
        queries::sessions::set_reconnect_attempts(&db, "s", 3).await.unwrap();
        queries::sessions::set_last_error(&db, "s", Some("boom")).await.unwrap();

        manager
            .record_upstream_state("s", SessionState::Working)
            .await
            .unwrap();

        let record = queries::sessions::get_session(&db, "s").await.unwrap().unwrap();
        assert_eq!(record.state, "working");
        assert_eq!(record.reconnect_attempts, 0);
        assert!(record.last_error.is_none());
    }
}
