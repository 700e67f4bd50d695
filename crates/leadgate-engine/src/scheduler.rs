// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable scheduled-send queue draining.
//!
//! Entries survive restarts in SQLite and are removed only after the
//! gateway acknowledged the send. Transient dispatch failures requeue the
//! entry with exponential backoff until its attempt budget runs out;
//! permanent failures never retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use leadgate_config::model::SchedulerConfig;
use leadgate_core::{LeadgateError, MessageContent, OutboundMessage};
use leadgate_storage::{Database, ScheduleEntry, queries};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::events::{AlertBus, AlertEvent};

/// Drains due schedule entries through the dispatcher.
pub struct Scheduler {
    db: Database,
    dispatcher: Arc<Dispatcher>,
    alerts: AlertBus,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        db: Database,
        dispatcher: Arc<Dispatcher>,
        alerts: AlertBus,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            alerts,
            config,
        }
    }

    /// Persist a message and schedule it. `due_at` of `None` means now.
    /// Returns the message id.
    pub async fn enqueue(
        &self,
        session: &str,
        recipient: &str,
        content: &MessageContent,
        due_at: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<String, LeadgateError> {
        let mut message = OutboundMessage::new(session, recipient, content.clone());
        if let Some(correlation_id) = correlation_id {
            message.correlation_id = correlation_id.to_string();
        }
        let content_json = serde_json::to_string(content)
            .map_err(|e| LeadgateError::Internal(format!("failed to encode content: {e}")))?;
        queries::messages::insert_message(
            &self.db,
            &message.id,
            session,
            recipient,
            &content_json,
            &message.correlation_id,
        )
        .await?;
        queries::queue::enqueue(
            &self.db,
            &message.id,
            due_at,
            i64::from(self.config.max_attempts),
        )
        .await?;
        debug!(message_id = %message.id, due_at = ?due_at, "message scheduled");
        Ok(message.id)
    }

    /// Drain until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.drain_interval_secs));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler stopped");
                    return;
                }
                _ = interval.tick() => self.drain().await,
            }
        }
    }

    /// Process every entry that is currently due.
    pub async fn drain(&self) {
        if self.config.business_hours_enabled {
            let hour = chrono::Utc::now().hour();
            if !within_business_hours(
                hour,
                u32::from(self.config.business_hours_start),
                u32::from(self.config.business_hours_end),
            ) {
                debug!(hour, "outside business hours, deferring scheduled sends");
                return;
            }
        }

        loop {
            let entry = match queries::queue::claim_due(&self.db).await {
                Ok(Some(entry)) => entry,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "could not claim schedule entry");
                    return;
                }
            };
            if let Err(e) = self.process_entry(&entry).await {
                warn!(entry_id = entry.id, error = %e, "schedule entry processing failed");
            }
        }
    }

    async fn process_entry(&self, entry: &ScheduleEntry) -> Result<(), LeadgateError> {
        let Some(message) = queries::messages::get_message(&self.db, &entry.message_id).await?
        else {
            warn!(entry_id = entry.id, message_id = %entry.message_id, "message row is gone");
            queries::queue::fail_permanent(&self.db, entry.id, "message row missing").await?;
            return Ok(());
        };

        if message.status != "pending" {
            // Already dispatched or failed by another path; nothing to send.
            queries::queue::ack(&self.db, entry.id).await?;
            return Ok(());
        }

        match self.dispatcher.dispatch(&message).await {
            Ok(()) => {
                queries::queue::ack(&self.db, entry.id).await?;
                Ok(())
            }
            Err(e) if e.is_transient() => {
                let requeued = queries::queue::fail(
                    &self.db,
                    entry.id,
                    self.config.retry_backoff_secs,
                    &e.to_string(),
                )
                .await?;
                if requeued {
                    debug!(entry_id = entry.id, error = %e, "entry requeued with backoff");
                } else {
                    warn!(entry_id = entry.id, error = %e, "attempt budget exhausted");
                    queries::messages::mark_failed(&self.db, &message.id).await?;
                    self.alerts.publish(AlertEvent::MessageFailed {
                        message_id: message.id.clone(),
                        reason: format!("retries exhausted: {e}"),
                    });
                }
                Ok(())
            }
            Err(e) => {
                // The dispatcher already moved the message to failed.
                queries::queue::fail_permanent(&self.db, entry.id, &e.to_string()).await?;
                Ok(())
            }
        }
    }
}

/// Whether `hour` (UTC, 0-23) is inside the `[start, end)` window.
/// Windows that cross midnight (start > end) wrap around.
pub fn within_business_hours(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgate_config::model::DispatchConfig;
    use leadgate_test_utils::MockGateway;
    use tempfile::tempdir;

    async fn setup(
        config: SchedulerConfig,
    ) -> (Database, Arc<MockGateway>, Scheduler, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(MockGateway::new());
        let alerts = AlertBus::new(8);
        let dispatcher = Arc::new(Dispatcher::new(
            db.clone(),
            gateway.clone(),
            alerts.clone(),
            DispatchConfig::default(),
        ));
        let scheduler = Scheduler::new(db.clone(), dispatcher, alerts, config);
        (db, gateway, scheduler, dir)
    }

    async fn working_session(db: &Database, name: &str) {
        queries::sessions::create_session(db, name, "551100000000")
            .await
            .unwrap();
        queries::sessions::update_state(db, name, "working").await.unwrap();
    }

    fn text(body: &str) -> MessageContent {
        MessageContent::Text { body: body.into() }
    }

    #[tokio::test]
    async fn enqueue_and_drain_delivers_due_messages() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;

        let id = scheduler
            .enqueue("main", "5511999998888", &text("hi"), None, None)
            .await
            .unwrap();
        scheduler.drain().await;

        assert_eq!(gateway.sends().len(), 1);
        let message = queries::messages::get_message(&db, &id).await.unwrap().unwrap();
        assert_eq!(message.status, "sent");
        let entries = queries::queue::list_entries(&db, Some("completed"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn same_due_time_entries_for_distinct_recipients_all_drain() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;
        let due = "2020-01-01T00:00:00.000Z";

        scheduler
            .enqueue("main", "5511999998888", &text("a"), Some(due), None)
            .await
            .unwrap();
        scheduler
            .enqueue("main", "5511999997777", &text("b"), Some(due), None)
            .await
            .unwrap();
        scheduler.drain().await;

        let sends = gateway.sends();
        assert_eq!(sends.len(), 2);
        let recipients: Vec<&str> = sends.iter().map(|s| s.recipient.as_str()).collect();
        assert!(recipients.contains(&"5511999998888"));
        assert!(recipients.contains(&"5511999997777"));
        let entries = queries::queue::list_entries(&db, Some("completed"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn retry_never_reorders_messages_to_the_same_recipient() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;
        gateway.push_send_failure(LeadgateError::TransientGateway {
            message: "gateway returned 503".into(),
            source: None,
        });

        scheduler
            .enqueue("main", "5511999998888", &text("first"), None, None)
            .await
            .unwrap();
        scheduler
            .enqueue("main", "5511999998888", &text("second"), None, None)
            .await
            .unwrap();

        // The first send fails transiently; "second" must wait behind it
        // instead of reaching the gateway.
        scheduler.drain().await;
        assert!(gateway.sends().is_empty());

        // Fast-forward past the backoff hold-off and drain again.
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE schedule SET locked_until = '2020-01-01T00:00:00.000Z'
                     WHERE locked_until IS NOT NULL",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        scheduler.drain().await;

        let bodies: Vec<String> = gateway
            .sends()
            .iter()
            .map(|s| match &s.content {
                MessageContent::Text { body } => body.clone(),
                other => panic!("unexpected content {other:?}"),
            })
            .collect();
        assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn future_entries_are_left_alone() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;

        scheduler
            .enqueue(
                "main",
                "5511999998888",
                &text("later"),
                Some("2999-01-01T00:00:00.000Z"),
                None,
            )
            .await
            .unwrap();
        scheduler.drain().await;

        assert!(gateway.sends().is_empty());
        let entries = queries::queue::list_entries(&db, Some("pending"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_requeues_with_backoff() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;
        gateway.push_send_failure(LeadgateError::TransientGateway {
            message: "gateway returned 503".into(),
            source: None,
        });

        let id = scheduler
            .enqueue("main", "5511999998888", &text("hi"), None, None)
            .await
            .unwrap();
        scheduler.drain().await;

        let message = queries::messages::get_message(&db, &id).await.unwrap().unwrap();
        assert_eq!(message.status, "pending");
        let entries = queries::queue::list_entries(&db, Some("pending"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);
        // Backed off into the future, so an immediate second drain is a no-op.
        scheduler.drain().await;
        assert!(gateway.sends().is_empty());
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_message_and_alert() {
        let config = SchedulerConfig {
            max_attempts: 1,
            ..SchedulerConfig::default()
        };
        let (db, gateway, scheduler, _dir) = setup(config).await;
        let mut alerts = scheduler.alerts.subscribe();
        working_session(&db, "main").await;
        gateway.push_send_failure(LeadgateError::TransientGateway {
            message: "gateway returned 503".into(),
            source: None,
        });

        let id = scheduler
            .enqueue("main", "5511999998888", &text("hi"), None, None)
            .await
            .unwrap();
        scheduler.drain().await;

        let message = queries::messages::get_message(&db, &id).await.unwrap().unwrap();
        assert_eq!(message.status, "failed");
        let entries = queries::queue::list_entries(&db, Some("failed"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            alerts.recv().await.unwrap(),
            AlertEvent::MessageFailed { .. }
        ));
    }

    #[tokio::test]
    async fn permanent_failure_never_requeues() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;
        gateway.push_send_failure(LeadgateError::PermanentGateway {
            message: "gateway returned 400".into(),
            source: None,
        });

        let id = scheduler
            .enqueue("main", "5511999998888", &text("hi"), None, None)
            .await
            .unwrap();
        scheduler.drain().await;

        let message = queries::messages::get_message(&db, &id).await.unwrap().unwrap();
        assert_eq!(message.status, "failed");
        let entries = queries::queue::list_entries(&db, Some("failed"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn already_handled_message_is_acked_without_resend() {
        let (db, gateway, scheduler, _dir) = setup(SchedulerConfig::default()).await;
        working_session(&db, "main").await;

        let id = scheduler
            .enqueue("main", "5511999998888", &text("hi"), None, None)
            .await
            .unwrap();
        queries::messages::mark_failed(&db, &id).await.unwrap();
        scheduler.drain().await;

        assert!(gateway.sends().is_empty());
        let entries = queries::queue::list_entries(&db, Some("completed"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn business_hours_window() {
        assert!(within_business_hours(9, 9, 18));
        assert!(within_business_hours(17, 9, 18));
        assert!(!within_business_hours(18, 9, 18));
        assert!(!within_business_hours(3, 9, 18));
        // Overnight window.
        assert!(within_business_hours(23, 22, 6));
        assert!(within_business_hours(2, 22, 6));
        assert!(!within_business_hours(12, 22, 6));
        // Degenerate window admits nothing.
        assert!(!within_business_hours(10, 10, 10));
    }
}
