// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message dispatch.
//!
//! The dispatcher is the only component that submits messages to the
//! gateway. It serializes sends per recipient (FIFO within a conversation),
//! rate limits per session with a token bucket, and records submission
//! exactly once via a guarded status transition.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dashmap::DashMap;
use leadgate_config::model::DispatchConfig;
use leadgate_core::{DeliveryStatus, GatewayApi, LeadgateError, MessageContent, SessionState};
use leadgate_storage::{Database, StoredMessage, queries};
use regex::Regex;
use tracing::{debug, warn};

use crate::events::{AlertBus, AlertEvent};
use crate::ratelimit::TokenBucket;

static RECIPIENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-]{6,18}[0-9]$").expect("valid regex"));

/// Validates a recipient phone number and returns its digits.
pub fn normalize_recipient(recipient: &str) -> Result<String, LeadgateError> {
    if !RECIPIENT_RE.is_match(recipient) {
        return Err(LeadgateError::InvalidInput(format!(
            "invalid recipient phone number `{recipient}`"
        )));
    }
    let digits: String = recipient.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(10..=15).contains(&digits.len()) {
        return Err(LeadgateError::InvalidInput(format!(
            "recipient phone number has {} digits, expected 10-15",
            digits.len()
        )));
    }
    Ok(digits)
}

/// Submits outbound messages to the gateway.
pub struct Dispatcher {
    db: Database,
    gateway: Arc<dyn GatewayApi>,
    alerts: AlertBus,
    config: DispatchConfig,
    /// One lock per recipient so concurrent sends to the same conversation
    /// are serialized in arrival order.
    recipient_lanes: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    session_buckets: DashMap<String, Arc<TokenBucket>>,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        gateway: Arc<dyn GatewayApi>,
        alerts: AlertBus,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            alerts,
            config,
            recipient_lanes: DashMap::new(),
            session_buckets: DashMap::new(),
        }
    }

    fn lane(&self, recipient: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.recipient_lanes
            .entry(recipient.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn bucket(&self, session: &str) -> Arc<TokenBucket> {
        self.session_buckets
            .entry(session.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(
                    self.config.rate_capacity,
                    self.config.rate_refill_per_sec,
                ))
            })
            .clone()
    }

    /// Submit a pending message to the gateway.
    ///
    /// Transient failures leave the message `pending` with the attempt
    /// counted, so the scheduler can retry. Permanent failures move it to
    /// `failed`.
    pub async fn dispatch(&self, message: &StoredMessage) -> Result<(), LeadgateError> {
        let digits = normalize_recipient(&message.recipient)?;

        let lane = self.lane(&digits);
        let _guard = lane.lock().await;

        let session = queries::sessions::get_session(&self.db, &message.session)
            .await?
            .ok_or_else(|| LeadgateError::SessionLifecycle {
                session: message.session.clone(),
                message: "unknown session".into(),
            })?;
        let state: SessionState = session
            .state
            .parse()
            .unwrap_or(SessionState::Disconnected);
        if state != SessionState::Working {
            return Err(LeadgateError::SessionNotReady {
                session: message.session.clone(),
                state,
            });
        }

        if self.config.check_new_recipients {
            let exists = self
                .gateway
                .number_exists(&message.session, &digits)
                .await?;
            if !exists {
                queries::messages::mark_failed(&self.db, &message.id).await?;
                return Err(LeadgateError::InvalidInput(format!(
                    "recipient `{digits}` is not registered with the messaging service"
                )));
            }
        }

        self.bucket(&message.session)
            .acquire(Duration::from_secs(self.config.send_deadline_secs))
            .await?;

        let content: MessageContent = serde_json::from_str(&message.content).map_err(|e| {
            LeadgateError::Internal(format!("stored message content is unreadable: {e}"))
        })?;

        match self
            .gateway
            .send_message(&message.session, &digits, &content)
            .await
        {
            Ok(gateway_id) => {
                let marked =
                    queries::messages::mark_dispatched(&self.db, &message.id, &gateway_id.0)
                        .await?;
                if !marked {
                    warn!(
                        message_id = %message.id,
                        "gateway accepted a message that was no longer pending"
                    );
                }
                debug!(message_id = %message.id, gateway_id = %gateway_id.0, "message dispatched");
                Ok(())
            }
            Err(e) if e.is_transient() => {
                queries::messages::count_attempt(&self.db, &message.id).await?;
                Err(e)
            }
            Err(e) => {
                queries::messages::mark_failed(&self.db, &message.id).await?;
                self.alerts.publish(AlertEvent::MessageFailed {
                    message_id: message.id.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Apply a delivery receipt from the gateway.
    ///
    /// Unknown gateway ids and status regressions are logged and ignored;
    /// receipts arrive at least once and unordered.
    pub async fn mark_status(
        &self,
        gateway_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), LeadgateError> {
        let Some(message) =
            queries::messages::find_by_gateway_id(&self.db, gateway_message_id).await?
        else {
            warn!(gateway_id = %gateway_message_id, "receipt for unknown message, ignored");
            return Ok(());
        };

        let current: DeliveryStatus = message.status.parse().map_err(|_| {
            LeadgateError::Internal(format!(
                "message `{}` has unreadable status `{}`",
                message.id, message.status
            ))
        })?;

        if !current.allows_transition_to(status) {
            warn!(
                message_id = %message.id,
                current = %current,
                received = %status,
                "ignoring out-of-order delivery receipt"
            );
            return Ok(());
        }

        let swapped = queries::messages::cas_status(
            &self.db,
            &message.id,
            &current.to_string(),
            &status.to_string(),
        )
        .await?;
        if !swapped {
            debug!(message_id = %message.id, "receipt lost a status race, ignored");
        }
        Ok(())
    }
}
