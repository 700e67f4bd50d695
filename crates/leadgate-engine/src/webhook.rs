// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event processing.
//!
//! The gateway delivers events at least once and in no particular order.
//! Each event carries an idempotency key `(event, external id, status)`
//! recorded in the dedup ledger before any side effect; redeliveries are
//! dropped there. Processing never propagates an error upward: the HTTP
//! layer has already acknowledged the delivery, so every failure here is
//! logged and abandoned rather than crashing the intake path.

use std::sync::Arc;

use chrono::{SecondsFormat, TimeZone, Utc};
use leadgate_core::DeliveryStatus;
use leadgate_storage::{Database, queries};
use leadgate_waha::map_upstream_state;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classifier::FunnelPipeline;
use crate::dispatcher::Dispatcher;
use crate::session::SessionManager;

/// Raw webhook delivery from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    from: String,
    #[serde(default)]
    body: String,
    #[serde(default, rename = "notifyName")]
    notify_name: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default, rename = "fromMe")]
    from_me: bool,
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    id: serde_json::Value,
    ack: i64,
}

#[derive(Debug, Deserialize)]
struct StatePayload {
    #[serde(default)]
    name: Option<String>,
    status: String,
}

/// Applies webhook events to storage and the funnel pipeline.
pub struct WebhookProcessor {
    db: Database,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
    pipeline: Arc<FunnelPipeline>,
}

impl WebhookProcessor {
    pub fn new(
        db: Database,
        dispatcher: Arc<Dispatcher>,
        sessions: Arc<SessionManager>,
        pipeline: Arc<FunnelPipeline>,
    ) -> Self {
        Self {
            db,
            dispatcher,
            sessions,
            pipeline,
        }
    }

    /// Handle one webhook delivery. Infallible by contract.
    pub async fn process(&self, envelope: WebhookEnvelope) {
        match envelope.event.as_str() {
            "message" => self.handle_message(&envelope).await,
            "message.ack" => self.handle_ack(&envelope).await,
            "state.change" | "session.status" => self.handle_state_change(&envelope).await,
            other => {
                debug!(event = other, "unhandled webhook event, acknowledged and dropped");
            }
        }
    }

    async fn handle_message(&self, envelope: &WebhookEnvelope) {
        let payload: MessagePayload = match serde_json::from_value(envelope.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "malformed message payload, dropped");
                return;
            }
        };
        if payload.from_me {
            return;
        }

        match queries::webhook_events::record_event(&self.db, "message", &payload.id, "-").await {
            Ok(true) => {}
            Ok(false) => {
                debug!(external_id = %payload.id, "duplicate message event dropped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "dedup ledger unavailable, dropping event");
                return;
            }
        }

        let sender = payload
            .from
            .strip_suffix("@c.us")
            .unwrap_or(&payload.from)
            .to_string();
        let received_at = payload
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        if let Err(e) = self
            .pipeline
            .handle_inbound(
                &envelope.session,
                &sender,
                payload.notify_name.as_deref(),
                &payload.id,
                &payload.body,
                &received_at,
            )
            .await
        {
            warn!(external_id = %payload.id, error = %e, "inbound processing failed");
        }
    }

    async fn handle_ack(&self, envelope: &WebhookEnvelope) {
        let payload: AckPayload = match serde_json::from_value(envelope.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "malformed ack payload, dropped");
                return;
            }
        };
        let Some(gateway_id) = extract_message_id(&payload.id) else {
            warn!("ack payload without a message id, dropped");
            return;
        };
        let status = match payload.ack {
            a if a < 0 => DeliveryStatus::Failed,
            0 | 1 => DeliveryStatus::Sent,
            2 => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Read,
        };

        match queries::webhook_events::record_event(
            &self.db,
            "message.ack",
            &gateway_id,
            &status.to_string(),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(gateway_id = %gateway_id, status = %status, "duplicate ack dropped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "dedup ledger unavailable, dropping ack");
                return;
            }
        }

        if let Err(e) = self.dispatcher.mark_status(&gateway_id, status).await {
            warn!(gateway_id = %gateway_id, error = %e, "receipt processing failed");
        }
    }

    async fn handle_state_change(&self, envelope: &WebhookEnvelope) {
        let payload: StatePayload = match serde_json::from_value(envelope.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "malformed state payload, dropped");
                return;
            }
        };
        let session = payload
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&envelope.session);
        if session.is_empty() {
            warn!("state change without a session name, dropped");
            return;
        }
        let state = map_upstream_state(&payload.status);
        if let Err(e) = self.sessions.record_upstream_state(session, state).await {
            warn!(session = %session, error = %e, "state change processing failed");
        }
    }
}

/// The ack id arrives either as a plain string or as an object with a
/// `_serialized` field, depending on the gateway engine.
fn extract_message_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("_serialized")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}
