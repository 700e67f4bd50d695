// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Leadgate workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier assigned to a message by the upstream gateway on acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GatewayMessageId(pub String);

/// Lifecycle state of a gateway session.
///
/// `created -> starting -> awaiting_scan -> working`, with `disconnected`
/// re-entering `starting` under the bounded reconnect policy and `failed`
/// as the dead end.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Starting,
    AwaitingScan,
    Working,
    Disconnected,
    Failed,
}

impl SessionState {
    /// States the monitor no longer acts on.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed)
    }

    /// States in which an auth challenge (QR payload) may be fetched.
    pub fn accepts_auth_challenge(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::AwaitingScan)
    }
}

/// Delivery status of an outbound message, as reported by gateway receipts.
///
/// `pending < sent < delivered < read` form a strict progression; `failed`
/// is terminal and reachable from any non-terminal status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    /// Position in the forward progression. `None` for `failed`, which sits
    /// outside the ordering.
    pub fn rank(self) -> Option<u8> {
        match self {
            DeliveryStatus::Pending => Some(0),
            DeliveryStatus::Sent => Some(1),
            DeliveryStatus::Delivered => Some(2),
            DeliveryStatus::Read => Some(3),
            DeliveryStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Read | DeliveryStatus::Failed)
    }

    /// Whether a transition from `self` to `next` moves forward.
    ///
    /// `failed` is accepted from any non-terminal status. Everything else
    /// must strictly increase rank.
    pub fn allows_transition_to(self, next: DeliveryStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(_), None) => !self.is_terminal(),
            (Some(from), Some(to)) => to > from,
            (None, _) => false,
        }
    }
}

/// Stage of a contact in the sales funnel.
///
/// `attraction < relationship < conversion < customer`; `unknown` is the
/// entry stage for contacts that have never been classified.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Unknown,
    Attraction,
    Relationship,
    Conversion,
    Customer,
}

impl FunnelStage {
    pub fn rank(self) -> u8 {
        match self {
            FunnelStage::Unknown => 0,
            FunnelStage::Attraction => 1,
            FunnelStage::Relationship => 2,
            FunnelStage::Conversion => 3,
            FunnelStage::Customer => 4,
        }
    }

    /// The next stage up the funnel, or `None` at `customer`.
    pub fn next(self) -> Option<FunnelStage> {
        match self {
            FunnelStage::Unknown => Some(FunnelStage::Attraction),
            FunnelStage::Attraction => Some(FunnelStage::Relationship),
            FunnelStage::Relationship => Some(FunnelStage::Conversion),
            FunnelStage::Conversion => Some(FunnelStage::Customer),
            FunnelStage::Customer => None,
        }
    }
}

/// Lead qualification band derived from the 0-100 engagement score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Qualification {
    Cold,
    Warm,
    Hot,
    SalesReady,
}

impl Qualification {
    /// Band boundaries: 0-20 cold, 21-50 warm, 51-80 hot, 81-100 sales_ready.
    pub fn from_score(score: u8) -> Qualification {
        match score {
            0..=20 => Qualification::Cold,
            21..=50 => Qualification::Warm,
            51..=80 => Qualification::Hot,
            _ => Qualification::SalesReady,
        }
    }
}

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Document {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Buttons {
        body: String,
        buttons: Vec<MessageButton>,
    },
}

/// A single reply button attached to a button message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageButton {
    pub id: String,
    pub text: String,
}

/// An outbound message tracked through the delivery pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Locally assigned message id (UUID v4).
    pub id: String,
    /// Name of the session the message is sent through.
    pub session: String,
    /// Recipient number in international digits (e.g. 5511999998888).
    pub recipient: String,
    pub content: MessageContent,
    pub status: DeliveryStatus,
    /// Gateway-assigned id, present once the send was acknowledged.
    pub gateway_message_id: Option<String>,
    pub attempts: u32,
    /// Correlation id threaded through logs and alerts.
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Build a fresh pending message with generated id and correlation id.
    pub fn new(session: &str, recipient: &str, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session: session.to_string(),
            recipient: recipient.to_string(),
            content,
            status: DeliveryStatus::Pending,
            gateway_message_id: None,
            attempts: 0,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// A message received from a contact via webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Locally assigned id (UUID v4).
    pub id: String,
    /// Id assigned by the upstream gateway.
    pub external_id: String,
    pub session: String,
    /// Sender number in international digits.
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Verdict attached to an inbound message after classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The contact remains at its current stage.
    Stay,
    /// The contact advances one stage up the funnel.
    Advance,
    /// The classifier could not decide; a human should review.
    FlagForHuman,
}

/// A contact tracked through the sales funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelContact {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
    pub stage: FunnelStage,
    /// Engagement score, 0-100.
    pub score: u8,
    pub qualification: Qualification,
    /// Operator-set stage floor. Automatic classification never moves the
    /// contact below this stage.
    pub manual_floor: Option<FunnelStage>,
    pub interaction_count: u32,
    pub last_transition_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn session_state_round_trips_through_strings() {
        for state in [
            SessionState::Created,
            SessionState::Starting,
            SessionState::AwaitingScan,
            SessionState::Working,
            SessionState::Disconnected,
            SessionState::Failed,
        ] {
            let s = state.to_string();
            let parsed = SessionState::from_str(&s).expect("should parse back");
            assert_eq!(state, parsed);
        }
        assert_eq!(SessionState::AwaitingScan.to_string(), "awaiting_scan");
    }

    #[test]
    fn delivery_status_progression() {
        assert!(DeliveryStatus::Pending.allows_transition_to(DeliveryStatus::Sent));
        assert!(DeliveryStatus::Sent.allows_transition_to(DeliveryStatus::Delivered));
        assert!(DeliveryStatus::Sent.allows_transition_to(DeliveryStatus::Read));
        // Regressions are rejected.
        assert!(!DeliveryStatus::Delivered.allows_transition_to(DeliveryStatus::Sent));
        assert!(!DeliveryStatus::Read.allows_transition_to(DeliveryStatus::Delivered));
        // Failed is reachable from any non-terminal status, and nothing leaves it.
        assert!(DeliveryStatus::Pending.allows_transition_to(DeliveryStatus::Failed));
        assert!(DeliveryStatus::Delivered.allows_transition_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Read.allows_transition_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Failed.allows_transition_to(DeliveryStatus::Sent));
    }

    #[test]
    fn funnel_stage_advances_one_step() {
        assert_eq!(FunnelStage::Unknown.next(), Some(FunnelStage::Attraction));
        assert_eq!(
            FunnelStage::Attraction.next(),
            Some(FunnelStage::Relationship)
        );
        assert_eq!(FunnelStage::Customer.next(), None);
    }

    #[test]
    fn qualification_bands() {
        assert_eq!(Qualification::from_score(0), Qualification::Cold);
        assert_eq!(Qualification::from_score(20), Qualification::Cold);
        assert_eq!(Qualification::from_score(21), Qualification::Warm);
        assert_eq!(Qualification::from_score(50), Qualification::Warm);
        assert_eq!(Qualification::from_score(51), Qualification::Hot);
        assert_eq!(Qualification::from_score(80), Qualification::Hot);
        assert_eq!(Qualification::from_score(81), Qualification::SalesReady);
        assert_eq!(Qualification::from_score(100), Qualification::SalesReady);
    }

    #[test]
    fn message_content_serializes_tagged() {
        let content = MessageContent::Text {
            body: "hello".into(),
        };
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains(r#""type":"text""#), "got: {json}");

        let buttons = MessageContent::Buttons {
            body: "pick one".into(),
            buttons: vec![MessageButton {
                id: "yes".into(),
                text: "Yes".into(),
            }],
        };
        let json = serde_json::to_string(&buttons).unwrap();
        let parsed: MessageContent = serde_json::from_str(&json).unwrap();
        assert_eq!(buttons, parsed);
    }

    #[test]
    fn new_outbound_message_is_pending_with_unique_ids() {
        let a = OutboundMessage::new("main", "5511999998888", MessageContent::Text {
            body: "hi".into(),
        });
        let b = OutboundMessage::new("main", "5511999998888", MessageContent::Text {
            body: "hi".into(),
        });
        assert_eq!(a.status, DeliveryStatus::Pending);
        assert_eq!(a.attempts, 0);
        assert_ne!(a.id, b.id);
        assert_ne!(a.correlation_id, b.correlation_id);
    }
}
