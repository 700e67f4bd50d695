// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities.
//!
//! Rows carry states and timestamps as the TEXT values SQLite stores;
//! conversion to the strongly typed enums in `leadgate-core` happens at the
//! engine boundary.

use serde::{Deserialize, Serialize};

/// A gateway session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub phone: String,
    pub state: String,
    pub reconnect_attempts: i64,
    pub logged_out: bool,
    pub last_error: Option<String>,
    pub qr_fetched_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// An outbound message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub session: String,
    pub recipient: String,
    /// JSON-encoded `MessageContent`.
    pub content: String,
    pub status: String,
    pub gateway_message_id: Option<String>,
    pub attempts: i64,
    pub correlation_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A scheduled-send queue row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub message_id: String,
    pub due_at: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub locked_until: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A funnel contact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub phone: String,
    pub name: Option<String>,
    pub stage: String,
    pub score: i64,
    pub qualification: String,
    pub manual_floor: Option<String>,
    pub interaction_count: i64,
    pub last_transition_at: Option<String>,
    pub last_analyzed_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// An inbound message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundRecord {
    pub id: String,
    pub external_id: String,
    pub session: String,
    pub sender: String,
    pub body: String,
    pub contact_id: Option<String>,
    pub verdict: Option<String>,
    pub verdict_score: Option<i64>,
    pub received_at: String,
    pub created_at: String,
}

/// A message template row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub name: String,
    /// Funnel stage this template is triggered for, if any.
    pub stage: Option<String>,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}
