// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for leadgate.
//!
//! A single [`Database`] handle wraps a `tokio-rusqlite` connection with WAL
//! journaling and embedded refinery migrations. Query modules under
//! [`queries`] expose typed async functions per storage concern: sessions,
//! outbound messages, the scheduled-send queue, funnel contacts, inbound
//! messages, the webhook dedup ledger, and templates.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use models::{
    ContactRecord, InboundRecord, ScheduleEntry, SessionRecord, StoredMessage, TemplateRecord,
};
