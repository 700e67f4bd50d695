// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook deduplication ledger.
//!
//! The gateway redelivers webhooks at least once. Each processed event is
//! keyed by `(event, external_id, status)`; an `INSERT OR IGNORE` that
//! touches zero rows means the event was already handled.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;

/// Record an event key. Returns `true` if this is the first time the key
/// was seen, `false` for a redelivery.
pub async fn record_event(
    db: &Database,
    event: &str,
    external_id: &str,
    status: &str,
) -> Result<bool, LeadgateError> {
    let event = event.to_string();
    let external_id = external_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO webhook_events (event, external_id, status)
                 VALUES (?1, ?2, ?3)",
                params![event, external_id, status],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete ledger rows older than the retention window. Returns the number
/// of rows removed.
pub async fn prune_older_than(db: &Database, days: i64) -> Result<usize, LeadgateError> {
    db.connection()
        .call(move |conn| {
            let modifier = format!("-{days} days");
            let removed = conn.execute(
                "DELETE FROM webhook_events
                 WHERE received_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                params![modifier],
            )?;
            Ok(removed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
