// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message persistence with compare-and-swap status transitions.
//!
//! Every status change is a guarded UPDATE (`WHERE id = ? AND status = ?`),
//! so concurrent receipt processing can never regress a message or double
//! apply a transition: the loser of the race simply updates zero rows.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::StoredMessage;

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    Ok(StoredMessage {
        id: row.get(0)?,
        session: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        status: row.get(4)?,
        gateway_message_id: row.get(5)?,
        attempts: row.get(6)?,
        correlation_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, session, recipient, content, status,
        gateway_message_id, attempts, correlation_id, created_at, updated_at";

/// Insert a new pending message.
pub async fn insert_message(
    db: &Database,
    id: &str,
    session: &str,
    recipient: &str,
    content_json: &str,
    correlation_id: &str,
) -> Result<(), LeadgateError> {
    let id = id.to_string();
    let session = session.to_string();
    let recipient = recipient.to_string();
    let content_json = content_json.to_string();
    let correlation_id = correlation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session, recipient, content, correlation_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, session, recipient, content_json, correlation_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a message by local id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<StoredMessage>, LeadgateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_message) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a message by the id the gateway assigned at submission.
pub async fn find_by_gateway_id(
    db: &Database,
    gateway_message_id: &str,
) -> Result<Option<StoredMessage>, LeadgateError> {
    let gateway_message_id = gateway_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE gateway_message_id = ?1"
            ))?;
            match stmt.query_row(params![gateway_message_id], row_to_message) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Compare-and-swap the status of a message.
///
/// Returns `true` if the row transitioned, `false` if the current status no
/// longer matched `from` (lost race or out-of-order receipt).
pub async fn cas_status(
    db: &Database,
    id: &str,
    from: &str,
    to: &str,
) -> Result<bool, LeadgateError> {
    let id = id.to_string();
    let from = from.to_string();
    let to = to.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND status = ?3",
                params![to, id, from],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a successful gateway submission: `pending -> sent` plus the
/// gateway-assigned id, counting the attempt.
///
/// Guarded on `pending` so a message is never submitted-marked twice.
pub async fn mark_dispatched(
    db: &Database,
    id: &str,
    gateway_message_id: &str,
) -> Result<bool, LeadgateError> {
    let id = id.to_string();
    let gateway_message_id = gateway_message_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = 'sent', gateway_message_id = ?1,
                 attempts = attempts + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND status = 'pending'",
                params![gateway_message_id, id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count a failed submission attempt while the message stays pending.
pub async fn count_attempt(db: &Database, id: &str) -> Result<(), LeadgateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET attempts = attempts + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move a message to `failed` from any non-terminal status.
///
/// Returns `false` if the message was already `read` or `failed`.
pub async fn mark_failed(db: &Database, id: &str) -> Result<bool, LeadgateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET status = 'failed',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status NOT IN ('read', 'failed')",
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn insert_test_message(db: &Database, id: &str) {
        insert_message(
            db,
            id,
            "main",
            "5511999998888",
            r#"{"type":"text","body":"hello"}"#,
            "corr-1",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn insert_and_get_message() {
        let (db, _dir) = setup_db().await;
        insert_test_message(&db, "m1").await;

        let msg = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(msg.status, "pending");
        assert_eq!(msg.attempts, 0);
        assert!(msg.gateway_message_id.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_dispatched_transitions_once() {
        let (db, _dir) = setup_db().await;
        insert_test_message(&db, "m1").await;

        assert!(mark_dispatched(&db, "m1", "gw-abc").await.unwrap());
        // A second submission-mark must lose the guard.
        assert!(!mark_dispatched(&db, "m1", "gw-other").await.unwrap());

        let msg = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(msg.status, "sent");
        assert_eq!(msg.gateway_message_id.as_deref(), Some("gw-abc"));
        assert_eq!(msg.attempts, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cas_status_rejects_stale_from() {
        let (db, _dir) = setup_db().await;
        insert_test_message(&db, "m1").await;
        mark_dispatched(&db, "m1", "gw-1").await.unwrap();

        assert!(cas_status(&db, "m1", "sent", "delivered").await.unwrap());
        // Out-of-order receipt: sent -> delivered already happened.
        assert!(!cas_status(&db, "m1", "sent", "delivered").await.unwrap());

        let msg = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(msg.status, "delivered");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn find_by_gateway_id_after_dispatch() {
        let (db, _dir) = setup_db().await;
        insert_test_message(&db, "m1").await;
        mark_dispatched(&db, "m1", "gw-xyz").await.unwrap();

        let found = find_by_gateway_id(&db, "gw-xyz").await.unwrap().unwrap();
        assert_eq!(found.id, "m1");
        assert!(find_by_gateway_id(&db, "gw-missing").await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_failed_respects_terminal_statuses() {
        let (db, _dir) = setup_db().await;
        insert_test_message(&db, "m1").await;
        mark_dispatched(&db, "m1", "gw-1").await.unwrap();
        cas_status(&db, "m1", "sent", "read").await.unwrap();

        // Read is terminal; failed must not overwrite it.
        assert!(!mark_failed(&db, "m1").await.unwrap());

        insert_test_message(&db, "m2").await;
        assert!(mark_failed(&db, "m2").await.unwrap());
        let msg = get_message(&db, "m2").await.unwrap().unwrap();
        assert_eq!(msg.status, "failed");

        db.close().await.unwrap();
    }
}
