// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable scheduled-send queue with crash-safe claim/ack/fail.
//!
//! Entries are claimed in `(due_at, id)` order and only removed from the
//! claimable set after the dispatcher acknowledges the send. A claim that is
//! never acknowledged (crash between claim and ack) becomes claimable again
//! once its lock expires.
//!
//! Within one recipient the queue is a FIFO lane: an entry is claimable only
//! when no earlier entry for the same recipient is still pending or
//! processing. Retry backoff is held in `locked_until` rather than `due_at`,
//! so a retrying entry keeps its place at the head of its lane and later
//! messages to that recipient wait behind it.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::ScheduleEntry;

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<ScheduleEntry, rusqlite::Error> {
    Ok(ScheduleEntry {
        id: row.get(0)?,
        message_id: row.get(1)?,
        due_at: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        locked_until: row.get(6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const ENTRY_COLUMNS: &str = "id, message_id, due_at, status, attempts, max_attempts,
        locked_until, last_error, created_at, updated_at";

/// Enqueue a message for delivery at `due_at` (RFC 3339 text, or `now` for
/// immediate dispatch). Returns the queue entry id.
pub async fn enqueue(
    db: &Database,
    message_id: &str,
    due_at: Option<&str>,
    max_attempts: i64,
) -> Result<i64, LeadgateError> {
    let message_id = message_id.to_string();
    let due_at = due_at.map(|d| d.to_string());
    db.connection()
        .call(move |conn| {
            match due_at {
                Some(due) => conn.execute(
                    "INSERT INTO schedule (message_id, due_at, max_attempts)
                     VALUES (?1, ?2, ?3)",
                    params![message_id, due, max_attempts],
                )?,
                None => conn.execute(
                    "INSERT INTO schedule (message_id, due_at, max_attempts)
                     VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?2)",
                    params![message_id, max_attempts],
                )?,
            };
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim the next due entry, if any.
///
/// Atomically: expired `processing` locks are reset to `pending`, then the
/// oldest due pending entry (ordered by `due_at`, then insertion id) whose
/// recipient lane is free is marked `processing` with a 5-minute lock. An
/// entry whose recipient has an earlier pending or processing entry is
/// skipped until that lane head completes or fails terminally.
pub async fn claim_due(db: &Database) -> Result<Option<ScheduleEntry>, LeadgateError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Reclaim entries whose worker died between claim and ack.
            tx.execute(
                "UPDATE schedule SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'
                   AND locked_until < strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                [],
            )?;

            let result = {
                let mut stmt = tx.prepare(
                    "SELECT s.id, s.message_id, s.due_at, s.status, s.attempts,
                            s.max_attempts, s.locked_until, s.last_error,
                            s.created_at, s.updated_at
                     FROM schedule s
                     JOIN messages m ON m.id = s.message_id
                     WHERE s.status = 'pending'
                       AND s.due_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                       AND (s.locked_until IS NULL
                            OR s.locked_until <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                       AND NOT EXISTS (
                           SELECT 1 FROM schedule s2
                           JOIN messages m2 ON m2.id = s2.message_id
                           WHERE m2.recipient = m.recipient
                             AND s2.status IN ('pending', 'processing')
                             AND (s2.due_at < s.due_at
                                  OR (s2.due_at = s.due_at AND s2.id < s.id))
                       )
                     ORDER BY s.due_at ASC, s.id ASC
                     LIMIT 1",
                )?;
                stmt.query_row([], row_to_entry)
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE schedule SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;
                    Ok(Some(ScheduleEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Acknowledge successful dispatch of a claimed entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), LeadgateError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE schedule SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a transient dispatch failure.
///
/// Increments attempts. At `max_attempts` the entry becomes terminally
/// `failed`; otherwise it returns to `pending` held off for
/// `base_backoff_secs * 2^attempts` (exponential backoff). The hold-off
/// lives in `locked_until`, keeping `due_at` untouched so the entry stays at
/// the head of its recipient lane while it waits.
///
/// Returns `true` if the entry will be retried, `false` if it is now failed.
pub async fn fail(
    db: &Database,
    id: i64,
    base_backoff_secs: u64,
    error: &str,
) -> Result<bool, LeadgateError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts): (i64, i64) = conn.query_row(
                "SELECT attempts, max_attempts FROM schedule WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE schedule SET status = 'failed', attempts = ?1,
                     locked_until = NULL, last_error = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, error, id],
                )?;
                Ok(false)
            } else {
                let backoff_secs = base_backoff_secs.saturating_mul(1u64 << attempts.min(16));
                let modifier = format!("+{backoff_secs} seconds");
                conn.execute(
                    "UPDATE schedule SET status = 'pending', attempts = ?1,
                     last_error = ?2,
                     locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?3),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?4",
                    params![new_attempts, error, modifier, id],
                )?;
                Ok(true)
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Terminally fail an entry regardless of remaining attempts.
///
/// Used when the dispatcher hits a permanent error that retrying cannot fix.
pub async fn fail_permanent(db: &Database, id: i64, error: &str) -> Result<(), LeadgateError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE schedule SET status = 'failed', locked_until = NULL,
                 last_error = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List entries, optionally filtered by status, newest due first.
pub async fn list_entries(
    db: &Database,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<ScheduleEntry>, LeadgateError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut entries = Vec::new();
            match &status {
                Some(filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ENTRY_COLUMNS} FROM schedule
                         WHERE status = ?1 ORDER BY due_at DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![filter, limit], row_to_entry)?;
                    for row in rows {
                        entries.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ENTRY_COLUMNS} FROM schedule
                         ORDER BY due_at DESC LIMIT ?1"
                    ))?;
                    let rows = stmt.query_map(params![limit], row_to_entry)?;
                    for row in rows {
                        entries.push(row?);
                    }
                }
            }
            Ok(entries)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::messages;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    async fn seed_message(db: &Database, id: &str) {
        messages::insert_message(
            db,
            id,
            "main",
            "5511999998888",
            r#"{"type":"text","body":"hi"}"#,
            "corr",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn enqueue_and_claim_lifecycle() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;

        let id = enqueue(&db, "m1", None, 3).await.unwrap();
        assert!(id > 0);

        let entry = claim_due(&db).await.unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.message_id, "m1");
        assert_eq!(entry.status, "processing");

        // Nothing else is claimable while the lock is held.
        assert!(claim_due(&db).await.unwrap().is_none());

        ack(&db, id).await.unwrap();
        assert!(claim_due(&db).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn future_entries_are_not_claimed() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;

        enqueue(&db, "m1", Some("2099-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();
        assert!(claim_due(&db).await.unwrap().is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_order_is_due_time_then_insertion() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;
        seed_message(&db, "m2").await;
        seed_message(&db, "m3").await;

        // m2 and m3 share a past due time; m1 is due later but still past.
        enqueue(&db, "m1", Some("2020-01-02T00:00:00.000Z"), 3)
            .await
            .unwrap();
        enqueue(&db, "m2", Some("2020-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();
        enqueue(&db, "m3", Some("2020-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();

        // All three target the same recipient, so each claim frees the lane
        // for the next only once it is acknowledged.
        let first = claim_due(&db).await.unwrap().unwrap();
        ack(&db, first.id).await.unwrap();
        let second = claim_due(&db).await.unwrap().unwrap();
        ack(&db, second.id).await.unwrap();
        let third = claim_due(&db).await.unwrap().unwrap();
        assert_eq!(first.message_id, "m2");
        assert_eq!(second.message_id, "m3");
        assert_eq!(third.message_id, "m1");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn lane_head_blocks_later_entries_for_same_recipient() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;
        seed_message(&db, "m2").await;

        let first = enqueue(&db, "m1", Some("2020-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();
        enqueue(&db, "m2", Some("2020-01-01T00:00:01.000Z"), 3)
            .await
            .unwrap();

        // While m1 is processing, m2 (same recipient) must not be claimable.
        let claimed = claim_due(&db).await.unwrap().unwrap();
        assert_eq!(claimed.message_id, "m1");
        assert!(claim_due(&db).await.unwrap().is_none());

        // A retrying m1 still holds the lane head during its backoff.
        let will_retry = fail(&db, first, 60, "gateway 503").await.unwrap();
        assert!(will_retry);
        assert!(claim_due(&db).await.unwrap().is_none());

        // Once m1 fails terminally the lane opens for m2.
        fail(&db, first, 60, "gateway 503").await.unwrap();
        fail(&db, first, 60, "gateway 503").await.unwrap();
        let next = claim_due(&db).await.unwrap().unwrap();
        assert_eq!(next.message_id, "m2");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_backs_off_then_fails_terminally() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;

        let id = enqueue(&db, "m1", Some("2020-01-01T00:00:00.000Z"), 2)
            .await
            .unwrap();
        let _claimed = claim_due(&db).await.unwrap().unwrap();

        // First failure: retried with backoff (pushed into the future).
        let will_retry = fail(&db, id, 60, "gateway 503").await.unwrap();
        assert!(will_retry);
        assert!(
            claim_due(&db).await.unwrap().is_none(),
            "backoff should defer the retry"
        );

        let entries = list_entries(&db, Some("pending"), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 1);
        assert_eq!(entries[0].last_error.as_deref(), Some("gateway 503"));

        // Second failure reaches max_attempts.
        let will_retry = fail(&db, id, 60, "gateway 503 again").await.unwrap();
        assert!(!will_retry);
        let entries = list_entries(&db, Some("failed"), 10).await.unwrap();
        assert_eq!(entries.len(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_reclaimed() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;

        let id = enqueue(&db, "m1", Some("2020-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();
        let _claimed = claim_due(&db).await.unwrap().unwrap();

        // Simulate a worker crash: force the lock into the past.
        db.connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE schedule SET locked_until = '2020-01-01T00:00:00.000Z' WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let reclaimed = claim_due(&db).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_permanent_never_retries() {
        let (db, _dir) = setup_db().await;
        seed_message(&db, "m1").await;

        let id = enqueue(&db, "m1", Some("2020-01-01T00:00:00.000Z"), 3)
            .await
            .unwrap();
        let _claimed = claim_due(&db).await.unwrap().unwrap();

        fail_permanent(&db, id, "recipient rejected").await.unwrap();
        assert!(claim_due(&db).await.unwrap().is_none());
        let entries = list_entries(&db, Some("failed"), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].last_error.as_deref(),
            Some("recipient rejected")
        );

        db.close().await.unwrap();
    }
}
