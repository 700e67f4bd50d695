// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message persistence and classification verdicts.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::InboundRecord;

fn row_to_inbound(row: &rusqlite::Row<'_>) -> Result<InboundRecord, rusqlite::Error> {
    Ok(InboundRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        session: row.get(2)?,
        sender: row.get(3)?,
        body: row.get(4)?,
        contact_id: row.get(5)?,
        verdict: row.get(6)?,
        verdict_score: row.get(7)?,
        received_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const INBOUND_COLUMNS: &str = "id, external_id, session, sender, body, contact_id,
        verdict, verdict_score, received_at, created_at";

/// Persist an inbound message linked to its contact.
pub async fn insert_inbound(
    db: &Database,
    id: &str,
    external_id: &str,
    session: &str,
    sender: &str,
    body: &str,
    contact_id: &str,
    received_at: &str,
) -> Result<(), LeadgateError> {
    let id = id.to_string();
    let external_id = external_id.to_string();
    let session = session.to_string();
    let sender = sender.to_string();
    let body = body.to_string();
    let contact_id = contact_id.to_string();
    let received_at = received_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO inbound_messages
                 (id, external_id, session, sender, body, contact_id, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, external_id, session, sender, body, contact_id, received_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get an inbound message by id.
pub async fn get_inbound(db: &Database, id: &str) -> Result<Option<InboundRecord>, LeadgateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INBOUND_COLUMNS} FROM inbound_messages WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_inbound) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the classification verdict for an inbound message.
pub async fn set_verdict(
    db: &Database,
    id: &str,
    verdict: &str,
    score: Option<i64>,
) -> Result<(), LeadgateError> {
    let id = id.to_string();
    let verdict = verdict.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE inbound_messages SET verdict = ?1, verdict_score = ?2 WHERE id = ?3",
                params![verdict, score, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent message bodies for a contact, oldest first, capped at `limit`.
/// Used as conversation history for classification.
pub async fn recent_bodies_for_contact(
    db: &Database,
    contact_id: &str,
    limit: i64,
) -> Result<Vec<String>, LeadgateError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM inbound_messages
                 WHERE contact_id = ?1
                 ORDER BY received_at DESC, created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![contact_id, limit], |row| row.get::<_, String>(0))?;
            let mut bodies = Vec::new();
            for row in rows {
                bodies.push(row?);
            }
            bodies.reverse();
            Ok(bodies)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
