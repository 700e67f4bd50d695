// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD and lifecycle bookkeeping.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::SessionRecord;

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRecord, rusqlite::Error> {
    Ok(SessionRecord {
        name: row.get(0)?,
        phone: row.get(1)?,
        state: row.get(2)?,
        reconnect_attempts: row.get(3)?,
        logged_out: row.get::<_, i64>(4)? != 0,
        last_error: row.get(5)?,
        qr_fetched_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const SESSION_COLUMNS: &str = "name, phone, state, reconnect_attempts, logged_out,
        last_error, qr_fetched_at, created_at, updated_at";

/// Create a new session row in `created` state.
pub async fn create_session(db: &Database, name: &str, phone: &str) -> Result<(), LeadgateError> {
    let name = name.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (name, phone) VALUES (?1, ?2)",
                params![name, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by name.
pub async fn get_session(db: &Database, name: &str) -> Result<Option<SessionRecord>, LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE name = ?1"
            ))?;
            let result = stmt.query_row(params![name], row_to_session);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List sessions, optionally filtered by state.
pub async fn list_sessions(
    db: &Database,
    state: Option<&str>,
) -> Result<Vec<SessionRecord>, LeadgateError> {
    let state = state.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            match &state {
                Some(filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions
                         WHERE state = ?1 ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![filter], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt.query_map([], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Find a session in `working` state that owns the given phone identity.
pub async fn working_session_for_phone(
    db: &Database,
    phone: &str,
) -> Result<Option<SessionRecord>, LeadgateError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE phone = ?1 AND state = 'working' LIMIT 1"
            ))?;
            let result = stmt.query_row(params![phone], row_to_session);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a session's state and updated_at timestamp.
pub async fn update_state(db: &Database, name: &str, state: &str) -> Result<(), LeadgateError> {
    let name = name.to_string();
    let state = state.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET state = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE name = ?2",
                params![state, name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the reconnect attempt counter.
pub async fn set_reconnect_attempts(
    db: &Database,
    name: &str,
    attempts: i64,
) -> Result<(), LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET reconnect_attempts = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE name = ?2",
                params![attempts, name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the most recent error observed for a session.
pub async fn set_last_error(
    db: &Database,
    name: &str,
    error: Option<&str>,
) -> Result<(), LeadgateError> {
    let name = name.to_string();
    let error = error.map(|e| e.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_error = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE name = ?2",
                params![error, name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a session as logged out. Logged-out sessions are never reconnected.
pub async fn mark_logged_out(db: &Database, name: &str) -> Result<(), LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET logged_out = 1, state = 'disconnected',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE name = ?1",
                params![name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the time a QR payload was fetched for a session.
pub async fn touch_qr_fetched(db: &Database, name: &str) -> Result<(), LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET qr_fetched_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE name = ?1",
                params![name],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
