// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Funnel contact persistence.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::ContactRecord;

fn row_to_contact(row: &rusqlite::Row<'_>) -> Result<ContactRecord, rusqlite::Error> {
    Ok(ContactRecord {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        stage: row.get(3)?,
        score: row.get(4)?,
        qualification: row.get(5)?,
        manual_floor: row.get(6)?,
        interaction_count: row.get(7)?,
        last_transition_at: row.get(8)?,
        last_analyzed_message: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const CONTACT_COLUMNS: &str = "id, phone, name, stage, score, qualification, manual_floor,
        interaction_count, last_transition_at, last_analyzed_message, created_at, updated_at";

/// Get a contact by id.
pub async fn get_contact(db: &Database, id: &str) -> Result<Option<ContactRecord>, LeadgateError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_contact) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a contact by phone number.
pub async fn get_by_phone(
    db: &Database,
    phone: &str,
) -> Result<Option<ContactRecord>, LeadgateError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone = ?1"
            ))?;
            match stmt.query_row(params![phone], row_to_contact) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the contact for a phone, creating it at the `unknown` stage if absent.
/// Counts one interaction either way.
pub async fn observe_contact(
    db: &Database,
    phone: &str,
    name: Option<&str>,
) -> Result<ContactRecord, LeadgateError> {
    let phone = phone.to_string();
    let name = name.map(|n| n.to_string());
    let new_id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (id, phone, name, interaction_count)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(phone) DO UPDATE SET
                   interaction_count = interaction_count + 1,
                   name = COALESCE(contacts.name, excluded.name),
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![new_id, phone, name],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone = ?1"
            ))?;
            let contact = stmt.query_row(params![phone], row_to_contact)?;
            Ok(contact)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a classification result: stage, score, qualification band, and the
/// id of the inbound message that was analyzed. Records a transition
/// timestamp when the stage changed.
pub async fn apply_classification(
    db: &Database,
    id: &str,
    stage: &str,
    score: i64,
    qualification: &str,
    analyzed_message_id: &str,
    stage_changed: bool,
) -> Result<(), LeadgateError> {
    let id = id.to_string();
    let stage = stage.to_string();
    let qualification = qualification.to_string();
    let analyzed_message_id = analyzed_message_id.to_string();
    db.connection()
        .call(move |conn| {
            if stage_changed {
                conn.execute(
                    "UPDATE contacts SET stage = ?1, score = ?2, qualification = ?3,
                     last_analyzed_message = ?4,
                     last_transition_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?5",
                    params![stage, score, qualification, analyzed_message_id, id],
                )?;
            } else {
                conn.execute(
                    "UPDATE contacts SET stage = ?1, score = ?2, qualification = ?3,
                     last_analyzed_message = ?4,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?5",
                    params![stage, score, qualification, analyzed_message_id, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Operator override: set the stage directly and record it as the manual
/// floor that automatic classification may not cross.
pub async fn set_manual_stage(db: &Database, id: &str, stage: &str) -> Result<bool, LeadgateError> {
    let id = id.to_string();
    let stage = stage.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE contacts SET stage = ?1, manual_floor = ?1,
                 last_transition_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![stage, id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List contacts, optionally filtered by stage, most recently updated first.
pub async fn list_contacts(
    db: &Database,
    stage: Option<&str>,
) -> Result<Vec<ContactRecord>, LeadgateError> {
    let stage = stage.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut contacts = Vec::new();
            match &stage {
                Some(filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONTACT_COLUMNS} FROM contacts
                         WHERE stage = ?1 ORDER BY updated_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![filter], row_to_contact)?;
                    for row in rows {
                        contacts.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY updated_at DESC"
                    ))?;
                    let rows = stmt.query_map([], row_to_contact)?;
                    for row in rows {
                        contacts.push(row?);
                    }
                }
            }
            Ok(contacts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
