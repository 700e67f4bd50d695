// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message template storage.

use leadgate_core::LeadgateError;
use rusqlite::params;

use crate::database::Database;
use crate::models::TemplateRecord;

fn row_to_template(row: &rusqlite::Row<'_>) -> Result<TemplateRecord, rusqlite::Error> {
    Ok(TemplateRecord {
        name: row.get(0)?,
        stage: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

const TEMPLATE_COLUMNS: &str = "name, stage, body, created_at, updated_at";

/// Insert or replace a template by name.
pub async fn upsert_template(
    db: &Database,
    name: &str,
    stage: Option<&str>,
    body: &str,
) -> Result<(), LeadgateError> {
    let name = name.to_string();
    let stage = stage.map(|s| s.to_string());
    let body = body.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO templates (name, stage, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                   stage = excluded.stage,
                   body = excluded.body,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![name, stage, body],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a template by name.
pub async fn get_template(
    db: &Database,
    name: &str,
) -> Result<Option<TemplateRecord>, LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE name = ?1"
            ))?;
            match stmt.query_row(params![name], row_to_template) {
                Ok(template) => Ok(Some(template)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The first template registered for a funnel stage, if any.
pub async fn template_for_stage(
    db: &Database,
    stage: &str,
) -> Result<Option<TemplateRecord>, LeadgateError> {
    let stage = stage.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM templates
                 WHERE stage = ?1 ORDER BY name ASC LIMIT 1"
            ))?;
            match stmt.query_row(params![stage], row_to_template) {
                Ok(template) => Ok(Some(template)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List all templates ordered by name.
pub async fn list_templates(db: &Database) -> Result<Vec<TemplateRecord>, LeadgateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY name ASC"
            ))?;
            let rows = stmt.query_map([], row_to_template)?;
            let mut templates = Vec::new();
            for row in rows {
                templates.push(row?);
            }
            Ok(templates)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a template. Returns `false` if no such template existed.
pub async fn delete_template(db: &Database, name: &str) -> Result<bool, LeadgateError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute("DELETE FROM templates WHERE name = ?1", params![name])?;
            Ok(removed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
