// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle with WAL-mode pragmas and a single-writer concurrency
//! model via `tokio-rusqlite`.

use std::path::Path;

use leadgate_core::LeadgateError;
use tracing::debug;

/// Async handle to the Leadgate SQLite database.
///
/// All access goes through one background connection, serializing writes
/// and avoiding SQLITE_BUSY under concurrent tasks.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path`, apply WAL pragmas,
    /// and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, LeadgateError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| LeadgateError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| LeadgateError::Storage {
                source: Box::new(e),
            })?;

        conn.call(|conn| -> Result<_, rusqlite::Error> {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(crate::migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// The underlying async connection, for query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), LeadgateError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Map a `tokio-rusqlite` error into the workspace storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> LeadgateError {
    LeadgateError::Storage {
        source: Box::new(e),
    }
}
