// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, migrations,
//! and capability probing.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use caramelo_core::CarameloError;

/// Optional schema revisions layered on top of the base schema.
///
/// Each revision is applied best-effort at open: a failure disables the
/// corresponding feature for the process lifetime instead of blocking
/// startup. The probe relation below is what the capability check looks
/// for in `sqlite_master`.
const OPTIONAL_REVISIONS: &[(&str, &str)] = &[
    (
        "immediate_followups",
        r#"
        CREATE TABLE IF NOT EXISTS immediate_followups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id TEXT NOT NULL,
            level INTEGER NOT NULL,
            message TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            executed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        CREATE INDEX IF NOT EXISTS idx_immediate_chat ON immediate_followups(chat_id, id DESC);
        "#,
    ),
    (
        "appointment_reminders",
        r#"
        CREATE TABLE IF NOT EXISTS appointment_reminders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id TEXT NOT NULL,
            service TEXT NOT NULL,
            appointment_time TEXT NOT NULL,
            reminder_time TEXT NOT NULL,
            lead_minutes INTEGER NOT NULL,
            pet_name TEXT,
            owner_name TEXT,
            sent INTEGER NOT NULL DEFAULT 0,
            sent_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reminders_pending ON appointment_reminders(sent, reminder_time);
        "#,
    ),
    (
        "payments",
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id TEXT NOT NULL,
            payment_id TEXT NOT NULL UNIQUE,
            provider TEXT NOT NULL,
            amount REAL NOT NULL,
            original_amount REAL NOT NULL,
            discount_amount REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            method TEXT NOT NULL,
            description TEXT,
            payment_url TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            confirmed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_payments_chat ON payments(chat_id, id DESC);
        CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
        CREATE VIEW IF NOT EXISTS payment_analytics AS
        SELECT
            chat_id,
            COUNT(*) AS total_payments,
            SUM(CASE WHEN status = 'confirmed' THEN 1 ELSE 0 END) AS confirmed_payments,
            COALESCE(SUM(CASE WHEN status = 'confirmed' THEN amount ELSE 0 END), 0) AS total_revenue,
            COALESCE(SUM(CASE WHEN status = 'confirmed' THEN discount_amount ELSE 0 END), 0) AS total_discounts_given,
            COALESCE(AVG(CASE WHEN status = 'confirmed' THEN amount END), 0) AS avg_ticket
        FROM payments
        GROUP BY chat_id;
        "#,
    ),
];

/// Feature flags determined once at open by probing `sqlite_master`.
///
/// Operations against an optional table consult these instead of probing
/// for failure on every call; a missing capability degrades the operation
/// to an empty/no-op result with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub immediate_followups: bool,
    pub appointment_reminders: bool,
    pub payments: bool,
}

/// Handle to the WAL-mode SQLite store.
///
/// Cheap to clone; all clones share the single background writer thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
    capabilities: Capabilities,
}

impl Database {
    /// Open (creating if missing) the store at `path`, apply PRAGMAs and
    /// the base migration, then apply optional revisions best-effort and
    /// probe capabilities.
    ///
    /// Base-schema failure is the one fatal storage error in the system:
    /// the store cannot serve without it.
    pub async fn open(path: &str) -> Result<Self, CarameloError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CarameloError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| CarameloError::Storage {
                source: Box::new(e),
            })?;

        // PRAGMAs first, then the base schema. Errors here propagate:
        // fatal by design.
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| CarameloError::Storage {
                source: Box::new(e),
            })?;

        // Optional revisions: log and continue on failure, then probe what
        // actually exists.
        let capabilities = conn
            .call(|conn| {
                for (probe, sql) in OPTIONAL_REVISIONS {
                    if let Err(e) = conn.execute_batch(sql) {
                        warn!(revision = probe, error = %e, "optional schema revision failed; feature disabled");
                    }
                }
                Ok(Capabilities {
                    immediate_followups: has_relation(conn, "immediate_followups")?,
                    appointment_reminders: has_relation(conn, "appointment_reminders")?,
                    payments: has_relation(conn, "payments")?
                        && has_relation(conn, "payment_analytics")?,
                })
            })
            .await
            .map_err(map_tr_err)?;

        debug!(?capabilities, "optional schema revisions probed");
        info!(path, "store opened");

        Ok(Self { conn, capabilities })
    }

    /// The underlying single-writer connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Feature flags probed at open.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), CarameloError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!("WAL checkpoint complete, store closed");
        Ok(())
    }

    /// Overrides probed capabilities to exercise schema-drift degradation
    /// in tests.
    #[cfg(test)]
    pub(crate) fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// True when a table or view with the given name exists.
fn has_relation(conn: &rusqlite::Connection, name: &str) -> Result<bool, rusqlite::Error> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Map a tokio-rusqlite error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CarameloError {
    CarameloError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_probes_all_capabilities() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("open.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        assert!(db_path.exists(), "database file should be created");
        let caps = db.capabilities();
        assert!(caps.immediate_followups);
        assert!(caps.appointment_reminders);
        assert!(caps.payments);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested/data/caramelo.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");

        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();

        // Second open re-runs pragmas, skips applied migrations, re-probes.
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db.capabilities().payments);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_is_active() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("wal.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                let mode =
                    conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))?;
                Ok(mode)
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        db.close().await.unwrap();
    }
}
