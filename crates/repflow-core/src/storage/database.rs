//! SQLite-backed schedule store and settings.
//!
//! Provides persistent storage for:
//! - Authored schedules, kept as JSON documents
//! - Key-value store for settings such as the default rest length

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::schedule::Schedule;

const DEFAULT_REST_KEY: &str = "default_rest_secs";

/// Listing row for a stored schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub id: String,
    pub title: String,
    pub owner_id: Option<String>,
    pub step_count: usize,
    pub updated_at: String,
}

/// SQLite database for schedules and settings.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/repflow/repflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("repflow.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schedules (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                owner_id    TEXT,
                step_count  INTEGER NOT NULL,
                body        TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schedules_owner ON schedules(owner_id);",
        )?;
        Ok(())
    }

    // ── Schedules ────────────────────────────────────────────────────

    /// Insert or replace a schedule after validating it.
    ///
    /// # Errors
    /// Returns an error if the schedule is invalid or the write fails.
    pub fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        schedule.validate()?;
        let body = serde_json::to_string(schedule)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO schedules (id, title, owner_id, step_count, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                schedule.id,
                schedule.title,
                schedule.owner_id,
                schedule.steps.len() as i64,
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one schedule by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored document is corrupt.
    pub fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM schedules WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(body) = body else {
            return Ok(None);
        };
        let schedule: Schedule =
            serde_json::from_str(&body).map_err(|e| DatabaseError::CorruptDocument {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(schedule))
    }

    /// All stored schedules, most recently updated first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn list_schedules(&self) -> Result<Vec<ScheduleSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, owner_id, step_count, updated_at
             FROM schedules ORDER BY updated_at DESC, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ScheduleSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                owner_id: row.get(2)?,
                step_count: row.get::<_, i64>(3)? as usize,
                updated_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete a schedule. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn delete_schedule(&self, id: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// The user's stored default rest length, if one was saved.
    /// An unparsable value reads as unset.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn default_rest_secs(&self) -> Result<Option<i64>> {
        Ok(self
            .kv_get(DEFAULT_REST_KEY)?
            .and_then(|v| v.trim().parse().ok()))
    }

    /// # Errors
    /// Returns an error if the write fails.
    pub fn set_default_rest_secs(&self, secs: i64) -> Result<()> {
        self.kv_set(DEFAULT_REST_KEY, &secs.to_string())?;
        Ok(())
    }
}
