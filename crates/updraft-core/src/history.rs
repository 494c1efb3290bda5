//! Local append-only update history.
//!
//! # Table design
//!
//! ```text
//! update_history(id PK, society_code, society_name, union_name,
//!                occurred_at, version_file, status, error_message,
//!                delivered 0|1)
//! ```
//!
//! Records are never deleted. `delivered` flips from 0 to 1 exactly once,
//! after the server acknowledged the record.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Result, UpdraftError};
use crate::types::{ClientIdentity, UpdateEvent, UpdateStatus};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS update_history (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        society_code  TEXT NOT NULL,
        society_name  TEXT NOT NULL,
        union_name    TEXT NOT NULL,
        occurred_at   TEXT NOT NULL,
        version_file  TEXT NOT NULL,
        status        TEXT NOT NULL,
        error_message TEXT,
        delivered     INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_update_history_delivered
        ON update_history(delivered);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub event: UpdateEvent,
    pub delivered: bool,
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open or create the history database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn append(&self, event: &UpdateEvent) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO update_history
                (society_code, society_name, union_name, occurred_at,
                 version_file, status, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.identity.code,
                event.identity.name,
                event.identity.group,
                event.at.format(TIME_FORMAT).to_string(),
                event.artifact,
                event.status.as_str(),
                event.error,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Records not yet acknowledged by the server, oldest first.
    pub fn undelivered(&self) -> Result<Vec<HistoryRecord>> {
        self.query("WHERE delivered = 0 ORDER BY id ASC", params![])
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<HistoryRecord>> {
        self.query("ORDER BY id DESC LIMIT ?1", params![limit])
    }

    /// Set the delivered bit. Returns false if the record was already
    /// delivered or does not exist.
    pub fn mark_delivered(&self, id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE update_history SET delivered = 1 WHERE id = ?1 AND delivered = 0",
            params![id],
        )?;
        Ok(changed == 1)
    }

    pub fn count_undelivered(&self) -> Result<u64> {
        let n: Option<i64> = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM update_history WHERE delivered = 0",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(n.unwrap_or(0) as u64)
    }

    fn query(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT id, society_code, society_name, union_name, occurred_at,
                    version_file, status, error_message, delivered
             FROM update_history {clause}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, code, name, group, at, artifact, status, error, delivered) = row?;
            let at = NaiveDateTime::parse_from_str(&at, TIME_FORMAT)
                .map_err(|e| UpdraftError::History(format!("record {id}: bad timestamp: {e}")))?;
            out.push(HistoryRecord {
                id,
                event: UpdateEvent {
                    identity: ClientIdentity::new(code, name, group),
                    artifact,
                    status: status.parse::<UpdateStatus>()?,
                    error,
                    at,
                },
                delivered: delivered != 0,
            });
        }
        Ok(out)
    }
}
