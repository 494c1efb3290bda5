//! Central record of client status reports and admin actions.
//!
//! # Table design
//!
//! ```text
//! central_update_history(id PK, client_id, society_code, society_name,
//!                        union_name, version_file, status, error_message,
//!                        received_at)
//! admin_actions(id PK, action_type, target, triggered_by, created_at)
//! ```
//!
//! One SQLite connection behind a mutex. Callers run on `spawn_blocking`.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use updraft_core::report::LogReport;
use updraft_core::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS central_update_history (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        client_id     TEXT NOT NULL,
        society_code  TEXT,
        society_name  TEXT,
        union_name    TEXT,
        version_file  TEXT NOT NULL,
        status        TEXT NOT NULL,
        error_message TEXT,
        received_at   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS admin_actions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        action_type  TEXT NOT NULL,
        target       TEXT NOT NULL,
        triggered_by TEXT NOT NULL,
        created_at   TEXT NOT NULL
    );
";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: i64,
    pub client_id: String,
    pub society_code: Option<String>,
    pub society_name: Option<String>,
    pub union_name: Option<String>,
    pub version_file_name: String,
    pub status: String,
    pub error_message: Option<String>,
    pub received_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAction {
    pub id: i64,
    pub action_type: String,
    pub target: String,
    pub triggered_by: String,
    pub created_at: String,
}

pub struct ReportStore {
    conn: Mutex<Connection>,
}

impl ReportStore {
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
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Store a report, filling the defaults older clients leave out.
    pub fn record_report(&self, report: &LogReport) -> Result<i64> {
        let or = |v: &Option<String>, default: &str| {
            v.as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        let conn = self.conn();
        conn.execute(
            "INSERT INTO central_update_history
                (client_id, society_code, society_name, union_name,
                 version_file, status, error_message, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                or(&report.client_id, "unknown"),
                blank_as_null(&report.society_code),
                blank_as_null(&report.society_name),
                blank_as_null(&report.union_name),
                or(&report.version_file_name, "unknown"),
                or(&report.status, "logged"),
                blank_as_null(&report.error_message),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn record_action(&self, action_type: &str, target: &str, triggered_by: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO admin_actions (action_type, target, triggered_by, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![action_type, target, triggered_by, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first.
    pub fn recent_reports(&self, limit: u32) -> Result<Vec<StoredReport>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, client_id, society_code, society_name, union_name,
                    version_file, status, error_message, received_at
             FROM central_update_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(StoredReport {
                id: row.get(0)?,
                client_id: row.get(1)?,
                society_code: row.get(2)?,
                society_name: row.get(3)?,
                union_name: row.get(4)?,
                version_file_name: row.get(5)?,
                status: row.get(6)?,
                error_message: row.get(7)?,
                received_at: row.get(8)?,
            })
        })?;
        let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }

    /// Newest first.
    pub fn recent_actions(&self, limit: u32) -> Result<Vec<AdminAction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action_type, target, triggered_by, created_at
             FROM admin_actions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(AdminAction {
                id: row.get(0)?,
                action_type: row.get(1)?,
                target: row.get(2)?,
                triggered_by: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let out = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(out)
    }
}

fn blank_as_null(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}
