//! Local SQLite store for the shift desk.
//!
//! Holds the close-intent journal that makes "Save Report" resumable and
//! idempotent, plus a small category/key/value settings table. Uses rusqlite
//! with WAL mode and versioned migrations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ShiftReportData;

pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Initialize the database at `{data_dir}/shift-desk.db`.
///
/// On open failure, deletes the file and retries once. The journal only
/// holds in-flight closes, so losing it is recoverable.
pub fn init(data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("shift-desk.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration v1: settings and close-intent journal.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        -- one row per Save Report attempt chain; id doubles as idempotency key
        CREATE TABLE IF NOT EXISTS shift_close_intents (
            id TEXT PRIMARY KEY,
            clock_in_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'clock_in_closed', 'completed')),
            attempts INTEGER NOT NULL DEFAULT 1,
            last_error TEXT,
            clock_in_closed_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_close_intents_open
            ON shift_close_intents(clock_in_id) WHERE status != 'completed';

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| format!("migrate_v1: {e}"))?;
    info!("Applied migration v1");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Close-intent journal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    /// Nothing confirmed upstream yet.
    Pending,
    /// Clock-in record closed, report not yet accepted.
    ClockInClosed,
    Completed,
}

impl IntentStatus {
    fn as_str(self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::ClockInClosed => "clock_in_closed",
            IntentStatus::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "clock_in_closed" => Ok(IntentStatus::ClockInClosed),
            "completed" => Ok(IntentStatus::Completed),
            other => Err(format!("unknown close intent status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseIntent {
    /// Also sent upstream as the idempotency key.
    pub id: String,
    pub clock_in_id: String,
    pub user_id: String,
    pub report: ShiftReportData,
    pub status: IntentStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
}

const INTENT_COLUMNS: &str =
    "id, clock_in_id, user_id, payload, status, attempts, last_error";

type IntentRow = (String, String, String, String, String, i64, Option<String>);

fn map_intent_row(row: &rusqlite::Row) -> rusqlite::Result<IntentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn intent_from_parts(parts: IntentRow) -> Result<CloseIntent, String> {
    let (id, clock_in_id, user_id, payload, status, attempts, last_error) = parts;
    let report: ShiftReportData = serde_json::from_str(&payload)
        .map_err(|e| format!("corrupt close intent payload ({id}): {e}"))?;
    Ok(CloseIntent {
        id,
        clock_in_id,
        user_id,
        report,
        status: IntentStatus::parse(&status)?,
        attempts,
        last_error,
    })
}

/// The unfinished intent for a clock-in record, if any.
pub fn open_intent_for(db: &DbState, clock_in_id: &str) -> Result<Option<CloseIntent>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let parts = conn
        .query_row(
            &format!(
                "SELECT {INTENT_COLUMNS} FROM shift_close_intents
                 WHERE clock_in_id = ?1 AND status != 'completed'"
            ),
            params![clock_in_id],
            map_intent_row,
        )
        .optional()
        .map_err(|e| format!("load close intent: {e}"))?;
    parts.map(intent_from_parts).transpose()
}

/// Start a close attempt, or resume the unfinished one for the same record.
///
/// A resumed intent keeps its id (and therefore its idempotency key); the
/// stored report payload is refreshed so edits made after a failure are sent.
pub fn begin_close_intent(
    db: &DbState,
    clock_in_id: &str,
    user_id: &str,
    report: &ShiftReportData,
) -> Result<CloseIntent, String> {
    let payload = serde_json::to_string(report).map_err(|e| format!("encode report: {e}"))?;
    let now = Utc::now().to_rfc3339();

    if let Some(mut existing) = open_intent_for(db, clock_in_id)? {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE shift_close_intents
             SET payload = ?1, attempts = attempts + 1, updated_at = ?2
             WHERE id = ?3",
            params![payload, now, existing.id],
        )
        .map_err(|e| format!("resume close intent: {e}"))?;
        existing.report = report.clone();
        existing.attempts += 1;
        info!(
            intent_id = %existing.id,
            clock_in_id,
            attempts = existing.attempts,
            status = existing.status.as_str(),
            "Resuming close intent"
        );
        return Ok(existing);
    }

    let id = Uuid::new_v4().to_string();
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO shift_close_intents
            (id, clock_in_id, user_id, payload, status, attempts, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 1, ?5, ?5)",
        params![id, clock_in_id, user_id, payload, now],
    )
    .map_err(|e| format!("insert close intent: {e}"))?;
    info!(intent_id = %id, clock_in_id, "Close intent recorded");

    Ok(CloseIntent {
        id,
        clock_in_id: clock_in_id.to_string(),
        user_id: user_id.to_string(),
        report: report.clone(),
        status: IntentStatus::Pending,
        attempts: 1,
        last_error: None,
    })
}

pub fn mark_clock_in_closed(db: &DbState, intent_id: &str) -> Result<(), String> {
    set_intent_status(db, intent_id, IntentStatus::ClockInClosed, "clock_in_closed_at")
}

pub fn complete_close_intent(db: &DbState, intent_id: &str) -> Result<(), String> {
    set_intent_status(db, intent_id, IntentStatus::Completed, "completed_at")
}

fn set_intent_status(
    db: &DbState,
    intent_id: &str,
    status: IntentStatus,
    stamp_column: &str,
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let changed = conn
        .execute(
            &format!(
                "UPDATE shift_close_intents
                 SET status = ?1, {stamp_column} = ?2, last_error = NULL, updated_at = ?2
                 WHERE id = ?3"
            ),
            params![status.as_str(), now, intent_id],
        )
        .map_err(|e| format!("update close intent: {e}"))?;
    if changed == 0 {
        return Err(format!("close intent not found: {intent_id}"));
    }
    Ok(())
}

pub fn record_close_failure(db: &DbState, intent_id: &str, error: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "UPDATE shift_close_intents SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
        params![error, Utc::now().to_rfc3339(), intent_id],
    )
    .map_err(|e| format!("record close failure: {e}"))?;
    Ok(())
}

/// Intents whose clock-in record was closed but whose report never landed.
pub fn list_resumable_intents(db: &DbState) -> Result<Vec<CloseIntent>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {INTENT_COLUMNS} FROM shift_close_intents
             WHERE status = 'clock_in_closed'
             ORDER BY created_at ASC"
        ))
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], map_intent_row)
        .map_err(|e| e.to_string())?;

    let mut intents = Vec::new();
    for row in rows {
        match row.map_err(|e| e.to_string()).and_then(intent_from_parts) {
            Ok(intent) => intents.push(intent),
            Err(e) => warn!("skipping malformed close intent row: {e}"),
        }
    }
    Ok(intents)
}

/// In-memory database with migrations applied.
#[cfg(test)]
pub fn open_in_memory() -> DbState {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .expect("pragma setup");
    run_migrations(&conn).expect("run_migrations should succeed in test");
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
