//! Diagnostics for the shift desk.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Journal health**: schema version and close intents still in flight
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use crate::db::DbState;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix of the daily rolling log.
pub const LOG_FILE_PREFIX: &str = "shift-desk";

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

/// Schema version plus counts of unfinished close intents by status.
pub fn get_journal_health(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let schema_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let count = |status: &str| -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM shift_close_intents WHERE status = ?1",
            [status],
            |row| row.get(0),
        )
        .unwrap_or(0)
    };
    let pending = count("pending");
    let clock_in_closed = count("clock_in_closed");

    let last_error: Option<String> = conn
        .query_row(
            "SELECT last_error FROM shift_close_intents
             WHERE status != 'completed' AND last_error IS NOT NULL
             ORDER BY updated_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .ok();

    Ok(json!({
        "dbPath": db.db_path.display().to_string(),
        "schemaVersion": schema_version,
        "closeIntents": {
            "pending": pending,
            "clockInClosed": clock_in_closed,
            "lastError": last_error,
        },
    }))
}

/// Log directory under the configured data directory.
pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
