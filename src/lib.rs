//! Shift Desk - worker clock-in and end-of-shift reconciliation
//!
//! Tracks a worker's shift lifecycle against the POS API: clock in, run the
//! closing checklist, reconcile the day's sales and cash movements, then
//! close the clock-in record and submit the shift report. The close is
//! journalled locally so a partial failure can be retried without
//! duplicating either write.

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod backend;
pub mod checklist;
pub mod commands;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod payments;
pub mod reconciliation;
pub mod session;
pub mod stats;

pub use api::ApiClient;
pub use backend::ShiftBackend;
pub use commands::ShiftDesk;
pub use config::ShiftConfig;
pub use error::ShiftError;
pub use session::{ShiftController, ShiftPhase};

/// Structured logging to the console and a daily rolling file under
/// `log_dir`. Keep the returned guard alive; dropping it flushes the file.
pub fn init_logging(log_dir: &std::path::Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shift_desk=debug"));

    diagnostics::prune_old_logs(log_dir);
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

/// Command-line entry point: `shift-desk [status|start|health]`.
///
/// Loads the session (resuming any interrupted close), optionally clocks the
/// worker in, and prints the snapshot and hour statistics as JSON.
pub async fn run() -> anyhow::Result<()> {
    let mut config = ShiftConfig::from_env()?;
    let _guard = init_logging(&diagnostics::get_log_dir(&config.data_dir));

    info!("Starting Shift Desk v{}", env!("CARGO_PKG_VERSION"));

    let db_state = db::init(&config.data_dir).map_err(anyhow::Error::msg)?;
    {
        let conn = db_state
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("database lock poisoned: {e}"))?;
        config.apply_local_settings(&conn);
    }

    let action = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    if action == "health" {
        let health = serde_json::json!({
            "about": diagnostics::get_about_info(),
            "journal": diagnostics::get_journal_health(&db_state).map_err(anyhow::Error::msg)?,
        });
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let client = ApiClient::new(&config)?;
    info!(api = client.base_url(), "API client ready");

    let controller = ShiftController::new(client, db_state, config.payment_breakdown);
    let desk = ShiftDesk::new(controller, config.week_start);

    let mut snapshot = desk.shift_load().await.map_err(anyhow::Error::msg)?;
    match action.as_str() {
        "status" => {}
        "start" => snapshot = desk.shift_start().await.map_err(anyhow::Error::msg)?,
        other => {
            warn!(action = other, "unknown action");
            anyhow::bail!("unknown action {other:?} (expected status, start or health)");
        }
    }
    let stats = desk.shift_stats(None).await.map_err(anyhow::Error::msg)?;

    let output = serde_json::json!({ "session": snapshot, "stats": stats });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
