//! Runtime configuration.
//!
//! Read from `SHIFT_DESK_*` environment variables first; rows in the local
//! `local_settings` table (category `shift`) override the behavioural knobs
//! so a terminal can be adjusted without touching its environment.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Weekday;
use rusqlite::Connection;
use tracing::warn;

use crate::db;
use crate::error::ShiftError;
use crate::payments::PaymentBreakdownMode;

pub const ENV_API_URL: &str = "SHIFT_DESK_API_URL";
pub const ENV_TOKEN: &str = "SHIFT_DESK_TOKEN";
pub const ENV_DATA_DIR: &str = "SHIFT_DESK_DATA_DIR";
pub const ENV_PAYMENT_BREAKDOWN: &str = "SHIFT_DESK_PAYMENT_BREAKDOWN";
pub const ENV_WEEK_START: &str = "SHIFT_DESK_WEEK_START";
pub const ENV_TIMEOUT_SECS: &str = "SHIFT_DESK_TIMEOUT_SECS";

const SETTINGS_CATEGORY: &str = "shift";

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftConfig {
    pub api_url: String,
    /// JWT forwarded to the API as the `token` cookie.
    pub api_token: Option<String>,
    pub data_dir: PathBuf,
    pub payment_breakdown: PaymentBreakdownMode,
    pub week_start: Weekday,
    pub request_timeout: Duration,
}

impl ShiftConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: None,
            data_dir: default_data_dir(),
            payment_breakdown: PaymentBreakdownMode::default(),
            week_start: Weekday::Mon,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ShiftError> {
        let api_url = env_value(ENV_API_URL)
            .ok_or_else(|| ShiftError::Config(format!("{ENV_API_URL} is not set")))?;
        let mut config = ShiftConfig::new(api_url);

        config.api_token = env_value(ENV_TOKEN);
        if let Some(dir) = env_value(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(mode) = env_value(ENV_PAYMENT_BREAKDOWN) {
            config.payment_breakdown = mode.parse()?;
        }
        if let Some(day) = env_value(ENV_WEEK_START) {
            config.week_start = parse_week_start(&day)?;
        }
        if let Some(secs) = env_value(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                ShiftError::Config(format!("{ENV_TIMEOUT_SECS} must be whole seconds, got {secs:?}"))
            })?;
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        Ok(config)
    }

    /// Apply overrides stored in `local_settings`. Invalid rows are logged
    /// and ignored so a bad setting cannot lock the terminal out.
    pub fn apply_local_settings(&mut self, conn: &Connection) {
        if let Some(raw) = db::get_setting(conn, SETTINGS_CATEGORY, "payment_breakdown") {
            match raw.parse() {
                Ok(mode) => self.payment_breakdown = mode,
                Err(e) => warn!(value = %raw, error = %e, "ignoring payment_breakdown setting"),
            }
        }
        if let Some(raw) = db::get_setting(conn, SETTINGS_CATEGORY, "week_start") {
            match parse_week_start(&raw) {
                Ok(day) => self.week_start = day,
                Err(e) => warn!(value = %raw, error = %e, "ignoring week_start setting"),
            }
        }
    }
}

pub fn parse_week_start(raw: &str) -> Result<Weekday, ShiftError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mon" | "monday" => Ok(Weekday::Mon),
        "sun" | "sunday" => Ok(Weekday::Sun),
        "sat" | "saturday" => Ok(Weekday::Sat),
        other => Err(ShiftError::Config(format!(
            "Unsupported week start: {other}"
        ))),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("com.thesmall.shift-desk")
}
