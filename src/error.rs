//! Error type shared by the shift workflow, the API client and the command layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShiftError {
    /// Could not reach the API at all (connect failure, timeout, bad URL).
    #[error("{0}")]
    Transport(String),

    /// The API answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("Invalid response from API: {0}")]
    Decode(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Worker is not known yet; load the session first")]
    WorkerUnknown,

    #[error("Worker already has an active shift ({0})")]
    AlreadyClockedIn(String),

    #[error("No active shift")]
    NoActiveShift,

    #[error("Checklist is not complete")]
    ChecklistIncomplete,

    #[error("No reconciliation report is open")]
    NoReportOpen,

    #[error("Another shift operation is still in progress")]
    Busy,
}

impl ShiftError {
    /// True for failures that happened talking to the remote API.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ShiftError::Transport(_)
                | ShiftError::Status { .. }
                | ShiftError::Decode(_)
                | ShiftError::GraphQl(_)
        )
    }
}

impl From<reqwest::Error> for ShiftError {
    fn from(err: reqwest::Error) -> Self {
        ShiftError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ShiftError {
    fn from(err: serde_json::Error) -> Self {
        ShiftError::Decode(err.to_string())
    }
}
