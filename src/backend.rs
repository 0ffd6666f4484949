//! Collaborator interfaces consumed by the shift controller.
//!
//! `ApiClient` implements all of them against the remote service; tests use
//! an in-memory fake.

use async_trait::async_trait;

use crate::error::ShiftError;
use crate::models::{ClockInUpdate, Order, ReportSubmission, WorkerProfile};

/// "Who am I": the authenticated worker plus their clock-in records.
#[async_trait]
pub trait WorkerSource: Send + Sync {
    async fn fetch_worker(&self) -> Result<WorkerProfile, ShiftError>;
}

#[async_trait]
pub trait ClockInSink: Send + Sync {
    /// Create a record with clock-in = now, clock-out = null, status active.
    async fn create_clock_in(&self, user_id: &str) -> Result<(), ShiftError>;

    /// Close the worker's active record (clock-out = now).
    async fn close_clock_in(
        &self,
        update: &ClockInUpdate,
        idempotency_key: &str,
    ) -> Result<(), ShiftError>;
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit_report(
        &self,
        submission: &ReportSubmission,
        idempotency_key: &str,
    ) -> Result<(), ShiftError>;
}

/// All orders, unfiltered; callers filter by date.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_orders(&self) -> Result<Vec<Order>, ShiftError>;
}

pub trait ShiftBackend: WorkerSource + ClockInSink + ReportSink + OrderSource {}

impl<T> ShiftBackend for T where T: WorkerSource + ClockInSink + ReportSink + OrderSource {}
