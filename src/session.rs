//! Shift session state and the end-of-shift workflow.
//!
//! `ShiftController` owns everything the client knows about the current
//! worker's shift: the last fetched record list, the checklist gate and the
//! reconciliation draft. The phase is derived from those, never stored.
//! Every mutation is followed by a full re-fetch of the worker's records
//! rather than a local patch.
//!
//! Closing a shift writes twice upstream (close the clock-in record, submit
//! the report). Each save runs under a close intent in the local journal,
//! whose id is sent as the idempotency key, so a retry after a partial
//! failure skips the step that already succeeded.

use chrono::{NaiveDate, Utc, Weekday};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::ShiftBackend;
use crate::checklist::{ChecklistGate, ChecklistItem};
use crate::db::{self, CloseIntent, DbState, IntentStatus};
use crate::error::ShiftError;
use crate::models::{
    ClockInRecord, ClockInStatus, ClockInUpdate, ReportSubmission, ShiftReportData, WorkerProfile,
};
use crate::payments::PaymentBreakdownMode;
use crate::reconciliation::{self, ReconciliationDraft, ReportView};
use crate::stats::{self, ShiftOverview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ShiftPhase {
    NoActiveShift,
    ActiveShift,
    /// Shift still open; checklist gate displayed.
    PendingChecklist,
    /// Shift still open; reconciliation report displayed.
    PendingReport,
}

/// The open record, if any. When the list holds more than one (which the
/// server should never allow) the most recent clock-in wins.
pub fn find_active_record(records: &[ClockInRecord]) -> Option<&ClockInRecord> {
    let mut open = records.iter().filter(|r| r.is_open());
    let first = open.next()?;
    let mut latest = first;
    let mut count = 1;
    for record in open {
        count += 1;
        if record.clock_in > latest.clock_in {
            latest = record;
        }
    }
    if count > 1 {
        warn!(
            open_records = count,
            chosen = %latest.id,
            "worker has more than one open clock-in record"
        );
    }
    Some(latest)
}

pub struct ShiftController<B> {
    backend: B,
    db: DbState,
    payment_mode: PaymentBreakdownMode,
    worker: Option<WorkerProfile>,
    /// Clock-in record whose closing checklist was completed.
    checklist_cleared_for: Option<String>,
    checklist: Option<ChecklistGate>,
    report: Option<ReconciliationDraft>,
}

impl<B: ShiftBackend> ShiftController<B> {
    pub fn new(backend: B, db: DbState, payment_mode: PaymentBreakdownMode) -> Self {
        Self {
            backend,
            db,
            payment_mode,
            worker: None,
            checklist_cleared_for: None,
            checklist: None,
            report: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn worker(&self) -> Option<&WorkerProfile> {
        self.worker.as_ref()
    }

    pub fn records(&self) -> &[ClockInRecord] {
        self.worker
            .as_ref()
            .map(|w| w.clock_ins.as_slice())
            .unwrap_or_default()
    }

    pub fn active_record(&self) -> Option<&ClockInRecord> {
        find_active_record(self.records())
    }

    pub fn has_active_shift(&self) -> bool {
        self.active_record().is_some()
    }

    /// True only while the record the checklist was completed for is
    /// still the active one.
    pub fn checklist_completed(&self) -> bool {
        match (&self.checklist_cleared_for, self.active_record()) {
            (Some(cleared), Some(active)) => *cleared == active.id,
            _ => false,
        }
    }

    pub fn checklist(&self) -> Option<&ChecklistGate> {
        self.checklist.as_ref()
    }

    pub fn report(&self) -> Option<&ReconciliationDraft> {
        self.report.as_ref()
    }

    pub fn report_mut(&mut self) -> Result<&mut ReconciliationDraft, ShiftError> {
        self.report.as_mut().ok_or(ShiftError::NoReportOpen)
    }

    pub fn phase(&self) -> ShiftPhase {
        if self.report.is_some() {
            ShiftPhase::PendingReport
        } else if self.checklist.is_some() {
            ShiftPhase::PendingChecklist
        } else if self.has_active_shift() {
            ShiftPhase::ActiveShift
        } else {
            ShiftPhase::NoActiveShift
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Fetch the worker and their records, then finish any close that was
    /// interrupted after the clock-in record was already closed.
    pub async fn load(&mut self) -> Result<ShiftPhase, ShiftError> {
        self.refresh().await?;
        let resumed = self.resume_pending_closes().await;
        if resumed > 0 {
            info!(resumed, "Finished interrupted shift closes");
        }
        Ok(self.phase())
    }

    async fn refresh(&mut self) -> Result<(), ShiftError> {
        let worker = match self.backend.fetch_worker().await {
            Ok(worker) => worker,
            Err(e) => {
                error!(error = %e, "Failed to load worker session");
                return Err(e);
            }
        };
        debug!(
            worker_id = %worker.id,
            records = worker.clock_ins.len(),
            "worker session refreshed"
        );
        self.worker = Some(worker);

        if !self.checklist_completed() {
            self.checklist_cleared_for = None;
        }
        if !self.has_active_shift() && (self.checklist.is_some() || self.report.is_some()) {
            info!("Active shift no longer open upstream; closing end-of-shift dialogs");
            self.checklist = None;
            self.report = None;
        }
        Ok(())
    }

    /// Submit reports for intents whose clock-in close already went through.
    pub async fn resume_pending_closes(&self) -> usize {
        let intents = match db::list_resumable_intents(&self.db) {
            Ok(intents) => intents,
            Err(e) => {
                warn!(error = %e, "Could not read close journal");
                return 0;
            }
        };

        let mut resumed = 0;
        for intent in intents {
            let submission = reconciliation::report_submission(&intent.user_id, &intent.report);
            match self.submit_and_complete(&intent, &submission).await {
                Ok(()) => {
                    info!(intent_id = %intent.id, clock_in_id = %intent.clock_in_id, "Resumed shift report submission");
                    resumed += 1;
                }
                Err(e) => {
                    warn!(intent_id = %intent.id, error = %e, "Resuming shift report failed");
                    if let Err(db_err) =
                        db::record_close_failure(&self.db, &intent.id, &e.to_string())
                    {
                        warn!(error = %db_err, "Could not record close failure");
                    }
                }
            }
        }
        resumed
    }

    // -----------------------------------------------------------------------
    // Start / end
    // -----------------------------------------------------------------------

    pub async fn start_shift(&mut self) -> Result<(), ShiftError> {
        let worker_id = self
            .worker
            .as_ref()
            .map(|w| w.id.clone())
            .ok_or(ShiftError::WorkerUnknown)?;
        if let Some(active) = self.active_record() {
            return Err(ShiftError::AlreadyClockedIn(active.id.clone()));
        }

        if let Err(e) = self.backend.create_clock_in(&worker_id).await {
            error!(worker_id = %worker_id, error = %e, "Failed to start shift");
            return Err(e);
        }
        info!(worker_id = %worker_id, "Shift started");
        self.refresh().await
    }

    /// Ask to end the shift. Opens the checklist unless it was already
    /// completed in this close cycle, in which case the report opens.
    pub async fn request_end_shift(&mut self) -> Result<ShiftPhase, ShiftError> {
        let record = self
            .active_record()
            .cloned()
            .ok_or(ShiftError::NoActiveShift)?;
        if self.report.is_some() {
            return Ok(ShiftPhase::PendingReport);
        }

        if !self.checklist_completed() {
            self.checklist = Some(ChecklistGate::open());
            debug!(clock_in_id = %record.id, "End-of-shift checklist opened");
            return Ok(self.phase());
        }

        self.checklist = None;
        let mut draft = ReconciliationDraft::open(&record, Utc::now(), self.payment_mode)?;
        match self.backend.fetch_orders().await {
            Ok(orders) => draft.apply_orders(&orders, stats::local_today()),
            Err(e) => warn!(error = %e, "Could not load today's orders; report starts without sales"),
        }
        self.report = Some(draft);
        self.freeze_cash_if_closed(&record.id);
        info!(clock_in_id = %record.id, "Reconciliation report opened");
        Ok(self.phase())
    }

    // -----------------------------------------------------------------------
    // Checklist
    // -----------------------------------------------------------------------

    pub fn toggle_checklist_item(&mut self, item_id: &str) -> Result<bool, ShiftError> {
        self.checklist
            .as_mut()
            .ok_or_else(|| ShiftError::Validation("Checklist is not open".into()))?
            .toggle(item_id)
    }

    /// Confirm the checklist and move on to the report.
    pub async fn complete_checklist(&mut self) -> Result<ShiftPhase, ShiftError> {
        self.checklist
            .as_ref()
            .ok_or_else(|| ShiftError::Validation("Checklist is not open".into()))?
            .complete()?;
        self.checklist_cleared_for = self.active_record().map(|r| r.id.clone());
        self.checklist = None;
        info!("End-of-shift checklist completed");
        self.request_end_shift().await
    }

    pub fn dismiss_checklist(&mut self) {
        self.checklist = None;
    }

    // -----------------------------------------------------------------------
    // Report
    // -----------------------------------------------------------------------

    /// Re-aggregate today's sales from a fresh order list.
    pub async fn refresh_sales(&mut self) -> Result<(), ShiftError> {
        if self.report.is_none() {
            return Err(ShiftError::NoReportOpen);
        }
        let orders = self.backend.fetch_orders().await.map_err(|e| {
            warn!(error = %e, "Failed to refresh today's orders");
            e
        })?;
        self.report_mut()?
            .apply_orders(&orders, stats::local_today());
        Ok(())
    }

    /// Close the clock-in record and submit the report.
    ///
    /// On failure the report stays open and the shift stays active; calling
    /// again resumes from the step that failed.
    pub async fn save_report(&mut self) -> Result<ShiftReportData, ShiftError> {
        let worker_id = self
            .worker
            .as_ref()
            .map(|w| w.id.clone())
            .ok_or(ShiftError::WorkerUnknown)?;
        let draft = self.report.as_ref().ok_or(ShiftError::NoReportOpen)?;

        let report = draft.build_report();
        let update = draft.clock_in_update(&worker_id);
        let clock_in_id = draft.clock_in_id().to_string();
        let submission = reconciliation::report_submission(&worker_id, &report);

        let intent = db::begin_close_intent(&self.db, &clock_in_id, &worker_id, &report)
            .map_err(ShiftError::Storage)?;

        if let Err(e) = self.commit_close(&intent, &update, &submission).await {
            error!(
                intent_id = %intent.id,
                clock_in_id = %clock_in_id,
                error = %e,
                "Saving shift report failed; shift stays open"
            );
            if let Err(db_err) = db::record_close_failure(&self.db, &intent.id, &e.to_string()) {
                warn!(error = %db_err, "Could not record close failure");
            }
            self.freeze_cash_if_closed(&clock_in_id);
            return Err(e);
        }

        info!(
            intent_id = %intent.id,
            clock_in_id = %clock_in_id,
            total_sales = report.total_sales,
            net_income = report.net_income,
            cashout = report.cashout,
            "Shift closed and report saved"
        );

        self.report = None;
        self.checklist = None;
        self.checklist_cleared_for = None;

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Could not reload records after closing shift; marking it closed locally");
            self.mark_closed_locally(&clock_in_id, &update);
        }
        Ok(report)
    }

    pub fn dismiss_report(&mut self) {
        self.report = None;
    }

    async fn commit_close(
        &self,
        intent: &CloseIntent,
        update: &ClockInUpdate,
        submission: &ReportSubmission,
    ) -> Result<(), ShiftError> {
        if intent.status == IntentStatus::Pending {
            self.backend.close_clock_in(update, &intent.id).await?;
            db::mark_clock_in_closed(&self.db, &intent.id).map_err(ShiftError::Storage)?;
        } else {
            debug!(intent_id = %intent.id, "clock-in already closed for this intent");
        }
        self.submit_and_complete(intent, submission).await
    }

    async fn submit_and_complete(
        &self,
        intent: &CloseIntent,
        submission: &ReportSubmission,
    ) -> Result<(), ShiftError> {
        self.backend.submit_report(submission, &intent.id).await?;
        db::complete_close_intent(&self.db, &intent.id).map_err(ShiftError::Storage)
    }

    /// Once the clock-in record has been closed upstream with some cash
    /// figures, the report must carry the same ones: pin them on the draft.
    fn freeze_cash_if_closed(&mut self, clock_in_id: &str) {
        let intent = match db::open_intent_for(&self.db, clock_in_id) {
            Ok(Some(intent)) if intent.status == IntentStatus::ClockInClosed => intent,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, "Could not read close journal");
                return;
            }
        };
        if let Some(draft) = self.report.as_mut() {
            draft.lock_cash(intent.report.money_in, intent.report.money_out);
            debug!(intent_id = %intent.id, "cash figures locked to the closed clock-in record");
        }
    }

    fn mark_closed_locally(&mut self, clock_in_id: &str, update: &ClockInUpdate) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        if let Some(record) = worker.clock_ins.iter_mut().find(|r| r.id == clock_in_id) {
            record.clock_out = Some(Utc::now());
            record.status = ClockInStatus::Ended;
            record.notes = update.notes.clone();
            record.money_in = update.money_in;
            record.money_out = update.money_out;
        }
    }

    // -----------------------------------------------------------------------
    // Read models
    // -----------------------------------------------------------------------

    pub fn overview(
        &self,
        week_start: Weekday,
        custom: Option<(NaiveDate, NaiveDate)>,
    ) -> ShiftOverview {
        stats::overview(self.records(), stats::local_today(), week_start, custom)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            busy: false,
            phase: self.phase(),
            worker_id: self.worker.as_ref().map(|w| w.id.clone()),
            username: self.worker.as_ref().map(|w| w.username.clone()),
            has_active_shift: self.has_active_shift(),
            active_record: self.active_record().cloned(),
            checklist_completed: self.checklist_completed(),
            checklist: self.checklist.as_ref().map(|gate| ChecklistView {
                items: gate.items().to_vec(),
                remaining: gate.remaining(),
                can_complete: gate.is_complete(),
            }),
            report: self.report.as_ref().map(ReconciliationDraft::view),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistView {
    pub items: Vec<ChecklistItem>,
    pub remaining: usize,
    pub can_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub busy: bool,
    pub phase: ShiftPhase,
    pub worker_id: Option<String>,
    pub username: Option<String>,
    pub has_active_shift: bool,
    pub active_record: Option<ClockInRecord>,
    pub checklist_completed: bool,
    pub checklist: Option<ChecklistView>,
    pub report: Option<ReportView>,
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::models::ExpenseCategory;
    use chrono::Duration;

    fn controller(backend: FakeBackend) -> ShiftController<FakeBackend> {
        ShiftController::new(backend, db::open_in_memory(), PaymentBreakdownMode::AssumeCash)
    }

    async fn loaded_with_open_shift() -> ShiftController<FakeBackend> {
        let backend = FakeBackend::with_records(vec![open_record(
            "ci-1",
            Utc::now() - Duration::hours(6),
        )]);
        backend.set(|s| s.orders = todays_orders());
        let mut c = controller(backend);
        c.load().await.unwrap();
        c
    }

    async fn tick_everything(c: &mut ShiftController<FakeBackend>) {
        let ids: Vec<String> = c
            .checklist()
            .unwrap()
            .items()
            .iter()
            .map(|i| i.id.clone())
            .collect();
        for id in ids {
            c.toggle_checklist_item(&id).unwrap();
        }
    }

    async fn open_report(c: &mut ShiftController<FakeBackend>) {
        c.request_end_shift().await.unwrap();
        tick_everything(c).await;
        assert_eq!(c.complete_checklist().await.unwrap(), ShiftPhase::PendingReport);
    }

    #[test]
    fn test_single_open_record_is_active() {
        let now = Utc::now();
        let mut closed = open_record("ci-old", now - Duration::days(1));
        closed.clock_out = Some(now - Duration::hours(16));
        closed.status = ClockInStatus::Ended;
        let records = vec![closed, open_record("ci-open", now)];
        assert_eq!(find_active_record(&records).unwrap().id, "ci-open");
        assert!(find_active_record(&records[..1]).is_none());
    }

    #[test]
    fn test_most_recent_open_record_wins() {
        let now = Utc::now();
        let records = vec![
            open_record("ci-stale", now - Duration::days(2)),
            open_record("ci-fresh", now),
        ];
        assert_eq!(find_active_record(&records).unwrap().id, "ci-fresh");
    }

    #[tokio::test]
    async fn test_start_shift_creates_exactly_one_open_record() {
        let mut c = controller(FakeBackend::default());
        assert_eq!(c.load().await.unwrap(), ShiftPhase::NoActiveShift);
        assert!(!c.has_active_shift());

        c.start_shift().await.unwrap();

        assert_eq!(c.backend().read(|s| s.create_calls), 1);
        assert_eq!(c.records().len(), 1);
        assert!(c.records()[0].clock_out.is_none());
        assert_eq!(c.phase(), ShiftPhase::ActiveShift);

        let err = c.start_shift().await.unwrap_err();
        assert!(matches!(err, ShiftError::AlreadyClockedIn(_)));
        assert_eq!(c.backend().read(|s| s.create_calls), 1);
    }

    #[tokio::test]
    async fn test_start_shift_requires_loaded_worker() {
        let mut c = controller(FakeBackend::default());
        assert!(matches!(
            c.start_shift().await,
            Err(ShiftError::WorkerUnknown)
        ));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_state_untouched() {
        let mut c = controller(FakeBackend::default());
        c.load().await.unwrap();
        c.backend().set(|s| s.fail_create = true);

        assert!(c.start_shift().await.is_err());
        assert!(!c.has_active_shift());
        assert_eq!(c.phase(), ShiftPhase::NoActiveShift);
    }

    #[tokio::test]
    async fn test_end_request_opens_checklist_first() {
        let mut c = loaded_with_open_shift().await;
        assert_eq!(c.phase(), ShiftPhase::ActiveShift);

        let phase = c.request_end_shift().await.unwrap();
        assert_eq!(phase, ShiftPhase::PendingChecklist);
        assert!(c.has_active_shift());
        assert!(c.report().is_none());

        assert!(matches!(
            c.complete_checklist().await,
            Err(ShiftError::ChecklistIncomplete)
        ));
        assert_eq!(c.phase(), ShiftPhase::PendingChecklist);
        assert!(!c.checklist_completed());
    }

    #[tokio::test]
    async fn test_end_request_without_active_shift_errors() {
        let mut c = controller(FakeBackend::default());
        c.load().await.unwrap();
        assert!(matches!(
            c.request_end_shift().await,
            Err(ShiftError::NoActiveShift)
        ));
    }

    #[tokio::test]
    async fn test_completed_checklist_opens_report_with_todays_sales() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;

        let draft = c.report().unwrap();
        assert_eq!(draft.clock_in_id(), "ci-1");
        assert_eq!(draft.sales().total_sales, 350.0);
        assert_eq!(draft.sales().total_orders, 3);
        assert!(c.checklist().is_none());
        assert!(c.checklist_completed());
    }

    #[tokio::test]
    async fn test_dismissed_report_reopens_without_checklist() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;

        c.dismiss_report();
        assert_eq!(c.phase(), ShiftPhase::ActiveShift);

        assert_eq!(c.request_end_shift().await.unwrap(), ShiftPhase::PendingReport);
    }

    #[tokio::test]
    async fn test_dismissed_checklist_must_be_redone() {
        let mut c = loaded_with_open_shift().await;
        c.request_end_shift().await.unwrap();
        c.toggle_checklist_item("cash-count").unwrap();
        c.dismiss_checklist();
        assert_eq!(c.phase(), ShiftPhase::ActiveShift);

        c.request_end_shift().await.unwrap();
        assert_eq!(c.checklist().unwrap().remaining(), 6);
    }

    #[tokio::test]
    async fn test_report_opens_even_when_orders_fail() {
        let mut c = loaded_with_open_shift().await;
        c.backend().set(|s| s.fail_orders = true);
        open_report(&mut c).await;
        assert_eq!(c.report().unwrap().sales().total_orders, 0);

        assert!(c.refresh_sales().await.is_err());
        c.backend().set(|s| s.fail_orders = false);
        c.refresh_sales().await.unwrap();
        assert_eq!(c.report().unwrap().sales().total_sales, 350.0);
    }

    #[tokio::test]
    async fn test_save_report_closes_shift_and_resets_cycle() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        {
            let draft = c.report_mut().unwrap();
            draft.set_money_in(400.0).unwrap();
            draft.set_money_out(150.0).unwrap();
            draft
                .add_expense("Napkins", "30", ExpenseCategory::Supplies)
                .unwrap();
            draft
                .add_expense("Gas refill", "20", ExpenseCategory::Utilities)
                .unwrap();
        }

        let report = c.save_report().await.unwrap();
        assert_eq!(report.total_sales, 350.0);
        assert_eq!(report.total_expenses, 50.0);
        assert_eq!(report.net_income, 300.0);
        assert_eq!(report.cashout, 250.0);

        assert_eq!(c.phase(), ShiftPhase::NoActiveShift);
        assert!(!c.checklist_completed());
        assert!(c.report().is_none());

        let (closes, reports) = c
            .backend()
            .read(|s| (s.close_calls.clone(), s.report_calls.clone()));
        assert_eq!(closes.len(), 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(closes[0].0.money_in, 400.0);
        assert_eq!(closes[0].0.status, ClockInStatus::Ended);
        assert_eq!(reports[0].0.total_orders, 3);
        assert_eq!(closes[0].1, reports[0].1, "both writes share one idempotency key");

        // next cycle starts from the checklist again
        c.start_shift().await.unwrap();
        assert_eq!(
            c.request_end_shift().await.unwrap(),
            ShiftPhase::PendingChecklist
        );
    }

    #[tokio::test]
    async fn test_report_failure_keeps_shift_open_and_retry_skips_close() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_report = true);

        assert!(c.save_report().await.is_err());
        assert_eq!(c.phase(), ShiftPhase::PendingReport);
        assert_eq!(c.active_record().map(|r| r.id.as_str()), Some("ci-1"));
        assert_eq!(c.backend().read(|s| s.close_calls.len()), 1);
        assert_eq!(c.backend().read(|s| s.report_calls.len()), 0);

        c.backend().set(|s| s.fail_report = false);
        c.save_report().await.unwrap();

        let (closes, reports) = c
            .backend()
            .read(|s| (s.close_calls.clone(), s.report_calls.clone()));
        assert_eq!(closes.len(), 1, "clock-in close must not be repeated");
        assert_eq!(reports.len(), 1);
        assert_eq!(closes[0].1, reports[0].1);
        assert_eq!(c.phase(), ShiftPhase::NoActiveShift);
    }

    #[tokio::test]
    async fn test_close_failure_sends_nothing_else() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_close = true);

        assert!(c.save_report().await.is_err());
        assert_eq!(c.phase(), ShiftPhase::PendingReport);
        assert_eq!(c.backend().read(|s| s.report_calls.len()), 0);
        // nothing reached the server, cash can still be corrected
        assert!(!c.report().unwrap().cash_locked());
        c.report_mut().unwrap().set_money_in(10.0).unwrap();
    }

    #[tokio::test]
    async fn test_retry_after_partial_close_keeps_closed_cash_figures() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.report_mut().unwrap().set_money_in(400.0).unwrap();
        c.backend().set(|s| s.fail_report = true);
        assert!(c.save_report().await.is_err());

        let draft = c.report_mut().unwrap();
        assert!(draft.cash_locked());
        assert!(draft.set_money_in(500.0).is_err());
        assert_eq!(draft.money_in(), 400.0);

        // reopening the report keeps the lock
        c.dismiss_report();
        assert_eq!(c.request_end_shift().await.unwrap(), ShiftPhase::PendingReport);
        let draft = c.report_mut().unwrap();
        assert!(draft.cash_locked());
        assert!(draft.set_money_in(500.0).is_err());
        assert_eq!(draft.money_in(), 400.0);

        c.backend().set(|s| s.fail_report = false);
        c.save_report().await.unwrap();

        let (closes, reports) = c
            .backend()
            .read(|s| (s.close_calls.clone(), s.report_calls.clone()));
        assert_eq!(closes.len(), 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(closes[0].0.money_in, 400.0);
        assert_eq!(reports[0].0.money_in, 400.0);
        assert_eq!(closes[0].0.money_out, reports[0].0.money_out);
    }

    #[tokio::test]
    async fn test_load_resumes_interrupted_close() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_report = true);
        assert!(c.save_report().await.is_err());

        c.backend().set(|s| s.fail_report = false);
        c.load().await.unwrap();

        assert_eq!(c.backend().read(|s| s.report_calls.len()), 1);
        // record was closed upstream, so the stale report dialog is gone
        assert_eq!(c.phase(), ShiftPhase::NoActiveShift);
        assert!(db::list_resumable_intents(&c.db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_resume_is_recorded_on_the_intent() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_report = true);
        assert!(c.save_report().await.is_err());

        assert_eq!(c.resume_pending_closes().await, 0);
        let intents = db::list_resumable_intents(&c.db).unwrap();
        assert_eq!(intents.len(), 1);
        assert!(intents[0].last_error.as_deref().unwrap().contains("API server error"));
    }

    #[tokio::test]
    async fn test_checklist_is_required_again_after_resumed_close() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_report = true);
        assert!(c.save_report().await.is_err());

        c.backend().set(|s| s.fail_report = false);
        c.load().await.unwrap();
        assert_eq!(c.phase(), ShiftPhase::NoActiveShift);
        assert!(!c.checklist_completed());

        c.start_shift().await.unwrap();
        assert_eq!(
            c.request_end_shift().await.unwrap(),
            ShiftPhase::PendingChecklist
        );
    }

    #[tokio::test]
    async fn test_completed_checklist_does_not_carry_to_another_record() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.dismiss_report();

        // closed on another terminal, and a new shift opened, between refreshes
        c.backend().set(|s| {
            s.records[0].clock_out = Some(Utc::now());
            s.records[0].status = ClockInStatus::Ended;
            s.records.push(open_record("ci-2", Utc::now()));
        });
        c.load().await.unwrap();

        assert_eq!(c.active_record().map(|r| r.id.as_str()), Some("ci-2"));
        assert!(!c.checklist_completed());
        assert_eq!(
            c.request_end_shift().await.unwrap(),
            ShiftPhase::PendingChecklist
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_after_save_marks_record_closed_locally() {
        let mut c = loaded_with_open_shift().await;
        open_report(&mut c).await;
        c.backend().set(|s| s.fail_fetch_worker = true);

        c.save_report().await.unwrap();
        assert!(!c.has_active_shift());
        assert_eq!(c.records()[0].status, ClockInStatus::Ended);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_phase() {
        let mut c = loaded_with_open_shift().await;
        c.request_end_shift().await.unwrap();
        let snap = c.snapshot();
        assert_eq!(snap.phase, ShiftPhase::PendingChecklist);
        assert!(snap.has_active_shift);
        let checklist = snap.checklist.unwrap();
        assert_eq!(checklist.remaining, 6);
        assert!(!checklist.can_complete);
        assert_eq!(snap.username.as_deref(), Some("maria"));
    }
}
