//! End-of-shift reconciliation report.
//!
//! A `ReconciliationDraft` holds the editable inputs of the report (cash
//! movements, expenses, notes) next to today's sales aggregate. Every total
//! is derived from those inputs on read, so cashout and net income can never
//! drift from the values they are computed from.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ShiftError;
use crate::models::{
    ClockInRecord, ClockInStatus, ClockInUpdate, Expense, ExpenseCategory, Order,
    PaymentBreakdown, ReportSubmission, ShiftReportData,
};
use crate::payments::{self, PaymentBreakdownMode};

// ---------------------------------------------------------------------------
// Sales aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_sales: f64,
    pub total_orders: usize,
    pub payment_methods: PaymentBreakdown,
}

impl SalesSummary {
    /// Aggregate the orders created on `today` (local calendar date).
    pub fn from_orders(orders: &[Order], today: NaiveDate, mode: PaymentBreakdownMode) -> Self {
        let todays: Vec<&Order> = orders
            .iter()
            .filter(|order| match order.created_at_utc() {
                Some(created) => created.with_timezone(&Local).date_naive() == today,
                None => {
                    warn!(
                        order_id = order.id.as_deref().unwrap_or("?"),
                        created_at = %order.created_at,
                        "skipping order with unreadable timestamp"
                    );
                    false
                }
            })
            .collect();

        let summary = SalesSummary {
            total_sales: todays.iter().map(|o| o.total).sum(),
            total_orders: todays.len(),
            payment_methods: payments::breakdown(todays.iter().copied(), mode),
        };
        debug!(
            orders = orders.len(),
            todays_orders = summary.total_orders,
            total_sales = summary.total_sales,
            "aggregated today's sales"
        );
        summary
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationDraft {
    clock_in_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    mode: PaymentBreakdownMode,
    sales: SalesSummary,
    money_in: f64,
    money_out: f64,
    /// Set once the clock-in record was closed with `money_in`/`money_out`.
    cash_locked: bool,
    expenses: Vec<Expense>,
    notes: String,
}

impl ReconciliationDraft {
    /// Open a draft for the active record, seeded with its cash movements.
    pub fn open(
        record: &ClockInRecord,
        end_time: DateTime<Utc>,
        mode: PaymentBreakdownMode,
    ) -> Result<Self, ShiftError> {
        let start_time = record.clock_in.ok_or(ShiftError::NoActiveShift)?;
        Ok(Self {
            clock_in_id: record.id.clone(),
            start_time,
            end_time,
            mode,
            sales: SalesSummary::default(),
            money_in: record.money_in,
            money_out: record.money_out,
            cash_locked: false,
            expenses: Vec::new(),
            notes: record.notes.clone().unwrap_or_default(),
        })
    }

    pub fn clock_in_id(&self) -> &str {
        &self.clock_in_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn sales(&self) -> &SalesSummary {
        &self.sales
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn money_in(&self) -> f64 {
        self.money_in
    }

    pub fn money_out(&self) -> f64 {
        self.money_out
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Replace the sales aggregate from a fresh upstream order list.
    pub fn apply_orders(&mut self, orders: &[Order], today: NaiveDate) {
        self.sales = SalesSummary::from_orders(orders, today, self.mode);
    }

    pub fn cash_locked(&self) -> bool {
        self.cash_locked
    }

    pub fn set_money_in(&mut self, amount: f64) -> Result<(), ShiftError> {
        self.ensure_cash_editable()?;
        self.money_in = amount;
        Ok(())
    }

    pub fn set_money_out(&mut self, amount: f64) -> Result<(), ShiftError> {
        self.ensure_cash_editable()?;
        self.money_out = amount;
        Ok(())
    }

    /// Pin the cash figures to the values the clock-in record was closed
    /// with. Later edits are rejected.
    pub fn lock_cash(&mut self, money_in: f64, money_out: f64) {
        self.money_in = money_in;
        self.money_out = money_out;
        self.cash_locked = true;
    }

    fn ensure_cash_editable(&self) -> Result<(), ShiftError> {
        if self.cash_locked {
            return Err(ShiftError::Validation(
                "Cash figures are locked: the clock-in record was already closed with them".into(),
            ));
        }
        Ok(())
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    /// Append an expense. Empty descriptions and amounts that are not a
    /// finite positive number are rejected.
    pub fn add_expense(
        &mut self,
        description: &str,
        amount_input: &str,
        category: ExpenseCategory,
    ) -> Result<&Expense, ShiftError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ShiftError::Validation("Expense description is required".into()));
        }
        let amount = parse_amount(amount_input)?;
        if amount <= 0.0 {
            return Err(ShiftError::Validation("Expense amount must be positive".into()));
        }

        self.expenses.push(Expense {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            amount,
            category,
        });
        let added = &self.expenses[self.expenses.len() - 1];
        debug!(expense_id = %added.id, amount, category = %category, "expense added");
        Ok(added)
    }

    pub fn remove_expense(&mut self, expense_id: &str) -> Option<Expense> {
        let idx = self.expenses.iter().position(|e| e.id == expense_id)?;
        Some(self.expenses.remove(idx))
    }

    pub fn total_expenses(&self) -> f64 {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    pub fn cashout(&self) -> f64 {
        self.money_in - self.money_out
    }

    pub fn net_income(&self) -> f64 {
        self.sales.total_sales - self.total_expenses()
    }

    pub fn build_report(&self) -> ShiftReportData {
        ShiftReportData {
            start_time: self.start_time,
            end_time: self.end_time,
            total_sales: self.sales.total_sales,
            total_orders: self.sales.total_orders,
            payment_methods: self.sales.payment_methods,
            expenses: self.expenses.clone(),
            total_expenses: self.total_expenses(),
            net_income: self.net_income(),
            money_in: self.money_in,
            money_out: self.money_out,
            cashout: self.cashout(),
        }
    }

    /// Current inputs plus every derived total, for display.
    pub fn view(&self) -> ReportView {
        ReportView {
            clock_in_id: self.clock_in_id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            sales: self.sales,
            money_in: self.money_in,
            money_out: self.money_out,
            cash_locked: self.cash_locked,
            cashout: self.cashout(),
            expenses: self.expenses.clone(),
            total_expenses: self.total_expenses(),
            net_income: self.net_income(),
            notes: self.notes.clone(),
        }
    }

    pub fn clock_in_update(&self, user_id: &str) -> ClockInUpdate {
        let notes = self.notes.trim();
        ClockInUpdate {
            user_id: user_id.to_string(),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            status: ClockInStatus::Ended,
            money_in: self.money_in,
            money_out: self.money_out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub clock_in_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sales: SalesSummary,
    pub money_in: f64,
    pub money_out: f64,
    pub cash_locked: bool,
    pub cashout: f64,
    pub expenses: Vec<Expense>,
    pub total_expenses: f64,
    pub net_income: f64,
    pub notes: String,
}

/// Sink payload for a finished report.
pub fn report_submission(user_id: &str, report: &ShiftReportData) -> ReportSubmission {
    ReportSubmission {
        user_id: user_id.to_string(),
        date: report
            .end_time
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string(),
        money_in: report.money_in,
        money_out: report.money_out,
        total_orders: report.total_orders,
        total_sales: report.total_sales,
        note: expense_note(&report.expenses),
    }
}

/// One `description (category) amount` line per expense, `; `-separated.
pub fn expense_note(expenses: &[Expense]) -> String {
    expenses
        .iter()
        .map(|e| format!("{} ({}) {:.2}", e.description, e.category, e.amount))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse a user-entered amount, accepting a comma as decimal separator.
pub fn parse_amount(input: &str) -> Result<f64, ShiftError> {
    let normalized = input.trim().replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ShiftError::Validation(format!("Not a valid amount: {input:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn millis(y: i32, m: u32, d: u32, h: u32) -> String {
        Local
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
            .to_string()
    }

    fn order(total: f64, created_at: String) -> Order {
        Order {
            id: None,
            total,
            status: "completed".into(),
            created_at,
            payment_reference: None,
        }
    }

    fn active_record() -> ClockInRecord {
        ClockInRecord {
            id: "ci-1".into(),
            user_id: "u-1".into(),
            clock_in: Some(Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()),
            clock_out: None,
            status: ClockInStatus::Active,
            notes: None,
            money_in: 0.0,
            money_out: 0.0,
        }
    }

    fn draft() -> ReconciliationDraft {
        ReconciliationDraft::open(&active_record(), Utc::now(), PaymentBreakdownMode::AssumeCash)
            .unwrap()
    }

    #[test]
    fn test_todays_sales_exclude_other_days() {
        let orders = vec![
            order(100.0, millis(2026, 10, 16, 9)),
            order(200.0, millis(2026, 10, 16, 13)),
            order(50.0, millis(2026, 10, 16, 20)),
            order(999.0, millis(2026, 10, 15, 12)),
        ];
        let summary = SalesSummary::from_orders(&orders, today(), PaymentBreakdownMode::AssumeCash);
        assert_eq!(summary.total_sales, 350.0);
        assert_eq!(summary.total_orders, 3);
        assert_eq!(summary.payment_methods.cash, 350.0);
        assert_eq!(summary.payment_methods.card, 0.0);
    }

    #[test]
    fn test_unreadable_timestamps_are_skipped() {
        let orders = vec![
            order(10.0, "not-a-date".into()),
            order(5.0, millis(2026, 10, 16, 9)),
        ];
        let summary = SalesSummary::from_orders(&orders, today(), PaymentBreakdownMode::AssumeCash);
        assert_eq!(summary.total_orders, 1);
        assert_eq!(summary.total_sales, 5.0);
    }

    #[test]
    fn test_cashout_tracks_inputs_including_negative() {
        let mut d = draft();
        for (money_in, money_out) in [(100.0, 40.0), (0.0, 25.5), (10.0, 10.0), (-5.0, 3.0)] {
            d.set_money_in(money_in).unwrap();
            d.set_money_out(money_out).unwrap();
            assert_eq!(d.cashout(), money_in - money_out);
        }
        d.set_money_in(20.0).unwrap();
        d.set_money_out(75.0).unwrap();
        assert_eq!(d.cashout(), -55.0);
        assert_eq!(d.build_report().cashout, -55.0);
    }

    #[test]
    fn test_expense_totals_and_net_income() {
        let mut d = draft();
        let orders = vec![
            order(100.0, millis(2026, 10, 16, 9)),
            order(200.0, millis(2026, 10, 16, 10)),
            order(50.0, millis(2026, 10, 16, 11)),
        ];
        d.apply_orders(&orders, today());
        d.add_expense("Napkins", "30", ExpenseCategory::Supplies).unwrap();
        d.add_expense("Light bulb", "20", ExpenseCategory::Maintenance)
            .unwrap();

        assert_eq!(d.total_expenses(), 50.0);
        assert_eq!(d.net_income(), 300.0);

        let report = d.build_report();
        assert_eq!(report.total_sales, 350.0);
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_expenses, 50.0);
        assert_eq!(report.net_income, 300.0);
    }

    #[test]
    fn test_remove_expense_decreases_total_by_its_amount() {
        let mut d = draft();
        d.add_expense("Gas", "12.5", ExpenseCategory::Utilities).unwrap();
        let id = d
            .add_expense("Mop", "7,25", ExpenseCategory::Supplies)
            .unwrap()
            .id
            .clone();
        let before = d.total_expenses();

        let removed = d.remove_expense(&id).unwrap();
        assert_eq!(removed.amount, 7.25);
        assert_eq!(before - d.total_expenses(), removed.amount);
        assert!(d.remove_expense(&id).is_none());
    }

    #[test]
    fn test_invalid_expenses_are_rejected() {
        let mut d = draft();
        assert!(d.add_expense("   ", "10", ExpenseCategory::Other).is_err());
        assert!(d.add_expense("Ice", "ten", ExpenseCategory::Other).is_err());
        assert!(d.add_expense("Ice", "NaN", ExpenseCategory::Other).is_err());
        assert!(d.add_expense("Ice", "inf", ExpenseCategory::Other).is_err());
        assert!(d.add_expense("Ice", "-3", ExpenseCategory::Other).is_err());
        assert!(d.expenses().is_empty());
    }

    #[test]
    fn test_expense_ids_are_unique() {
        let mut d = draft();
        let a = d.add_expense("A", "1", ExpenseCategory::Other).unwrap().id.clone();
        let b = d.add_expense("B", "1", ExpenseCategory::Other).unwrap().id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn test_submission_note_and_clock_in_update() {
        let mut d = draft();
        d.set_money_in(300.0).unwrap();
        d.set_money_out(120.0).unwrap();
        d.set_notes("  Quiet night ");
        d.add_expense("Napkins", "30", ExpenseCategory::Supplies).unwrap();
        d.add_expense("Plumber", "20", ExpenseCategory::Maintenance)
            .unwrap();

        let submission = report_submission("u-1", &d.build_report());
        assert_eq!(submission.note, "Napkins (supplies) 30.00; Plumber (maintenance) 20.00");
        assert_eq!(submission.money_in, 300.0);
        assert_eq!(submission.money_out, 120.0);
        assert_eq!(submission.date.len(), 10);

        let update = d.clock_in_update("u-1");
        assert_eq!(update.status, ClockInStatus::Ended);
        assert_eq!(update.notes.as_deref(), Some("Quiet night"));
        assert_eq!(update.money_in, 300.0);
    }

    #[test]
    fn test_locked_cash_rejects_edits() {
        let mut d = draft();
        d.set_money_in(500.0).unwrap();
        d.lock_cash(400.0, 100.0);

        assert!(d.set_money_in(450.0).is_err());
        assert!(d.set_money_out(0.0).is_err());
        assert_eq!(d.money_in(), 400.0);
        assert_eq!(d.cashout(), 300.0);
        assert!(d.view().cash_locked);

        // expenses and notes stay editable
        d.add_expense("Ice", "5", ExpenseCategory::Other).unwrap();
        d.set_notes("late delivery");
        assert_eq!(d.build_report().money_in, 400.0);
    }

    #[test]
    fn test_open_requires_clock_in_time() {
        let mut record = active_record();
        record.clock_in = None;
        assert!(ReconciliationDraft::open(&record, Utc::now(), PaymentBreakdownMode::AssumeCash).is_err());
    }
}
