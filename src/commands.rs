//! JSON command surface for the shift desk front end.
//!
//! Each handler takes the raw payload the UI sends (camelCase or snake_case
//! keys, sometimes a bare string), runs one controller operation and
//! returns the refreshed session snapshot. Errors are flattened to strings.
//!
//! The controller sits behind a mutex taken with `try_lock`: while one
//! operation is awaiting the API, a second click is rejected instead of
//! queued, so "Start Shift" or "Save Report" cannot be submitted twice.

use chrono::{NaiveDate, Weekday};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::backend::ShiftBackend;
use crate::error::ShiftError;
use crate::models::ExpenseCategory;
use crate::reconciliation::parse_amount;
use crate::session::ShiftController;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChecklistTogglePayload {
    #[serde(alias = "item_id", alias = "id")]
    item_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportUpdatePayload {
    #[serde(default, alias = "money_in")]
    money_in: Option<Value>,
    #[serde(default, alias = "money_out")]
    money_out: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpensePayload {
    description: String,
    amount: Value,
    #[serde(default, alias = "expense_type", alias = "expenseType")]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseIdPayload {
    #[serde(alias = "expense_id", alias = "id")]
    expense_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsPayload {
    #[serde(default, alias = "date_from", alias = "from")]
    date_from: Option<String>,
    #[serde(default, alias = "date_to", alias = "to")]
    date_to: Option<String>,
}

/// Turn a bare string argument into `{ key: value }`, pass objects through.
fn parse_payload<T: DeserializeOwned>(
    arg0: Option<Value>,
    bare_key: &str,
    what: &str,
) -> Result<T, String> {
    let payload = match arg0 {
        Some(Value::String(s)) => json!({ bare_key: s }),
        Some(Value::Object(obj)) => Value::Object(obj),
        Some(v) => v,
        None => json!({}),
    };
    serde_json::from_value(payload).map_err(|e| format!("Invalid {what} payload: {e}"))
}

/// Amount fields arrive as numbers or as the raw text of an input box.
/// An empty box counts as zero.
fn amount_from_value(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("Not a valid amount: {n}")),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => parse_amount(s).map_err(|e| e.to_string()),
        Value::Null => Ok(0.0),
        other => Err(format!("Not a valid amount: {other}")),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date (expected YYYY-MM-DD): {raw}"))
}

fn err(e: ShiftError) -> String {
    e.to_string()
}

pub struct ShiftDesk<B> {
    controller: Mutex<ShiftController<B>>,
    week_start: Weekday,
}

impl<B: ShiftBackend> ShiftDesk<B> {
    pub fn new(controller: ShiftController<B>, week_start: Weekday) -> Self {
        Self {
            controller: Mutex::new(controller),
            week_start,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ShiftController<B>>, String> {
        self.controller.try_lock().map_err(|_| {
            debug!("rejecting command while another shift operation is running");
            err(ShiftError::Busy)
        })
    }

    fn snapshot_json(controller: &ShiftController<B>) -> Result<Value, String> {
        serde_json::to_value(controller.snapshot()).map_err(|e| e.to_string())
    }

    pub async fn shift_snapshot(&self) -> Result<Value, String> {
        match self.controller.try_lock() {
            Ok(controller) => Self::snapshot_json(&controller),
            Err(_) => Ok(json!({ "busy": true })),
        }
    }

    pub async fn shift_load(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.load().await.map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn shift_start(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.start_shift().await.map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn shift_request_end(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.request_end_shift().await.map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn checklist_toggle(&self, arg0: Option<Value>) -> Result<Value, String> {
        let payload: ChecklistTogglePayload = parse_payload(arg0, "itemId", "checklist")?;
        let mut controller = self.lock()?;
        controller
            .toggle_checklist_item(payload.item_id.trim())
            .map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn checklist_complete(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.complete_checklist().await.map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn checklist_dismiss(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.dismiss_checklist();
        Self::snapshot_json(&controller)
    }

    pub async fn report_update(&self, arg0: Option<Value>) -> Result<Value, String> {
        let payload: ReportUpdatePayload = parse_payload(arg0, "notes", "report")?;
        let money_in = payload.money_in.as_ref().map(amount_from_value).transpose()?;
        let money_out = payload.money_out.as_ref().map(amount_from_value).transpose()?;

        let mut controller = self.lock()?;
        let draft = controller.report_mut().map_err(err)?;
        if let Some(amount) = money_in {
            draft.set_money_in(amount).map_err(err)?;
        }
        if let Some(amount) = money_out {
            draft.set_money_out(amount).map_err(err)?;
        }
        if let Some(notes) = payload.notes {
            draft.set_notes(notes);
        }
        Self::snapshot_json(&controller)
    }

    pub async fn report_add_expense(&self, arg0: Option<Value>) -> Result<Value, String> {
        let payload: ExpensePayload = parse_payload(arg0, "description", "expense")?;
        let category: ExpenseCategory = payload
            .category
            .as_deref()
            .unwrap_or("other")
            .parse()
            .map_err(err)?;
        let amount_text = match &payload.amount {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let mut controller = self.lock()?;
        controller
            .report_mut()
            .map_err(err)?
            .add_expense(&payload.description, &amount_text, category)
            .map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn report_remove_expense(&self, arg0: Option<Value>) -> Result<Value, String> {
        let payload: ExpenseIdPayload = parse_payload(arg0, "expenseId", "expense")?;
        let mut controller = self.lock()?;
        controller
            .report_mut()
            .map_err(err)?
            .remove_expense(&payload.expense_id)
            .ok_or_else(|| format!("Expense not found: {}", payload.expense_id))?;
        Self::snapshot_json(&controller)
    }

    pub async fn report_refresh_sales(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.refresh_sales().await.map_err(err)?;
        Self::snapshot_json(&controller)
    }

    pub async fn report_save(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        let report = controller.save_report().await.map_err(err)?;
        Ok(json!({
            "success": true,
            "report": report,
            "snapshot": Self::snapshot_json(&controller)?,
        }))
    }

    pub async fn report_dismiss(&self) -> Result<Value, String> {
        let mut controller = self.lock()?;
        controller.dismiss_report();
        Self::snapshot_json(&controller)
    }

    /// Hours and cash totals for today, this week, this month and an
    /// optional `dateFrom`..`dateTo` range.
    pub async fn shift_stats(&self, arg0: Option<Value>) -> Result<Value, String> {
        let payload: StatsPayload = parse_payload(arg0, "dateFrom", "stats")?;
        let custom = match (payload.date_from.as_deref(), payload.date_to.as_deref()) {
            (Some(from), Some(to)) => Some((parse_date(from)?, parse_date(to)?)),
            (Some(day), None) | (None, Some(day)) => {
                let day = parse_date(day)?;
                Some((day, day))
            }
            (None, None) => None,
        };
        let controller = self.lock()?;
        serde_json::to_value(controller.overview(self.week_start, custom)).map_err(|e| e.to_string())
    }
}
