//! Wire and domain types for the shift workflow.
//!
//! Field names follow the API's camelCase JSON. Timestamps coming from the
//! GraphQL service are epoch milliseconds, sometimes as numeric strings, so
//! decoding accepts numbers, numeric strings and RFC 3339 text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ShiftError;

// ---------------------------------------------------------------------------
// Clock-in records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockInStatus {
    Active,
    Ended,
}

impl ClockInStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockInStatus::Active => "active",
            ClockInStatus::Ended => "ended",
        }
    }
}

/// One shift instance for one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInRecord {
    pub id: String,
    #[serde(alias = "user_id", alias = "workerId")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de_opt_timestamp", alias = "clock_in")]
    pub clock_in: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp", alias = "clock_out")]
    pub clock_out: Option<DateTime<Utc>>,
    pub status: ClockInStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "de_money", alias = "money_in")]
    pub money_in: f64,
    #[serde(default, deserialize_with = "de_money", alias = "money_out")]
    pub money_out: f64,
}

impl ClockInRecord {
    /// Clock-in set and clock-out still null.
    pub fn is_open(&self) -> bool {
        self.clock_in.is_some() && self.clock_out.is_none()
    }

    /// Fractional hours between clock-in and clock-out, for completed records.
    pub fn elapsed_hours(&self) -> Option<f64> {
        match (self.clock_in, self.clock_out) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds() as f64 / 3_600_000.0)
            }
            _ => None,
        }
    }
}

/// Result of the "who am I" lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProfile {
    pub id: String,
    pub username: String,
    #[serde(default, alias = "clock_ins", alias = "clockInRecords")]
    pub clock_ins: Vec<ClockInRecord>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(deserialize_with = "de_money")]
    pub total: f64,
    #[serde(default)]
    pub status: String,
    /// Epoch milliseconds as delivered by the API (usually a numeric string).
    #[serde(deserialize_with = "de_millis_text", alias = "created_at")]
    pub created_at: String,
    #[serde(default, alias = "payment_reference", alias = "reference")]
    pub payment_reference: Option<String>,
}

impl Order {
    pub fn created_at_millis(&self) -> Option<i64> {
        let raw = self.created_at.trim();
        raw.parse::<i64>().ok().or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i64)
        })
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at_millis()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Supplies,
    Maintenance,
    Utilities,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseCategory::Supplies => "supplies",
            ExpenseCategory::Maintenance => "maintenance",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Other => "other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = ShiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supplies" => Ok(ExpenseCategory::Supplies),
            "maintenance" => Ok(ExpenseCategory::Maintenance),
            "utilities" => Ok(ExpenseCategory::Utilities),
            "other" => Ok(ExpenseCategory::Other),
            other => Err(ShiftError::Validation(format!(
                "Unknown expense category: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub category: ExpenseCategory,
}

// ---------------------------------------------------------------------------
// Report output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub cash: f64,
    /// Card, QR and transfer payments.
    pub card: f64,
}

/// The reconciliation result assembled at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftReportData {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_sales: f64,
    pub total_orders: usize,
    pub payment_methods: PaymentBreakdown,
    pub expenses: Vec<Expense>,
    pub total_expenses: f64,
    pub net_income: f64,
    pub money_in: f64,
    pub money_out: f64,
    pub cashout: f64,
}

/// Payload closing the worker's active clock-in record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockInUpdate {
    pub user_id: String,
    pub notes: Option<String>,
    pub status: ClockInStatus,
    pub money_in: f64,
    pub money_out: f64,
}

/// Payload persisted by the report sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubmission {
    pub user_id: String,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub money_in: f64,
    pub money_out: f64,
    pub total_orders: usize,
    pub total_sales: f64,
    pub note: String,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Parse an epoch-millisecond number or an RFC 3339 string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawScalar>::deserialize(deserializer)?;
    let parsed = match raw {
        None => None,
        Some(RawScalar::Int(ms)) => Utc.timestamp_millis_opt(ms).single(),
        Some(RawScalar::Float(ms)) => Utc.timestamp_millis_opt(ms as i64).single(),
        Some(RawScalar::Text(text)) => {
            if text.trim().is_empty() {
                None
            } else {
                Some(parse_timestamp(&text).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {text}"))
                })?)
            }
        }
    };
    Ok(parsed)
}

fn de_millis_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawScalar::deserialize(deserializer)? {
        RawScalar::Int(ms) => ms.to_string(),
        RawScalar::Float(ms) => (ms as i64).to_string(),
        RawScalar::Text(text) => text,
    })
}

/// Money fields arrive as numbers, numeric strings or null.
fn de_money<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawScalar>::deserialize(deserializer)? {
        None => 0.0,
        Some(RawScalar::Int(v)) => v as f64,
        Some(RawScalar::Float(v)) => v,
        Some(RawScalar::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed
                    .parse::<f64>()
                    .map_err(|_| serde::de::Error::custom(format!("invalid amount: {text}")))?
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clock_in_record_decodes_millis_strings() {
        let record: ClockInRecord = serde_json::from_value(json!({
            "id": "ci-1",
            "userId": "u-1",
            "clockIn": "1760608800000",
            "clockOut": null,
            "status": "active",
            "notes": null,
            "moneyIn": 150,
            "moneyOut": "20.5",
        }))
        .unwrap();
        assert_eq!(
            record.clock_in.unwrap().timestamp_millis(),
            1_760_608_800_000
        );
        assert!(record.clock_out.is_none());
        assert!(record.is_open());
        assert_eq!(record.money_in, 150.0);
        assert_eq!(record.money_out, 20.5);
    }

    #[test]
    fn test_clock_in_record_accepts_rfc3339_and_snake_case() {
        let record: ClockInRecord = serde_json::from_value(json!({
            "id": "ci-2",
            "user_id": "u-1",
            "clock_in": "2026-10-16T08:00:00Z",
            "clock_out": "2026-10-16T16:30:00Z",
            "status": "ended",
        }))
        .unwrap();
        assert!(!record.is_open());
        assert_eq!(record.elapsed_hours(), Some(8.5));
        assert_eq!(record.money_in, 0.0);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = serde_json::from_value::<ClockInRecord>(json!({
            "id": "ci-3",
            "userId": "u-1",
            "clockIn": 1760608800000i64,
            "status": "paused",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_order_created_at_accepts_number_or_string() {
        let a: Order = serde_json::from_value(json!({
            "total": 12.5, "status": "completed", "createdAt": "1760608800000"
        }))
        .unwrap();
        let b: Order = serde_json::from_value(json!({
            "total": "7", "status": "completed", "createdAt": 1760608800000i64
        }))
        .unwrap();
        assert_eq!(a.created_at_millis(), Some(1_760_608_800_000));
        assert_eq!(b.created_at_millis(), Some(1_760_608_800_000));
        assert_eq!(b.total, 7.0);
    }

    #[test]
    fn test_expense_category_parse() {
        assert_eq!(
            "Supplies".parse::<ExpenseCategory>().unwrap(),
            ExpenseCategory::Supplies
        );
        assert_eq!(
            " utilities ".parse::<ExpenseCategory>().unwrap(),
            ExpenseCategory::Utilities
        );
        assert!("snacks".parse::<ExpenseCategory>().is_err());
    }
}
