//! Payment-method breakdown for the reconciliation report.
//!
//! Orders only carry a free-text payment reference. By default every sale is
//! counted as cash; `ParseReferences` reads "Split Bill" style references
//! (`Split Bill - Cash: 120.00, QR: 80.00`) and card/QR mentions instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ShiftError;
use crate::models::{Order, PaymentBreakdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentBreakdownMode {
    #[default]
    AssumeCash,
    ParseReferences,
}

impl FromStr for PaymentBreakdownMode {
    type Err = ShiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" | "assume_cash" => Ok(PaymentBreakdownMode::AssumeCash),
            "references" | "parse_references" => Ok(PaymentBreakdownMode::ParseReferences),
            other => Err(ShiftError::Config(format!(
                "Unknown payment breakdown mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for PaymentBreakdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentBreakdownMode::AssumeCash => f.write_str("cash"),
            PaymentBreakdownMode::ParseReferences => f.write_str("references"),
        }
    }
}

const NON_CASH_MARKERS: &[&str] = &["card", "qr", "transfer"];

/// Split a list of orders into cash and card totals.
pub fn breakdown<'a, I>(orders: I, mode: PaymentBreakdownMode) -> PaymentBreakdown
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut totals = PaymentBreakdown::default();
    for order in orders {
        let part = match mode {
            PaymentBreakdownMode::AssumeCash => PaymentBreakdown {
                cash: order.total,
                card: 0.0,
            },
            PaymentBreakdownMode::ParseReferences => {
                split_reference(order.payment_reference.as_deref(), order.total)
            }
        };
        totals.cash += part.cash;
        totals.card += part.card;
    }
    totals
}

/// Attribute one order's total using its payment reference.
pub fn split_reference(reference: Option<&str>, total: f64) -> PaymentBreakdown {
    let Some(reference) = reference.map(str::to_ascii_lowercase) else {
        return PaymentBreakdown {
            cash: total,
            card: 0.0,
        };
    };

    if reference.contains("split bill") {
        let cash = amount_after(&reference, "cash");
        let card = NON_CASH_MARKERS
            .iter()
            .filter_map(|marker| amount_after(&reference, marker))
            .sum::<f64>();
        return match (cash, card > 0.0) {
            (Some(cash), true) => PaymentBreakdown { cash, card },
            (Some(cash), false) => PaymentBreakdown {
                cash,
                card: (total - cash).max(0.0),
            },
            (None, true) => PaymentBreakdown {
                cash: (total - card).max(0.0),
                card,
            },
            (None, false) => PaymentBreakdown {
                cash: total,
                card: 0.0,
            },
        };
    }

    if NON_CASH_MARKERS.iter().any(|m| reference.contains(m)) {
        PaymentBreakdown {
            cash: 0.0,
            card: total,
        }
    } else {
        PaymentBreakdown {
            cash: total,
            card: 0.0,
        }
    }
}

/// Number following `label` (after optional `:`/`=`/spaces), e.g. `cash: 12.50`.
fn amount_after(text: &str, label: &str) -> Option<f64> {
    let start = text.find(label)? + label.len();
    let rest = text[start..].trim_start_matches(|c: char| c == ':' || c == '=' || c.is_whitespace());
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}
