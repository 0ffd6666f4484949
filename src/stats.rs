//! Worked-hours and cash-movement totals over date windows.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use serde::Serialize;

use crate::models::ClockInRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub hours: f64,
    pub money_in: f64,
    pub money_out: f64,
    pub shifts: usize,
}

/// Totals for every completed record whose clock-in falls in `[start, end]`.
///
/// Records still open (no clock-out) never contribute.
pub fn compute_window_statistics(
    records: &[ClockInRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> WindowStats {
    let mut stats = WindowStats::default();
    for record in records {
        let Some(clock_in) = record.clock_in else {
            continue;
        };
        let Some(hours) = record.elapsed_hours() else {
            continue;
        };
        if clock_in < start || clock_in > end {
            continue;
        }
        stats.hours += hours;
        stats.money_in += record.money_in;
        stats.money_out += record.money_out;
        stats.shifts += 1;
    }
    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    Today,
    ThisWeek,
    ThisMonth,
    /// Inclusive calendar-date range.
    Custom { from: NaiveDate, to: NaiveDate },
}

impl StatsWindow {
    /// UTC bounds of the window, using local calendar days.
    pub fn bounds(
        self,
        today: NaiveDate,
        week_start: Weekday,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let (first, last) = match self {
            StatsWindow::Today => (today, today),
            StatsWindow::ThisWeek => {
                let offset = (7 + today.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7;
                (today - Duration::days(i64::from(offset)), today)
            }
            StatsWindow::ThisMonth => (today.with_day(1).unwrap_or(today), today),
            StatsWindow::Custom { from, to } => {
                if from <= to {
                    (from, to)
                } else {
                    (to, from)
                }
            }
        };
        (start_of_day(first), end_of_day(last))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftOverview {
    pub today: WindowStats,
    pub week: WindowStats,
    pub month: WindowStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<WindowStats>,
}

/// Today / this week / this month, plus an optional custom range.
pub fn overview(
    records: &[ClockInRecord],
    today: NaiveDate,
    week_start: Weekday,
    custom: Option<(NaiveDate, NaiveDate)>,
) -> ShiftOverview {
    let window = |w: StatsWindow| {
        let (start, end) = w.bounds(today, week_start);
        compute_window_statistics(records, start, end)
    };
    ShiftOverview {
        today: window(StatsWindow::Today),
        week: window(StatsWindow::ThisWeek),
        month: window(StatsWindow::ThisMonth),
        custom: custom.map(|(from, to)| window(StatsWindow::Custom { from, to })),
    }
}

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    local_to_utc(date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

pub(crate) fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    local_to_utc(
        date.and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_default(),
    )
}

fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
