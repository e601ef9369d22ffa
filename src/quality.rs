//! Data quality checks over the recorded tables and the aligned output.
//!
//! Weather data is expected at 00, 03, ..., 21 UTC every day, and forecasts are
//! captured every day. These helpers find where the recorded data departs from
//! that, and where an aligned table has gaps.

use crate::align::align_table;
use crate::calendar::{STEP_SECONDS, expected_grid, grid_timestamps, utc_datetime};
use crate::structs::{
    AlignedRecord, CityTables, DateRange, LeadTimePolicy, ObservationTable, WeatherVariable,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// A run of aligned rows whose timestamps are 3 hours apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataInterval {
    pub first_row: usize,
    pub first_dt: i64,
    pub last_row: usize,
    pub last_dt: i64,
}

impl DataInterval {
    pub fn row_count(&self) -> usize {
        self.last_row - self.first_row + 1
    }
}

impl std::fmt::Display for DataInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let iso = |ts: i64| {
            utc_datetime(ts)
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(
            f,
            "{}:{} -- {}:{}",
            self.first_row,
            self.last_row,
            iso(self.first_dt),
            iso(self.last_dt)
        )
    }
}

/// Counts describing the state of one city's recorded data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub range: Option<DateRange>,
    pub missing_actuals: usize,
    pub unexpected_actuals: usize,
    pub days_without_forecasts: Vec<NaiveDate>,
    /// Grid points per variable that did not end up in the aligned table
    pub unaligned: BTreeMap<WeatherVariable, usize>,
}

/// Grid points of the range for which no actual value was recorded.
pub fn missing_actuals(actual: &ObservationTable, range: &DateRange) -> Vec<(i64, NaiveDate)> {
    let recorded: HashSet<i64> = actual.rows.iter().map(|r| r.dt).collect();
    expected_grid(range)
        .into_iter()
        .filter(|(ts, _)| !recorded.contains(ts))
        .collect()
}

/// Timestamps of actual values recorded within the range but off the 3-hour grid.
pub fn unexpected_actuals(actual: &ObservationTable, range: &DateRange) -> Vec<i64> {
    let grid: HashSet<i64> = expected_grid(range).into_iter().map(|(ts, _)| ts).collect();
    let start = grid_timestamps(range.from)[0];
    let end = range
        .to
        .succ_opt()
        .map(|next| grid_timestamps(next)[0])
        .unwrap_or(i64::MAX);

    actual
        .rows
        .iter()
        .map(|r| r.dt)
        .filter(|ts| (start..end).contains(ts) && !grid.contains(ts))
        .collect()
}

/// Days of the range on which no forecast was captured.
pub fn days_without_forecasts(forecast: &ObservationTable, range: &DateRange) -> Vec<NaiveDate> {
    let captured: HashSet<NaiveDate> = forecast.rows.iter().map(|r| r.today).collect();
    range
        .from
        .iter_days()
        .take_while(|date| *date <= range.to)
        .filter(|date| !captured.contains(date))
        .collect()
}

/// Grid points of the range without an aligned row, i.e. either never measured
/// or measured without all five forecasts.
pub fn unaligned_timestamps(aligned: &[AlignedRecord], range: &DateRange) -> Vec<i64> {
    let present: HashSet<i64> = aligned.iter().map(|r| r.timestamp).collect();
    expected_grid(range)
        .into_iter()
        .map(|(ts, _)| ts)
        .filter(|ts| !present.contains(ts))
        .collect()
}

/// Splits an aligned table into runs of contiguous 3-hourly rows.
pub fn contiguous_intervals(aligned: &[AlignedRecord]) -> Vec<DataInterval> {
    let Some(first) = aligned.first() else {
        return Vec::new();
    };

    let mut intervals = Vec::new();
    let mut current = DataInterval {
        first_row: 0,
        first_dt: first.timestamp,
        last_row: 0,
        last_dt: first.timestamp,
    };
    for (i, pair) in aligned.windows(2).enumerate() {
        if pair[1].timestamp - pair[0].timestamp == STEP_SECONDS {
            current.last_row = i + 1;
            current.last_dt = pair[1].timestamp;
        } else {
            intervals.push(current);
            current = DataInterval {
                first_row: i + 1,
                first_dt: pair[1].timestamp,
                last_row: i + 1,
                last_dt: pair[1].timestamp,
            };
        }
    }
    intervals.push(current);
    intervals
}

/// Applies row-position slices one after the other; each `(start, end)` is
/// half-open and clamped to the rows left by the previous slice.
pub fn select_rows(aligned: &[AlignedRecord], intervals: &[(usize, usize)]) -> Vec<AlignedRecord> {
    let mut selected = aligned;
    for &(start, end) in intervals {
        let end = end.min(selected.len());
        let start = start.min(end);
        selected = &selected[start..end];
    }
    selected.to_vec()
}

/// Date range spanned by the actual table's capture dates.
pub fn recorded_range(actual: &ObservationTable) -> Option<DateRange> {
    let from = actual.rows.iter().map(|r| r.today).min()?;
    let to = actual.rows.iter().map(|r| r.today).max()?;
    Some(DateRange { from, to })
}

/// Checks a city's tables over `range`, or over the recorded range when `None`.
///
/// Each of `variables` is aligned with `policy` to count the grid points that
/// have no aligned row.
pub fn assess(
    tables: &CityTables,
    range: Option<DateRange>,
    variables: &[WeatherVariable],
    policy: LeadTimePolicy,
) -> QualityReport {
    let range = range.or_else(|| recorded_range(&tables.actual));
    let Some(r) = &range else {
        return QualityReport {
            range,
            missing_actuals: 0,
            unexpected_actuals: 0,
            days_without_forecasts: Vec::new(),
            unaligned: BTreeMap::new(),
        };
    };

    let unaligned = variables
        .iter()
        .map(|&variable| {
            let alignment = align_table(&tables.actual, &tables.forecast, variable, policy);
            (variable, unaligned_timestamps(&alignment.records, r).len())
        })
        .collect();

    QualityReport {
        range,
        missing_actuals: missing_actuals(&tables.actual, r).len(),
        unexpected_actuals: unexpected_actuals(&tables.actual, r).len(),
        days_without_forecasts: days_without_forecasts(&tables.forecast, r),
        unaligned,
    }
}
