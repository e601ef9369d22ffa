use crate::structs::{AlignedRecord, DateRange};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Seconds between two consecutive points of the 3-hour grid.
pub const STEP_SECONDS: i64 = 3 * 60 * 60;

/// Converts a POSIX timestamp to a UTC date-time, `None` if out of chrono's range.
pub fn utc_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}

/// UTC civil date of a POSIX timestamp.
pub fn utc_date(timestamp: i64) -> Option<NaiveDate> {
    utc_datetime(timestamp).map(|dt| dt.date_naive())
}

pub fn is_feb_29(timestamp: i64) -> bool {
    utc_date(timestamp).is_some_and(|date| date.month() == 2 && date.day() == 29)
}

/// Drops the rows falling on February 29th (UTC).
///
/// A "same time one year ago" reference does not exist for those rows, so they
/// are removed before any year-over-year comparison.
pub fn remove_feb_29(records: &[AlignedRecord]) -> Vec<AlignedRecord> {
    records
        .iter()
        .filter(|r| !is_feb_29(r.timestamp))
        .copied()
        .collect()
}

/// Timestamp of the same date and time `years` years earlier.
///
/// Returns `None` when that date does not exist (February 29th in a non-leap year).
pub fn n_years_ago(timestamp: i64, years: i32) -> Option<i64> {
    let dt = utc_datetime(timestamp)?;
    dt.with_year(dt.year() - years).map(|earlier| earlier.timestamp())
}

/// The eight grid timestamps of `date`: 00, 03, ..., 21 UTC.
pub fn grid_timestamps(date: NaiveDate) -> [i64; 8] {
    let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    std::array::from_fn(|i| midnight + STEP_SECONDS * i as i64)
}

/// Every grid point in the range, paired with its date.
pub fn expected_grid(range: &DateRange) -> Vec<(i64, NaiveDate)> {
    range
        .from
        .iter_days()
        .take_while(|date| *date <= range.to)
        .flat_map(|date| grid_timestamps(date).map(|ts| (ts, date)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEB_29_2020: i64 = 1_582_934_400;

    fn record(timestamp: i64, value: f64) -> AlignedRecord {
        AlignedRecord {
            value,
            timestamp,
            captured_on: utc_date(timestamp).unwrap(),
            t5: 0.0,
            t4: 0.0,
            t3: 0.0,
            t2: 0.0,
            t1: 0.0,
        }
    }

    #[test]
    fn feb_29_detection_is_utc() {
        assert!(is_feb_29(FEB_29_2020));
        assert!(is_feb_29(FEB_29_2020 + 21 * 3600));
        assert!(!is_feb_29(FEB_29_2020 - 1));
        assert!(!is_feb_29(FEB_29_2020 + 86_400));
    }

    #[test]
    fn removes_only_feb_29_and_keeps_order() {
        let records = vec![
            record(FEB_29_2020 - STEP_SECONDS, 1.0),
            record(FEB_29_2020, 2.0),
            record(FEB_29_2020 + 12 * 3600, 3.0),
            record(FEB_29_2020 + 86_400, 4.0),
        ];

        let kept = remove_feb_29(&records);
        assert_eq!(
            kept.iter().map(|r| r.value).collect::<Vec<_>>(),
            vec![1.0, 4.0]
        );
        assert_eq!(remove_feb_29(&kept), kept);
    }

    #[test]
    fn years_ago() {
        // 2019-11-30T03:00:00Z
        let ts = 1_575_082_800;
        assert_eq!(n_years_ago(ts, 1), Some(ts - 365 * 86_400));
        assert_eq!(n_years_ago(FEB_29_2020, 1), None);
        assert_eq!(n_years_ago(FEB_29_2020, 4), Some(FEB_29_2020 - 1461 * 86_400));
    }

    #[test]
    fn grid_of_a_day() {
        let date = NaiveDate::from_ymd_opt(2019, 11, 30).unwrap();
        let grid = grid_timestamps(date);
        assert_eq!(grid[0], 1_575_072_000);
        assert_eq!(grid[1], 1_575_082_800);
        assert_eq!(grid[7], 1_575_072_000 + 21 * 3600);

        let epoch = grid_timestamps(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(epoch[0], 0);
        let before_epoch = grid_timestamps(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
        assert_eq!(before_epoch[0], -86_400);
    }

    #[test]
    fn expected_grid_covers_range() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2020, 2, 28).unwrap(),
            to: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
        };
        let grid = expected_grid(&range);
        assert_eq!(grid.len(), 24);
        assert_eq!(grid[8], (FEB_29_2020, range.from.succ_opt().unwrap()));
        assert!(grid.windows(2).all(|w| w[1].0 - w[0].0 == STEP_SECONDS));
    }
}
