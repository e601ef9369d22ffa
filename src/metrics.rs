use crate::calendar::{n_years_ago, remove_feb_29};
use crate::error::{PipelineError, Result};
use crate::structs::{AlignedRecord, LEAD_TIMES, Metric, MetricsReport};
use log::{debug, warn};
use std::collections::HashMap;

const DAYS_PER_YEAR: usize = 365;

/// Computes the accuracy metrics of the five forecasts of an aligned table.
///
/// MAE, RMSE and MedAE are computed for every lead time. MASE uses the value
/// measured `i` days earlier as naive forecast for `t_i`; MASE-1y uses the value
/// measured one year earlier, after removing February 29th. Either MASE family
/// failing leaves it unavailable without affecting the other metrics.
///
/// # Errors
/// Returns `PipelineError::Data` if the aligned table is empty.
pub fn precision(aligned: &[AlignedRecord], day_factor: usize) -> Result<MetricsReport> {
    if aligned.is_empty() {
        return Err(PipelineError::Data(
            "no aligned records to compute metrics from".to_string(),
        ));
    }

    let real = actual_values(aligned);
    let mut mae = [0.0; 5];
    let mut rmse = [0.0; 5];
    let mut medae = [0.0; 5];
    for (i, &lead) in LEAD_TIMES.iter().enumerate() {
        let predicted = forecast_values(aligned, lead);
        mae[i] = mean_absolute_error(&real, &predicted);
        rmse[i] = root_mean_squared_error(&real, &predicted);
        medae[i] = median_absolute_error(&real, &predicted);
    }

    let mase = mase_by_lead_time(aligned, day_factor).unwrap_or_else(|e| {
        warn!("mase unavailable: {}", e);
        [None; 5]
    });
    let mase1y = mase_one_year(aligned, day_factor).unwrap_or_else(|e| {
        warn!("mase1y unavailable: {}", e);
        [None; 5]
    });

    debug!(
        "Computed metrics over {} records: mae={:?} mase={:?}",
        aligned.len(),
        mae,
        mase
    );

    Ok(MetricsReport {
        mae,
        rmse,
        medae,
        mase,
        mase1y,
    })
}

pub fn mean_absolute_error(real: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(real.len(), predicted.len());
    mean(real.iter().zip(predicted).map(|(r, p)| (r - p).abs()))
}

pub fn root_mean_squared_error(real: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(real.len(), predicted.len());
    mean(real.iter().zip(predicted).map(|(r, p)| (r - p).powi(2))).sqrt()
}

/// Median of the absolute errors; the mean of the two middle values for an even count.
pub fn median_absolute_error(real: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(real.len(), predicted.len());
    let mut errors: Vec<f64> = real
        .iter()
        .zip(predicted)
        .map(|(r, p)| (r - p).abs())
        .collect();
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.sort_by(f64::total_cmp);

    let len = errors.len();
    if len % 2 == 0 {
        (errors[len / 2 - 1] + errors[len / 2]) / 2.0
    } else {
        errors[len / 2]
    }
}

/// Mean absolute scaled error against the naive forecast `period` positions back.
///
/// The result is the MAE of `predicted` over `real[period..]` divided by the MAE of
/// `real` shifted by `period` positions. Values above 1 mean the naive forecast
/// did better.
///
/// Returns `None` when the two series differ in length, when `real` has no more
/// than `period` values, or when the naive forecast is perfect and the ratio is
/// undefined.
pub fn mean_absolute_scaled_error(real: &[f64], predicted: &[f64], period: usize) -> Metric {
    if real.len() != predicted.len() || real.len() <= period {
        return None;
    }
    let model = mean_absolute_error(&real[period..], &predicted[period..]);
    let naive = mean_absolute_error(&real[period..], &real[..real.len() - period]);
    let ratio = model / naive;
    ratio.is_finite().then_some(ratio)
}

/// MASE of every `t_i`, with the value measured `i` days earlier as naive forecast.
///
/// Gaps in the series are not accounted for: the prior period is a fixed number
/// of rows back.
pub fn mase_by_lead_time(aligned: &[AlignedRecord], day_factor: usize) -> Result<[Metric; 5]> {
    check_day_factor(day_factor)?;
    let real = actual_values(aligned);
    Ok(LEAD_TIMES.map(|lead| {
        let predicted = forecast_values(aligned, lead);
        mean_absolute_scaled_error(&real, &predicted, lead as usize * day_factor)
    }))
}

/// MASE of every `t_i`, with the value measured one year earlier as naive forecast.
pub fn mase_one_year(aligned: &[AlignedRecord], day_factor: usize) -> Result<[Metric; 5]> {
    check_day_factor(day_factor)?;
    let filtered = remove_feb_29(aligned);
    let real = actual_values(&filtered);
    let period = DAYS_PER_YEAR * day_factor;
    Ok(LEAD_TIMES.map(|lead| {
        let predicted = forecast_values(&filtered, lead);
        mean_absolute_scaled_error(&real, &predicted, period)
    }))
}

/// MASE of every `t_i`, with the average of the values measured at the same date
/// and time over the previous `years_back` years as naive forecast.
///
/// `history` maps timestamps to actual values and must be supplied by the caller,
/// typically from several years of recorded weather; the aligned table alone
/// never covers the reference years. If any reference point is missing from it,
/// the naive forecast cannot be built and every value is unavailable.
pub fn mase_year_average(
    aligned: &[AlignedRecord],
    history: &HashMap<i64, f64>,
    years_back: u32,
) -> [Metric; 5] {
    if years_back == 0 || aligned.is_empty() {
        return [None; 5];
    }
    let filtered = remove_feb_29(aligned);

    let mut naive = Vec::with_capacity(filtered.len());
    for record in &filtered {
        let mut sum = 0.0;
        for n in 1..=years_back as i32 {
            match n_years_ago(record.timestamp, n).and_then(|ts| history.get(&ts)) {
                Some(value) => sum += value,
                None => {
                    warn!(
                        "dt={} has no value {} years earlier in the historical data",
                        record.timestamp, n
                    );
                    return [None; 5];
                }
            }
        }
        naive.push(sum / years_back as f64);
    }

    let real = actual_values(&filtered);
    let naive_error = mean_absolute_error(&real, &naive);
    LEAD_TIMES.map(|lead| {
        let ratio = mean_absolute_error(&real, &forecast_values(&filtered, lead)) / naive_error;
        ratio.is_finite().then_some(ratio)
    })
}

fn check_day_factor(day_factor: usize) -> Result<()> {
    if day_factor == 0 {
        return Err(PipelineError::Data(
            "day factor must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

fn actual_values(aligned: &[AlignedRecord]) -> Vec<f64> {
    aligned.iter().map(|r| r.value).collect()
}

fn forecast_values(aligned: &[AlignedRecord], lead: u32) -> Vec<f64> {
    aligned.iter().map(|r| r.forecast(lead)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{STEP_SECONDS, utc_date};
    use crate::structs::DEFAULT_DAY_FACTOR;
    use chrono::{Datelike, NaiveDate};

    const DAY: usize = DEFAULT_DAY_FACTOR;

    fn aligned(value: f64, timestamp: i64, forecasts: [f64; 5]) -> AlignedRecord {
        let [t5, t4, t3, t2, t1] = forecasts;
        AlignedRecord {
            value,
            timestamp,
            captured_on: utc_date(timestamp).unwrap(),
            t5,
            t4,
            t3,
            t2,
            t1,
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{} != {}", a, b);
    }

    #[test]
    fn basic_metrics_per_lead_time() {
        let data = vec![
            aligned(1.0, 100, [4.0, 3.0, 2.0, 1.0, 1.0]),
            aligned(2.0, 200, [3.0, 1.0, 4.0, 5.0, 3.0]),
        ];

        let report = precision(&data, DAY).unwrap();

        assert_eq!(report.mae, [2.0, 1.5, 1.5, 1.5, 0.5]);
        assert_eq!(report.medae, [2.0, 1.5, 1.5, 1.5, 0.5]);
        let expected_rmse = [
            2.23606797749979,
            1.5811388300841898,
            1.5811388300841898,
            2.1213203435596424,
            0.7071067811865476,
        ];
        for (got, want) in report.rmse.iter().zip(expected_rmse) {
            assert_close(*got, want);
        }
        assert_eq!(report.mase, [None; 5]);
        assert_eq!(report.mase1y, [None; 5]);
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(matches!(precision(&[], DAY), Err(PipelineError::Data(_))));
    }

    #[test]
    fn median_of_odd_and_even_counts() {
        assert_eq!(median_absolute_error(&[0.0, 0.0, 0.0], &[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_absolute_error(&[0.0; 4], &[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn mase_needs_more_values_than_the_period() {
        let real = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 2.0];
        let predicted = [4.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0];

        assert_eq!(mean_absolute_scaled_error(&real, &predicted, 8), Some(2.0));
        assert_eq!(mean_absolute_scaled_error(&real, &predicted, 9), None);
        assert_eq!(mean_absolute_scaled_error(&real, &predicted, 10), None);
    }

    #[test]
    fn mase_of_series_with_different_lengths_is_unavailable() {
        let real = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean_absolute_scaled_error(&real, &[1.0], 2), None);
        assert_eq!(mean_absolute_scaled_error(&real, &[1.0, 2.0, 3.0], 1), None);
        assert_eq!(mean_absolute_scaled_error(&real[..1], &real, 2), None);
    }

    #[test]
    fn mase_of_a_perfect_naive_forecast_is_unavailable() {
        let real = [2.0, 2.0, 2.0];
        let predicted = [1.0, 1.0, 1.0];
        assert_eq!(mean_absolute_scaled_error(&real, &predicted, 1), None);
    }

    #[test]
    fn mase_by_lead_time_uses_days_as_period() {
        let temps = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 2.0]
            .into_iter()
            .chain(std::iter::repeat_n(2.0, DAY));
        let start = 1_575_082_800;
        let data: Vec<AlignedRecord> = temps
            .enumerate()
            .map(|(i, temp)| {
                let forecasts = if i < 9 && i % 2 == 1 {
                    [3.0, 1.0, 4.0, 5.0, 3.0]
                } else {
                    [4.0, 3.0, 2.0, 1.0, 1.0]
                };
                aligned(temp, start + STEP_SECONDS * i as i64, forecasts)
            })
            .collect();
        assert_eq!(data.len(), 17);

        let mase = mase_by_lead_time(&data, DAY).unwrap();
        assert_eq!(mase[..3], [None, None, None]);
        assert_eq!(mase[3], Some(1.0));
        assert_close(mase[4].unwrap(), 2.25);
    }

    #[test]
    fn zero_day_factor_leaves_mase_unavailable() {
        let data = vec![
            aligned(1.0, 100, [4.0, 3.0, 2.0, 1.0, 1.0]),
            aligned(2.0, 200, [3.0, 1.0, 4.0, 5.0, 3.0]),
        ];
        assert!(mase_by_lead_time(&data, 0).is_err());

        let report = precision(&data, 0).unwrap();
        assert_eq!(report.mae, [2.0, 1.5, 1.5, 1.5, 0.5]);
        assert_eq!(report.mase, [None; 5]);
        assert_eq!(report.mase1y, [None; 5]);
    }

    /// Leap year 2020 (with Feb 29 set to 5) followed by two months of 2021 at 2.
    fn leap_year_series(with_feb_29: bool) -> Vec<AlignedRecord> {
        // 2020-01-01T00:00:00Z
        let start = 1_577_836_800;
        let days = 366 + 59;
        (0..days * DAY)
            .filter_map(|i| {
                let ts = start + STEP_SECONDS * i as i64;
                let date = utc_date(ts).unwrap();
                let feb_29 = date == NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
                if feb_29 && !with_feb_29 {
                    return None;
                }
                let temp = if feb_29 {
                    5.0
                } else if date.year() == 2020 {
                    1.0
                } else {
                    2.0
                };
                Some(aligned(temp, ts, [1.0; 5]))
            })
            .collect()
    }

    #[test]
    fn mase_one_year_skips_feb_29() {
        let with_leap_day = leap_year_series(true);
        let without_leap_day = leap_year_series(false);
        assert_eq!(with_leap_day.len() - without_leap_day.len(), DAY);

        let mase1y = mase_one_year(&with_leap_day, DAY).unwrap();
        assert_eq!(mase1y, [Some(1.0); 5]);
        assert_eq!(mase1y, mase_one_year(&without_leap_day, DAY).unwrap());
    }

    #[test]
    fn mase_one_year_needs_a_year_of_history() {
        let series: Vec<AlignedRecord> = leap_year_series(false)
            .into_iter()
            .take(DAYS_PER_YEAR * DAY)
            .collect();
        assert_eq!(mase_one_year(&series, DAY).unwrap(), [None; 5]);
    }

    #[test]
    fn year_average_baseline() {
        // 2021-03-01T00:00:00Z and 2021-03-01T03:00:00Z
        let ts = [1_614_556_800, 1_614_567_600];
        let data = vec![
            aligned(10.0, ts[0], [12.0, 11.0, 10.0, 10.0, 10.0]),
            aligned(12.0, ts[1], [12.0, 11.0, 14.0, 12.0, 12.0]),
        ];
        let mut history = HashMap::new();
        for (t, values) in ts.iter().zip([[8.0, 10.0], [13.0, 15.0]]) {
            history.insert(n_years_ago(*t, 1).unwrap(), values[0]);
            history.insert(n_years_ago(*t, 2).unwrap(), values[1]);
        }

        // naive forecasts 9.0 and 14.0: naive mae 1.5
        let mase = mase_year_average(&data, &history, 2);
        assert_eq!(
            mase,
            [Some(2.0 / 3.0), Some(1.0 / 1.5), Some(1.0 / 1.5), Some(0.0), Some(0.0)]
        );

        history.remove(&n_years_ago(ts[1], 2).unwrap());
        assert_eq!(mase_year_average(&data, &history, 2), [None; 5]);
    }

    #[test]
    fn precision_is_repeatable() {
        let data = leap_year_series(true);
        let first = precision(&data, DAY).unwrap();
        let second = precision(&data, DAY).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.mase1y, [Some(1.0); 5]);
    }
}
