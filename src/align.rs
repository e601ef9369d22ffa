use crate::error::{PipelineError, Result};
use crate::structs::{
    AlignedRecord, Failure, LeadTimePolicy, ObservationRecord, ObservationTable, WeatherVariable,
};
use log::{debug, error};
use std::collections::HashMap;

/// Number of forecasts (one per lead time) an actual value needs to be aligned.
pub const FORECASTS_PER_TIMESTAMP: usize = 5;

/// Result of aligning one weather variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alignment {
    pub records: Vec<AlignedRecord>,
    /// Actual records skipped because their data was malformed
    pub failures: Vec<Failure>,
}

/// Joins every actual value with the five forecasts made for its timestamp.
///
/// Actual records with a missing (NaN) value are dropped. Records whose timestamp
/// does not have exactly five forecasts, or whose forecasts include a missing
/// value, are discarded without further notice; duplicated captures are not
/// merged, so six forecasts for one timestamp also discard the record. Output order follows the input order of `actual`.
///
/// With [`LeadTimePolicy::Positional`] the forecasts sorted by capture date
/// ascending become t5..t1. With [`LeadTimePolicy::Offset`] each forecast is
/// keyed by the number of days between its capture date and the actual's.
///
/// A record whose forecasts cannot be labelled is reported in
/// [`Alignment::failures`] and alignment continues with the next record.
pub fn align(
    actual: &[ObservationRecord],
    forecast: &[ObservationRecord],
    policy: LeadTimePolicy,
) -> Alignment {
    let forecasts_by_dt = index_by_timestamp(forecast);
    let mut alignment = Alignment::default();
    let mut missing_values = 0;
    let mut incomplete = 0;

    for record in actual {
        if record.value.is_nan() {
            missing_values += 1;
            continue;
        }

        let group = match forecasts_by_dt.get(&record.timestamp) {
            Some(group)
                if group.len() == FORECASTS_PER_TIMESTAMP
                    && !group.iter().any(|f| f.value.is_nan()) =>
            {
                group
            }
            _ => {
                incomplete += 1;
                continue;
            }
        };

        match label_forecasts(record, group, policy) {
            Ok(forecasts) => alignment
                .records
                .push(AlignedRecord::new(record, forecasts)),
            Err(e) => {
                error!("Error while aligning record {:?}: {}", record, e);
                alignment.failures.push(Failure::new(
                    format!("dt={} today={}", record.timestamp, record.captured_on),
                    e,
                ));
            }
        }
    }

    debug!(
        "Aligned {} of {} records ({} missing values, {} without five usable forecasts, {} malformed)",
        alignment.records.len(),
        actual.len(),
        missing_values,
        incomplete,
        alignment.failures.len()
    );
    alignment
}

/// Aligns one variable of a city's actual and forecast tables.
pub fn align_table(
    actual: &ObservationTable,
    forecast: &ObservationTable,
    variable: WeatherVariable,
    policy: LeadTimePolicy,
) -> Alignment {
    debug!(
        "Aligning {} over {} actual and {} forecast rows",
        variable,
        actual.len(),
        forecast.len()
    );
    align(&actual.series(variable), &forecast.series(variable), policy)
}

/// Groups forecasts by timestamp, each group sorted by capture date ascending.
/// The sort is stable, so equal capture dates keep their input order.
fn index_by_timestamp(forecast: &[ObservationRecord]) -> HashMap<i64, Vec<&ObservationRecord>> {
    let mut index: HashMap<i64, Vec<&ObservationRecord>> = HashMap::new();
    for record in forecast {
        index.entry(record.timestamp).or_default().push(record);
    }
    for group in index.values_mut() {
        group.sort_by_key(|r| r.captured_on);
    }
    index
}

/// Returns the forecast values ordered t5..t1.
fn label_forecasts(
    actual: &ObservationRecord,
    group: &[&ObservationRecord],
    policy: LeadTimePolicy,
) -> Result<[f64; 5]> {
    if let Some(bad) = group.iter().find(|f| f.value.is_infinite()) {
        return Err(PipelineError::Data(format!(
            "forecast captured on {} is not finite ({})",
            bad.captured_on, bad.value
        )));
    }

    match policy {
        LeadTimePolicy::Positional => Ok(std::array::from_fn(|i| group[i].value)),
        LeadTimePolicy::Offset => {
            let mut slots: [Option<f64>; 5] = [None; 5];
            for f in group {
                let lead = (actual.captured_on - f.captured_on).num_days();
                if !(1..=5).contains(&lead) {
                    return Err(PipelineError::Data(format!(
                        "forecast captured on {} is {} days ahead of {}",
                        f.captured_on, lead, actual.captured_on
                    )));
                }
                // t5 first
                let slot = &mut slots[(5 - lead) as usize];
                if slot.is_some() {
                    return Err(PipelineError::Data(format!(
                        "more than one forecast with lead time {} days",
                        lead
                    )));
                }
                *slot = Some(f.value);
            }
            // five forecasts with distinct leads in 1..=5 fill every slot
            Ok(slots.map(|v| v.unwrap_or(f64::NAN)))
        }
    }
}
