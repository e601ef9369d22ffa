use crate::align::align_table;
use crate::error::{PipelineError, Result};
use crate::metrics::precision;
use crate::quality::select_rows;
use crate::structs::{
    AlignedRecord, AnalysisConfig, CityTables, Failure, MetricsReport, WeatherVariable,
};
use log::{debug, error, info};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Provides the recorded tables of a city.
pub trait TableSource {
    fn load(&self, city: &str) -> Result<CityTables>;
}

/// Aligned table and metrics of one city and weather variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableReport {
    pub aligned: Vec<AlignedRecord>,
    pub metrics: MetricsReport,
    /// Actual records skipped as malformed during alignment
    pub alignment_failures: usize,
}

pub type CityReport = BTreeMap<WeatherVariable, VariableReport>;

/// Everything one run produced, plus everything it had to skip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub cities: BTreeMap<String, CityReport>,
    pub failures: Vec<Failure>,
}

impl Analysis {
    pub fn report(&self, city: &str, variable: WeatherVariable) -> Option<&VariableReport> {
        self.cities.get(city)?.get(&variable)
    }
}

/// Runs the alignment and metrics of every configured city and weather variable.
pub struct PrecisionReport {
    config: AnalysisConfig,
}

impl PrecisionReport {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyses every configured city.
    ///
    /// A city whose tables cannot be loaded, or a weather variable whose metrics
    /// cannot be computed, is recorded in [`Analysis::failures`] and skipped;
    /// the rest of the run is unaffected. Cities run on the rayon pool when
    /// `parallel` is set, otherwise one after the other.
    pub fn analyse<S: TableSource + Sync>(&self, source: &S) -> Analysis {
        let run_city = |city: &String| {
            let outcome = source
                .load(city)
                .map(|tables| self.analyse_city(city, &tables));
            (city.clone(), outcome)
        };

        let outcomes: Vec<(String, Result<(CityReport, Vec<Failure>)>)> = if self.config.parallel {
            self.config.cities.par_iter().map(run_city).collect()
        } else {
            self.config.cities.iter().map(run_city).collect()
        };

        let mut analysis = Analysis::default();
        for (city, outcome) in outcomes {
            match outcome {
                Ok((report, failures)) => {
                    analysis.cities.insert(city, report);
                    analysis.failures.extend(failures);
                }
                Err(e) => {
                    error!("Error while processing {}: {}", city, e);
                    analysis.failures.push(Failure::new(city, e));
                }
            }
        }

        info!(
            "Analysed {} of {} cities with {} failures",
            analysis.cities.len(),
            self.config.cities.len(),
            analysis.failures.len()
        );
        analysis
    }

    /// Analyses every configured weather variable of one city.
    pub fn analyse_city(&self, city: &str, tables: &CityTables) -> (CityReport, Vec<Failure>) {
        let actual = match &self.config.date_range {
            Some(range) => {
                let restricted = tables.actual.between(range);
                debug!(
                    "{}: {} of {} actual rows between {} and {}",
                    city,
                    restricted.len(),
                    tables.actual.len(),
                    range.from,
                    range.to
                );
                restricted
            }
            None => tables.actual.clone(),
        };
        let tables = CityTables {
            actual,
            forecast: tables.forecast.clone(),
        };

        let mut report = CityReport::new();
        let mut failures = Vec::new();
        for &variable in &self.config.variables {
            let key = format!("{}/{}", city, variable);
            match self.analyse_variable(&tables, variable) {
                Ok((variable_report, record_failures)) => {
                    failures.extend(record_failures.into_iter().map(|f| Failure {
                        key: format!("{}/{}", key, f.key),
                        reason: f.reason,
                    }));
                    report.insert(variable, variable_report);
                }
                Err(e) => {
                    error!("Error while processing {} for {}: {}", variable, city, e);
                    failures.push(Failure::new(key, e));
                }
            }
        }
        (report, failures)
    }

    fn analyse_variable(
        &self,
        tables: &CityTables,
        variable: WeatherVariable,
    ) -> Result<(VariableReport, Vec<Failure>)> {
        let alignment = align_table(
            &tables.actual,
            &tables.forecast,
            variable,
            self.config.lead_time_policy,
        );
        let aligned = select_rows(&alignment.records, &self.config.row_intervals);
        if aligned.is_empty() {
            return Err(PipelineError::Data(format!(
                "no {} values with five forecasts",
                variable
            )));
        }
        let metrics = precision(&aligned, self.config.day_factor)?;

        let report = VariableReport {
            aligned,
            metrics,
            alignment_failures: alignment.failures.len(),
        };
        Ok((report, alignment.failures))
    }
}
