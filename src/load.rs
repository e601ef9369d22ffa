use crate::error::{PipelineError, Result};
use crate::report::{Analysis, TableSource};
use crate::structs::{
    AlignedRecord, CityTables, DATE_FORMAT, Failure, Metric, MetricsReport, MetricsRow,
    ObservationTable, WeatherRow, WeatherVariable,
};
use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::NaiveDate;
use csv::{Reader, Writer};
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Row layout of `weather_<city>.csv` and `forecast_<city>.csv`
#[derive(Debug, Deserialize)]
struct CsvRow {
    temp: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    wind_deg: Option<f64>,
    dt: f64,
    today: String,
}

/// Reads a weather or forecast CSV file.
///
/// Empty numeric cells are read as missing values. `dt` may be written as a
/// float as long as it holds an integral number of seconds.
///
/// # Arguments
/// * `path` - Path of the CSV file to read
///
/// # Returns
/// Returns the table's rows in file order.
///
/// # Errors
/// Returns error if the file cannot be read or a row cannot be parsed; the
/// message names the offending line.
pub fn read_observations(path: &Path) -> Result<ObservationTable> {
    debug!("Reading CSV file: {}", path.display());
    let mut reader = Reader::from_path(path)?;
    let mut rows = Vec::new();

    for (i, result) in reader.deserialize::<CsvRow>().enumerate() {
        let raw = result?;
        // header is line 1
        let line = i + 2;
        if raw.dt.fract() != 0.0 || !raw.dt.is_finite() {
            return Err(PipelineError::Data(format!(
                "{} line {}: dt {} is not a whole number of seconds",
                path.display(),
                line,
                raw.dt
            )));
        }
        let today = NaiveDate::parse_from_str(&raw.today, DATE_FORMAT).map_err(|e| {
            PipelineError::Data(format!(
                "{} line {}: invalid date '{}': {}",
                path.display(),
                line,
                raw.today,
                e
            ))
        })?;

        rows.push(WeatherRow {
            temp: raw.temp,
            pressure: raw.pressure,
            humidity: raw.humidity,
            wind_speed: raw.wind_speed,
            wind_deg: raw.wind_deg,
            dt: raw.dt as i64,
            today,
        });
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(ObservationTable::new(rows))
}

/// Directory holding `weather_<city>.csv` and `forecast_<city>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    pub dir: PathBuf,
}

impl CsvDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn weather_path(&self, city: &str) -> PathBuf {
        self.dir.join(format!("weather_{}.csv", city))
    }

    pub fn forecast_path(&self, city: &str) -> PathBuf {
        self.dir.join(format!("forecast_{}.csv", city))
    }
}

impl TableSource for CsvDirectory {
    fn load(&self, city: &str) -> Result<CityTables> {
        Ok(CityTables {
            actual: read_observations(&self.weather_path(city))?,
            forecast: read_observations(&self.forecast_path(city))?,
        })
    }
}

/// Where the artifacts of one city and weather variable are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub join_csv: PathBuf,
    pub metrics_csv: PathBuf,
    pub join_parquet: PathBuf,
}

impl OutputPaths {
    /// Files under `<output_dir>/<variable>/`.
    pub fn new(output_dir: &Path, city: &str, variable: WeatherVariable) -> Self {
        let dir = output_dir.join(variable.column());
        Self {
            join_csv: dir.join(format!("join_{}.csv", city)),
            metrics_csv: dir.join(format!("metrics_{}.csv", city)),
            join_parquet: dir.join(format!("join_{}.parquet", city)),
        }
    }
}

/// Writes an aligned table to a CSV file.
///
/// The header starts with the variable's column name, followed by
/// `dt,today,t5,t4,t3,t2,t1`.
///
/// # Arguments
/// * `records` - Slice of AlignedRecord structs, one per aligned timestamp
/// * `variable` - Weather variable the records hold, used to name the value column
/// * `output_path` - Path where the CSV file will be created
///
/// # Returns
/// Returns `Ok(())` on success.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_aligned_csv(
    records: &[AlignedRecord],
    variable: WeatherVariable,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record([variable.column(), "dt", "today", "t5", "t4", "t3", "t2", "t1"])?;

    for record in records {
        writer.write_record(&[
            record.value.to_string(),
            record.timestamp.to_string(),
            record.captured_on.format(DATE_FORMAT).to_string(),
            record.t5.to_string(),
            record.t4.to_string(),
            record.t3.to_string(),
            record.t2.to_string(),
            record.t1.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes a metrics table to a CSV file: one row per lead time, t5 first.
///
/// Unavailable metrics are written as empty cells.
///
/// # Arguments
/// * `report` - Metrics of one city and weather variable
/// * `output_path` - Path where the CSV file will be created
///
/// # Returns
/// Returns `Ok(())` on success.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_metrics_csv(report: &MetricsReport, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(["mae", "rmse", "medae", "mase", "mase1y"])?;

    for row in report.rows() {
        writer.write_record(&[
            row.mae.to_string(),
            row.rmse.to_string(),
            row.medae.to_string(),
            format_metric(row.mase),
            format_metric(row.mase1y),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn format_metric(metric: Metric) -> String {
    metric.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes an aligned table to a Parquet file using Arrow format.
///
/// # Arguments
/// * `records` - Slice of AlignedRecord structs, one per aligned timestamp
/// * `output_path` - Path where the Parquet file will be created
///
/// # Returns
/// Returns `Ok(())` on success.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_aligned_parquet(records: &[AlignedRecord], output_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("value", DataType::Float64, false),
        Field::new("dt", DataType::Int64, false),
        Field::new("today", DataType::Utf8, false),
        Field::new("t5", DataType::Float64, false),
        Field::new("t4", DataType::Float64, false),
        Field::new("t3", DataType::Float64, false),
        Field::new("t2", DataType::Float64, false),
        Field::new("t1", DataType::Float64, false),
    ]));

    let values: Float64Array = records.iter().map(|r| r.value).collect();
    let dts: Int64Array = records.iter().map(|r| r.timestamp).collect();
    let days: StringArray = StringArray::from_iter_values(
        records
            .iter()
            .map(|r| r.captured_on.format(DATE_FORMAT).to_string()),
    );
    let t5: Float64Array = records.iter().map(|r| r.t5).collect();
    let t4: Float64Array = records.iter().map(|r| r.t4).collect();
    let t3: Float64Array = records.iter().map(|r| r.t3).collect();
    let t2: Float64Array = records.iter().map(|r| r.t2).collect();
    let t1: Float64Array = records.iter().map(|r| r.t1).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(values),
            Arc::new(dts),
            Arc::new(days),
            Arc::new(t5),
            Arc::new(t4),
            Arc::new(t3),
            Arc::new(t2),
            Arc::new(t1),
        ],
    )?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

/// Per-variable entry of the run summary
#[derive(Debug, Clone, Serialize)]
pub struct VariableSummary {
    pub rows: usize,
    pub alignment_failures: usize,
    pub metrics: Vec<MetricsRow>,
}

/// Run summary written as `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub cities: BTreeMap<String, BTreeMap<WeatherVariable, VariableSummary>>,
    pub failures: Vec<Failure>,
}

impl From<&Analysis> for Summary {
    fn from(analysis: &Analysis) -> Self {
        let cities = analysis
            .cities
            .iter()
            .map(|(city, report)| {
                let variables = report
                    .iter()
                    .map(|(variable, r)| {
                        let summary = VariableSummary {
                            rows: r.aligned.len(),
                            alignment_failures: r.alignment_failures,
                            metrics: r.metrics.rows(),
                        };
                        (*variable, summary)
                    })
                    .collect();
                (city.clone(), variables)
            })
            .collect();

        Summary {
            cities,
            failures: analysis.failures.clone(),
        }
    }
}

/// Writes the run summary to a pretty-formatted JSON file.
///
/// Unavailable metrics are written as `null`.
///
/// # Arguments
/// * `analysis` - Results and failures of one run
/// * `output_path` - Path where the JSON file will be created
///
/// # Returns
/// Returns `Ok(())` on success.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_summary_json(analysis: &Analysis, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, &Summary::from(analysis))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn aligned_rows() -> Vec<AlignedRecord> {
        let day = NaiveDate::from_ymd_opt(2019, 11, 30).unwrap();
        vec![
            AlignedRecord {
                value: 0.5,
                timestamp: 100,
                captured_on: day,
                t5: 4.0,
                t4: 1.5,
                t3: 2.0,
                t2: 3.0,
                t1: 1.0,
            },
            AlignedRecord {
                value: 0.6,
                timestamp: 200,
                captured_on: day,
                t5: 1.0,
                t4: 4.0,
                t3: 2.0,
                t2: 3.0,
                t1: 5.0,
            },
        ]
    }

    #[test]
    fn reads_rows_with_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_madrid.csv");
        fs::write(
            &path,
            "temp,pressure,humidity,wind_speed,wind_deg,dt,today\n\
             0.5,1010,80,3.1,,100,2019-11-30\n\
             ,1011,81,3.2,200,200.0,2019-11-30\n",
        )
        .unwrap();

        let table = read_observations(&path).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].temp, Some(0.5));
        assert_eq!(table.rows[0].wind_deg, None);
        assert_eq!(table.rows[1].temp, None);
        assert_eq!(table.rows[1].dt, 200);
        assert_eq!(table.rows[1].today, NaiveDate::from_ymd_opt(2019, 11, 30).unwrap());
    }

    #[test]
    fn rejects_bad_dates_and_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let header = "temp,pressure,humidity,wind_speed,wind_deg,dt,today\n";

        let bad_date = dir.path().join("bad_date.csv");
        fs::write(&bad_date, format!("{}1,1,1,1,1,100,30/11/2019\n", header)).unwrap();
        let err = read_observations(&bad_date).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let bad_dt = dir.path().join("bad_dt.csv");
        fs::write(&bad_dt, format!("{}1,1,1,1,1,100.5,2019-11-30\n", header)).unwrap();
        assert!(matches!(
            read_observations(&bad_dt),
            Err(PipelineError::Data(_))
        ));
    }

    #[test]
    fn csv_directory_loads_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let header = "temp,pressure,humidity,wind_speed,wind_deg,dt,today\n";
        fs::write(
            dir.path().join("weather_london.csv"),
            format!("{}1,1,1,1,1,100,2019-11-30\n", header),
        )
        .unwrap();
        fs::write(
            dir.path().join("forecast_london.csv"),
            format!("{}2,1,1,1,1,100,2019-11-29\n2,1,1,1,1,100,2019-11-28\n", header),
        )
        .unwrap();

        let source = CsvDirectory::new(dir.path());
        let tables = source.load("london").unwrap();
        assert_eq!(tables.actual.len(), 1);
        assert_eq!(tables.forecast.len(), 2);
        assert!(source.load("paris").is_err());
    }

    #[test]
    fn writes_aligned_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("join_madrid.csv");
        write_aligned_csv(&aligned_rows(), WeatherVariable::Temp, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "temp,dt,today,t5,t4,t3,t2,t1");
        assert_eq!(lines[1], "0.5,100,2019-11-30,4,1.5,2,3,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn writes_metrics_with_empty_cells_for_unavailable_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics_madrid.csv");
        let report = MetricsReport {
            mae: [2.0, 1.5, 1.5, 1.5, 0.5],
            rmse: [1.0; 5],
            medae: [2.0, 1.5, 1.5, 1.5, 0.5],
            mase: [None, None, None, Some(1.0), Some(2.25)],
            mase1y: [None; 5],
        };
        write_metrics_csv(&report, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "mae,rmse,medae,mase,mase1y");
        assert_eq!(lines[1], "2,1,2,,");
        assert_eq!(lines[5], "0.5,1,0.5,2.25,");
    }

    #[test]
    fn writes_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("join_madrid.parquet");
        write_aligned_parquet(&aligned_rows(), &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn output_paths_are_grouped_by_variable() {
        let paths = OutputPaths::new(Path::new("out"), "sydney", WeatherVariable::WindSpeed);
        assert_eq!(paths.join_csv, Path::new("out/wind_speed/join_sydney.csv"));
        assert_eq!(paths.metrics_csv, Path::new("out/wind_speed/metrics_sydney.csv"));
        assert_eq!(
            paths.join_parquet,
            Path::new("out/wind_speed/join_sydney.parquet")
        );
    }
}
