use chrono::NaiveDate;
use log::{Log, Metadata, Record as LogRecord};
use serde::Serialize;

/// Lead times in report order: oldest forecast (t5) first, most recent (t1) last.
pub const LEAD_TIMES: [u32; 5] = [5, 4, 3, 2, 1];

/// Number of observations per day on the 3-hour grid.
pub const DEFAULT_DAY_FACTOR: usize = 8;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_CITIES: [&str; 5] = ["london", "madrid", "saopaulo", "sydney", "newyork"];

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &LogRecord) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// A metric value, or `None` when it cannot be computed (e.g. not enough history
/// for the naive baseline).
pub type Metric = Option<f64>;

/// Weather variables recorded for every city
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum WeatherVariable {
    Temp,
    Pressure,
    Humidity,
    #[value(name = "wind_speed")]
    WindSpeed,
    #[value(name = "wind_deg")]
    WindDeg,
}

impl WeatherVariable {
    pub const ALL: [WeatherVariable; 5] = [
        WeatherVariable::Temp,
        WeatherVariable::Pressure,
        WeatherVariable::Humidity,
        WeatherVariable::WindSpeed,
        WeatherVariable::WindDeg,
    ];

    /// Column name used in the input and output CSV files.
    pub fn column(&self) -> &'static str {
        match self {
            WeatherVariable::Temp => "temp",
            WeatherVariable::Pressure => "pressure",
            WeatherVariable::Humidity => "humidity",
            WeatherVariable::WindSpeed => "wind_speed",
            WeatherVariable::WindDeg => "wind_deg",
        }
    }

    fn pick(&self, row: &WeatherRow) -> Option<f64> {
        match self {
            WeatherVariable::Temp => row.temp,
            WeatherVariable::Pressure => row.pressure,
            WeatherVariable::Humidity => row.humidity,
            WeatherVariable::WindSpeed => row.wind_speed,
            WeatherVariable::WindDeg => row.wind_deg,
        }
    }
}

impl std::fmt::Display for WeatherVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One row of a weather or forecast table, all variables at once.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRow {
    pub temp: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_deg: Option<f64>,
    /// POSIX timestamp (UTC) the values pertain to
    pub dt: i64,
    /// Date the row was captured on
    pub today: NaiveDate,
}

/// Inclusive range of capture dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Either the actual weather table or the forecast table of a city.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    pub rows: Vec<WeatherRow>,
}

impl ObservationTable {
    pub fn new(rows: Vec<WeatherRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Narrows the table to a single variable. Missing cells become NaN values.
    pub fn series(&self, variable: WeatherVariable) -> Vec<ObservationRecord> {
        self.rows
            .iter()
            .map(|row| ObservationRecord {
                value: variable.pick(row).unwrap_or(f64::NAN),
                timestamp: row.dt,
                captured_on: row.today,
            })
            .collect()
    }

    /// Keeps the rows captured within `range`.
    pub fn between(&self, range: &DateRange) -> ObservationTable {
        ObservationTable {
            rows: self
                .rows
                .iter()
                .filter(|row| range.contains(row.today))
                .cloned()
                .collect(),
        }
    }
}

/// Actual and forecast tables of one city
#[derive(Debug, Clone, Default)]
pub struct CityTables {
    pub actual: ObservationTable,
    pub forecast: ObservationTable,
}

/// A single measured or forecast value of one weather variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRecord {
    pub value: f64,
    pub timestamp: i64,
    pub captured_on: NaiveDate,
}

/// An actual value joined with the five forecasts made for its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignedRecord {
    pub value: f64,
    #[serde(rename = "dt")]
    pub timestamp: i64,
    #[serde(rename = "today")]
    pub captured_on: NaiveDate,
    pub t5: f64,
    pub t4: f64,
    pub t3: f64,
    pub t2: f64,
    pub t1: f64,
}

impl AlignedRecord {
    /// Builds a record from the actual observation and the forecasts ordered t5..t1.
    pub fn new(actual: &ObservationRecord, forecasts: [f64; 5]) -> Self {
        let [t5, t4, t3, t2, t1] = forecasts;
        Self {
            value: actual.value,
            timestamp: actual.timestamp,
            captured_on: actual.captured_on,
            t5,
            t4,
            t3,
            t2,
            t1,
        }
    }

    /// Forecast made `lead` days ahead. Panics on a lead outside 1..=5.
    pub fn forecast(&self, lead: u32) -> f64 {
        match lead {
            5 => self.t5,
            4 => self.t4,
            3 => self.t3,
            2 => self.t2,
            1 => self.t1,
            _ => panic!("lead time out of range: {}", lead),
        }
    }

    pub fn forecasts(&self) -> [f64; 5] {
        [self.t5, self.t4, self.t3, self.t2, self.t1]
    }
}

/// Accuracy metrics of one city and weather variable, each array ordered t5..t1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub mae: [f64; 5],
    pub rmse: [f64; 5],
    pub medae: [f64; 5],
    pub mase: [Metric; 5],
    pub mase1y: [Metric; 5],
}

/// One row of the metrics table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsRow {
    pub lead_time: u32,
    pub mae: f64,
    pub rmse: f64,
    pub medae: f64,
    pub mase: Metric,
    pub mase1y: Metric,
}

impl MetricsReport {
    pub fn rows(&self) -> Vec<MetricsRow> {
        LEAD_TIMES
            .iter()
            .enumerate()
            .map(|(i, &lead_time)| MetricsRow {
                lead_time,
                mae: self.mae[i],
                rmse: self.rmse[i],
                medae: self.medae[i],
                mase: self.mase[i],
                mase1y: self.mase1y[i],
            })
            .collect()
    }
}

/// Something that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub key: String,
    pub reason: String,
}

impl Failure {
    pub fn new(key: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// How the five forecasts of a timestamp are labelled t5..t1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LeadTimePolicy {
    /// By position after sorting on capture date
    #[default]
    Positional,
    /// By the day offset between capture dates, which must cover 1..=5
    Offset,
}

/// Configuration of an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub cities: Vec<String>,
    pub variables: Vec<WeatherVariable>,
    pub day_factor: usize,
    pub date_range: Option<DateRange>,
    /// Row-position slices applied in turn to every aligned table
    pub row_intervals: Vec<(usize, usize)>,
    pub lead_time_policy: LeadTimePolicy,
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            variables: WeatherVariable::ALL.to_vec(),
            day_factor: DEFAULT_DAY_FACTOR,
            date_range: None,
            row_intervals: Vec::new(),
            lead_time_policy: LeadTimePolicy::Positional,
            parallel: false,
        }
    }
}
