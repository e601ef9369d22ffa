pub mod align;
pub mod calendar;
pub mod error;
pub mod load;
pub mod metrics;
pub mod quality;
pub mod report;
pub mod structs;

// Re-export public API
pub use align::{Alignment, align, align_table};
pub use calendar::remove_feb_29;
pub use error::{PipelineError, Result};
pub use load::{
    CsvDirectory, OutputPaths, read_observations, write_aligned_csv, write_aligned_parquet,
    write_metrics_csv, write_summary_json,
};
pub use metrics::{mean_absolute_scaled_error, precision};
pub use report::{Analysis, PrecisionReport, TableSource, VariableReport};
pub use structs::{
    AlignedRecord, AnalysisConfig, CityTables, DateRange, Failure, LeadTimePolicy, Metric,
    MetricsReport, ObservationRecord, ObservationTable, SimpleLogger, WeatherRow,
    WeatherVariable,
};
