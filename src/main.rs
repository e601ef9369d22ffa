use clap::Parser;
use forecast_precision::quality::{assess, contiguous_intervals};
use forecast_precision::structs::{DATE_FORMAT, DEFAULT_CITIES, DEFAULT_DAY_FACTOR};
use forecast_precision::{
    AnalysisConfig, CsvDirectory, DateRange, LeadTimePolicy, OutputPaths, PipelineError,
    PrecisionReport, SimpleLogger, TableSource, WeatherVariable, write_aligned_csv,
    write_aligned_parquet, write_metrics_csv, write_summary_json,
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding weather_<city>.csv and forecast_<city>.csv files
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Output base name (results are written under ./output/<name>)
    #[arg(short, long, default_value = "output")]
    output: String,

    /// Cities to analyse (e.g., london,madrid). Defaults to all known cities.
    #[arg(short, long, value_delimiter = ',')]
    cities: Vec<String>,

    /// Weather variables to analyse. Defaults to all of them.
    #[arg(long, value_delimiter = ',')]
    variables: Vec<WeatherVariable>,

    /// First capture date (inclusive, YYYY-MM-DD) of the actual values to analyse
    #[arg(long, requires = "to_date", value_parser = parse_date)]
    from_date: Option<NaiveDate>,

    /// Last capture date (inclusive, YYYY-MM-DD) of the actual values to analyse
    #[arg(long, requires = "from_date", value_parser = parse_date)]
    to_date: Option<NaiveDate>,

    /// Row slice START:END of the aligned table, applied in order when repeated
    #[arg(long = "rows", value_parser = parse_interval)]
    row_intervals: Vec<(usize, usize)>,

    /// How the five forecasts of a timestamp are labelled t5..t1
    #[arg(long, default_value = "positional")]
    lead_time_policy: LeadTimePolicy,

    /// Number of observations per day
    #[arg(long, default_value_t = DEFAULT_DAY_FACTOR)]
    day_factor: usize,

    /// Analyse cities in parallel
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Log a data quality summary of every city
    #[arg(long, default_value_t = false)]
    quality: bool,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn parse_interval(s: &str) -> Result<(usize, usize), String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", s))?;
    let start = start.parse::<usize>().map_err(|e| e.to_string())?;
    let end = end.parse::<usize>().map_err(|e| e.to_string())?;
    if end < start {
        return Err(format!("END must not be smaller than START in '{}'", s));
    }
    Ok((start, end))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD, got '{}': {}", s, e))
}

fn main() -> Result<(), PipelineError> {
    // Initialize timer and logger
    let total_start = Instant::now();
    log::set_logger(&LOGGER)
        .map_err(|e| PipelineError::Data(format!("cannot install logger: {}", e)))?;

    // Acquire CLI args
    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    let date_range = match (args.from_date, args.to_date) {
        (Some(from), Some(to)) => Some(DateRange { from, to }),
        _ => None,
    };
    let cities = if args.cities.is_empty() {
        DEFAULT_CITIES.iter().map(|c| c.to_string()).collect()
    } else {
        args.cities.clone()
    };
    let variables = if args.variables.is_empty() {
        WeatherVariable::ALL.to_vec()
    } else {
        args.variables.clone()
    };

    println!("Forecast precision analysis");
    debug!(
        "Input directory: {} | Cities: {} | Variables: {:?}",
        args.input_dir.display(),
        cities.join(","),
        variables
    );
    if let Some(range) = &date_range {
        debug!("Date range: {} to {}", range.from, range.to);
    }
    if !args.row_intervals.is_empty() {
        debug!("Row intervals: {:?}", args.row_intervals);
    }

    let config = AnalysisConfig {
        cities,
        variables,
        day_factor: args.day_factor,
        date_range,
        row_intervals: args.row_intervals.clone(),
        lead_time_policy: args.lead_time_policy,
        parallel: args.parallel,
    };
    let source = CsvDirectory::new(&args.input_dir);

    // Align and compute metrics
    println!("Starting analysis...");
    let processing_start = Instant::now();
    let precision_report = PrecisionReport::new(config);
    let analysis = precision_report.analyse(&source);
    let processing_time = processing_start.elapsed();
    println!(
        "Analysis completed in {:.2?} | {} cities, {} failures",
        processing_time,
        analysis.cities.len(),
        analysis.failures.len()
    );
    for failure in &analysis.failures {
        warn!("Skipped {}: {}", failure.key, failure.reason);
    }

    if args.quality {
        for (city, report) in &analysis.cities {
            match source.load(city) {
                Ok(tables) => {
                    let config = precision_report.config();
                    let quality = assess(
                        &tables,
                        config.date_range,
                        &config.variables,
                        config.lead_time_policy,
                    );
                    info!(
                        "{}: {} missing and {} unexpected actual datapoints, {} days without forecasts",
                        city,
                        quality.missing_actuals,
                        quality.unexpected_actuals,
                        quality.days_without_forecasts.len()
                    );
                    for (variable, count) in &quality.unaligned {
                        info!("{}/{}: {} datapoints without five forecasts", city, variable, count);
                    }
                }
                Err(e) => warn!("Cannot assess data quality of {}: {}", city, e),
            }
            for (variable, variable_report) in report {
                for interval in contiguous_intervals(&variable_report.aligned) {
                    info!("{}/{}: {}", city, variable, interval);
                }
            }
        }
    }

    // Create output directory
    let output_dir = PathBuf::from(format!("./output/{}", args.output));
    fs::create_dir_all(&output_dir)?;
    println!(
        "Created output directory: {} | Writing output files...",
        output_dir.display()
    );
    let io_start = Instant::now();

    for (city, report) in &analysis.cities {
        for (variable, variable_report) in report {
            let paths = OutputPaths::new(&output_dir, city, *variable);
            if let Some(dir) = paths.join_csv.parent() {
                fs::create_dir_all(dir)?;
            }
            write_aligned_csv(&variable_report.aligned, *variable, &paths.join_csv)?;
            write_metrics_csv(&variable_report.metrics, &paths.metrics_csv)?;
            write_aligned_parquet(&variable_report.aligned, &paths.join_parquet)?;
            debug!("  - {}", paths.join_csv.display());
            debug!("  - {}", paths.metrics_csv.display());
            debug!("  - {}", paths.join_parquet.display());
        }
    }

    let summary_path = output_dir.join("summary.json");
    write_summary_json(&analysis, &summary_path)?;
    debug!("  - {}", summary_path.display());

    let io_time = io_start.elapsed();
    println!("All files took {:.2?}", io_time);
    println!("\nWrote files to directory: {}", output_dir.display());

    let total_time = total_start.elapsed();
    println!("Pipeline completed successfully in {:.2?}", total_time);
    debug!(
        "Performance breakdown: Processing={:.1}%, IO={:.1}%",
        (processing_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0,
        (io_time.as_secs_f64() / total_time.as_secs_f64()) * 100.0
    );
    Ok(())
}
