//! health-bridge CLI - run bridge operations over a file of wire records
//!
//! Records are loaded into an in-memory store, then read, aggregated or
//! bucketed exactly as the app runtime would see them.
//!
//! Commands:
//! - read: Read one page of records
//! - aggregate: Aggregate a record type over a time range
//! - bucket: Daily buckets for a record type
//! - expand: Expand a quantity into every unit of its kind
//! - types: List supported record types

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_health_bridge::{
    expand_quantity, BridgeConfig, BridgeError, HealthConnectBridge, LocalZone, MemoryStoreProvider,
    QuantityKind, RecordTypeRegistry, VERSION,
};

/// Health bridge - translate and bucket health records
#[derive(Parser)]
#[command(name = "health-bridge")]
#[command(author = "Synheart AI Inc")]
#[command(version = VERSION)]
#[command(about = "Read, aggregate and bucket health records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one page of records
    Read {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Record type (e.g. Steps, SleepSession)
        #[arg(short = 't', long)]
        record_type: String,

        /// Records per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Page token from a previous read
        #[arg(long)]
        page_token: Option<String>,

        /// Newest first
        #[arg(long)]
        descending: bool,

        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Aggregate a record type over a time range
    Aggregate {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Record type (e.g. Steps, Weight)
        #[arg(short = 't', long)]
        record_type: String,

        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Daily buckets for a record type
    Bucket {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Record type (e.g. HeartRate, BloodPressure)
        #[arg(short = 't', long)]
        record_type: String,

        /// Output unit (kg/pound for weight, celsius/fahrenheit for temperature)
        #[arg(long)]
        unit: Option<String>,

        /// Bucket period
        #[arg(long, default_value = "day")]
        period: String,

        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Expand a quantity into every unit of its kind
    Expand {
        /// Quantity kind (mass, temperature, pressure, length, volume, energy,
        /// velocity, power, bloodGlucose)
        kind: String,

        value: f64,

        unit: String,

        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// List supported record types
    Types {
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// JSON array of wire records, each with a recordType (use - for stdin)
    #[arg(short, long)]
    records: PathBuf,

    /// Local zone as seconds east of UTC; host local time when omitted
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,
}

#[derive(Args)]
struct RangeArgs {
    /// Range start (RFC 3339)
    #[arg(long)]
    start: Option<String>,

    /// Range end (RFC 3339), exclusive
    #[arg(long)]
    end: Option<String>,
}

impl RangeArgs {
    fn to_wire(&self) -> Result<Value, CliFailure> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Ok(json!({
                "operator": "between", "startTime": start, "endTime": end
            })),
            (Some(start), None) => Ok(json!({ "operator": "after", "startTime": start })),
            (None, Some(end)) => Ok(json!({ "operator": "before", "endTime": end })),
            (None, None) => Err(CliFailure::MissingRange),
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    match cli.command {
        Commands::Read {
            store,
            range,
            record_type,
            page_size,
            page_token,
            descending,
            output_format,
        } => {
            let bridge = load_bridge(&store)?;
            let mut options = json!({
                "timeRangeFilter": range.to_wire()?,
                "ascendingOrder": !descending,
            });
            if let Some(page_size) = page_size {
                options["pageSize"] = json!(page_size);
            }
            if let Some(page_token) = page_token {
                options["pageToken"] = json!(page_token);
            }
            let page = bridge.read_records(&record_type, &options)?;
            print_output(&page, &output_format)
        }
        Commands::Aggregate {
            store,
            range,
            record_type,
            output_format,
        } => {
            let bridge = load_bridge(&store)?;
            let result = bridge.aggregate_record(&json!({
                "recordType": record_type,
                "timeRangeFilter": range.to_wire()?,
            }))?;
            print_output(&result, &output_format)
        }
        Commands::Bucket {
            store,
            range,
            record_type,
            unit,
            period,
            output_format,
        } => {
            let bridge = load_bridge(&store)?;
            let mut options = json!({
                "timeRangeFilter": range.to_wire()?,
                "bucketPeriod": period,
            });
            if let Some(unit) = unit {
                options["unit"] = json!(unit);
            }
            let buckets = bridge.read_bucketed_records(&record_type, &options)?;
            print_output(&buckets, &output_format)
        }
        Commands::Expand {
            kind,
            value,
            unit,
            output_format,
        } => {
            let kind: QuantityKind = kind.parse()?;
            let expanded = expand_quantity(kind, Some(&json!({ "value": value, "unit": unit })))?;
            print_output(&expanded, &output_format)
        }
        Commands::Types { output_format } => {
            let registry = RecordTypeRegistry::standard();
            let mut types = Vec::new();
            for record_type in registry.record_types() {
                let name = record_type.wire_name();
                types.push(json!({
                    "recordType": name,
                    "resultType": registry.result_type(name)?,
                    "bucketing": registry.bucketing_mode(name)?.as_str(),
                }));
            }
            print_output(&Value::Array(types), &output_format)
        }
    }
}

fn load_bridge(args: &StoreArgs) -> Result<HealthConnectBridge<MemoryStoreProvider>, CliFailure> {
    let zone = match args.utc_offset {
        Some(seconds) => {
            LocalZone::from_offset_seconds(seconds).ok_or(CliFailure::BadOffset(seconds))?
        }
        None => LocalZone::System,
    };

    let records = match serde_json::from_str::<Value>(&read_input(&args.records)?)? {
        Value::Array(records) => records,
        _ => return Err(CliFailure::NotAnArray),
    };

    let bridge = HealthConnectBridge::new(MemoryStoreProvider::default())
        .with_config(BridgeConfig::default().with_zone(zone));
    bridge.initialize(None)?;
    let ids = bridge.insert_records(&records)?;
    log::info!("loaded {} records from {}", ids.len(), args.records.display());
    Ok(bridge)
}

fn read_input(path: &Path) -> Result<String, CliFailure> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_output(value: &Value, format: &OutputFormat) -> Result<(), CliFailure> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{rendered}");
    Ok(())
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Json(serde_json::Error),
    Bridge(BridgeError),
    NotAnArray,
    MissingRange,
    BadOffset(i32),
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

impl From<BridgeError> for CliFailure {
    fn from(e: BridgeError) -> Self {
        CliFailure::Bridge(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::Bridge(e) => {
                let hint = match &e {
                    BridgeError::InvalidRecordType(_) => {
                        Some("Run 'health-bridge types' for supported record types".to_string())
                    }
                    BridgeError::AggregationNotSupported(_) => {
                        Some("Use 'bucket' for types without native aggregation".to_string())
                    }
                    _ => None,
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
            CliFailure::NotAnArray => CliError {
                code: "NOT_AN_ARRAY".to_string(),
                message: "Records file must hold a JSON array".to_string(),
                hint: Some("Wrap records in [ ... ]".to_string()),
            },
            CliFailure::MissingRange => CliError {
                code: "MISSING_RANGE".to_string(),
                message: "A time range is required".to_string(),
                hint: Some("Pass --start and/or --end".to_string()),
            },
            CliFailure::BadOffset(seconds) => CliError {
                code: "BAD_OFFSET".to_string(),
                message: format!("UTC offset out of range: {seconds}"),
                hint: Some("Use seconds east of UTC, e.g. -18000".to_string()),
            },
        }
    }
}
