//! Request/response envelope helpers
//!
//! Typed views over the wire option objects, time-range and bucket-period
//! parsing, day keys, local-time formatting, and the `{dateKey, entry}` shape
//! emitted by bucketed reads.

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDateTime, Offset, SecondsFormat, Timelike, Utc,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;
use crate::platform::TimeRangeFilter;

/// Family tag carried by every bucketed entry
pub const FAMILY: &str = "HEALTH";

/// Zone used for day keys and local wall-clock strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalZone {
    /// Host local time
    #[default]
    System,
    Fixed(FixedOffset),
}

impl LocalZone {
    pub fn utc() -> Self {
        LocalZone::Fixed(Utc.fix())
    }

    /// `None` when the offset is out of range (beyond ±24h)
    pub fn from_offset_seconds(seconds: i32) -> Option<Self> {
        FixedOffset::east_opt(seconds).map(LocalZone::Fixed)
    }

    pub fn local_datetime(&self, instant: &DateTime<Utc>) -> NaiveDateTime {
        match self {
            LocalZone::System => instant.with_timezone(&Local).naive_local(),
            LocalZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

// ============================================================================
// Wire options
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTimeRangeFilter {
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadRecordsOptions {
    pub time_range_filter: Option<WireTimeRangeFilter>,
    pub data_origin_filter: Vec<String>,
    pub ascending_order: Option<bool>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateOptions {
    pub record_type: Option<String>,
    pub time_range_filter: Option<WireTimeRangeFilter>,
    pub data_origin_filter: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketOptions {
    pub time_range_filter: Option<WireTimeRangeFilter>,
    pub data_origin_filter: Vec<String>,
    pub bucket_period: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangesOptions {
    pub changes_token: Option<String>,
    pub record_types: Vec<String>,
    pub data_origin_filters: Vec<String>,
}

/// Deserialize an options object; `null` reads as all defaults
pub fn parse_options<T: DeserializeOwned + Default>(value: &Value) -> Result<T, BridgeError> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(T::deserialize(value)?)
}

pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, BridgeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BridgeError::invalid_argument(format!("Invalid timestamp '{value}': {e}")))
}

pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Build a store filter from the wire shape.
///
/// `after` needs `startTime`, `before` needs `endTime`, anything else (including
/// an absent operator) is read as `between` and needs both.
pub fn parse_time_range_filter(
    filter: Option<&WireTimeRangeFilter>,
) -> Result<TimeRangeFilter, BridgeError> {
    let filter =
        filter.ok_or_else(|| BridgeError::invalid_argument("Time range filter should be provided"))?;

    let bound = |value: &Option<String>, name: &str| -> Result<DateTime<Utc>, BridgeError> {
        let raw = value.as_deref().ok_or_else(|| {
            BridgeError::invalid_argument(format!("Time range filter is missing {name}"))
        })?;
        parse_instant(raw)
    };

    match filter.operator.as_deref() {
        Some("after") => Ok(TimeRangeFilter::After {
            start: bound(&filter.start_time, "startTime")?,
        }),
        Some("before") => Ok(TimeRangeFilter::Before {
            end: bound(&filter.end_time, "endTime")?,
        }),
        _ => Ok(TimeRangeFilter::Between {
            start: bound(&filter.start_time, "startTime")?,
            end: bound(&filter.end_time, "endTime")?,
        }),
    }
}

/// Bucket length for grouped reads. Only daily buckets exist.
pub fn parse_bucket_period(period: Option<&str>) -> Result<Duration, BridgeError> {
    match period {
        None | Some("") | Some("day") => Ok(Duration::days(1)),
        Some(other) => Err(BridgeError::invalid_argument(format!(
            "Invalid period type: {other}"
        ))),
    }
}

/// Sleep-day cutoff: the wall-clock hour written in the filter's `startTime`
pub fn cutoff_hour(options: &BucketOptions) -> Result<u32, BridgeError> {
    let start = options
        .time_range_filter
        .as_ref()
        .and_then(|f| f.start_time.as_deref())
        .ok_or_else(|| BridgeError::invalid_argument("Time range filter startTime is required"))?;

    let written = DateTime::parse_from_rfc3339(start)
        .map_err(|e| BridgeError::invalid_argument(format!("Invalid timestamp '{start}': {e}")))?;
    Ok(written.hour())
}

// ============================================================================
// Keys and formatting
// ============================================================================

/// `YYYYMMDD` of the instant in the given zone
pub fn format_date_key(instant: &DateTime<Utc>, zone: &LocalZone) -> String {
    zone.local_datetime(instant).format("%Y%m%d").to_string()
}

/// Day key where local hours past `cutoff` roll into the next day
pub fn format_sleep_date_key(instant: &DateTime<Utc>, cutoff: u32, zone: &LocalZone) -> String {
    let local = zone.local_datetime(instant);
    let date = if local.hour() > cutoff {
        local.date() + Duration::days(1)
    } else {
        local.date()
    };
    date.format("%Y%m%d").to_string()
}

/// `YYYY-MM-DD HH:mm:ss.SSS` wall-clock time
pub fn format_local_string(instant: &DateTime<Utc>, zone: &LocalZone) -> String {
    zone.local_datetime(instant)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// At most two decimals, ties to even, no trailing zeros
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Whole seconds as `H:MM`
pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}:{minutes:02}")
}

// ============================================================================
// Result envelope
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesInBed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_bed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_of_bed_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepTimes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fell_asleep_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub woke_up_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub value: String,
    pub family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub times_in_bed: Option<TimesInBed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_times: Option<SleepTimes>,
}

/// `{dateKey, entry: {type, value, family}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEnvelope {
    pub date_key: String,
    pub entry: BucketEntry,
}

impl BucketEnvelope {
    pub fn new(date_key: impl Into<String>, entry_type: &str, value: impl Into<String>) -> Self {
        Self {
            date_key: date_key.into(),
            entry: BucketEntry {
                entry_type: entry_type.to_string(),
                value: value.into(),
                family: FAMILY.to_string(),
                times_in_bed: None,
                sleep_times: None,
            },
        }
    }

    /// Envelope keyed by the local day of `instant`
    pub fn at(instant: &DateTime<Utc>, zone: &LocalZone, entry_type: &str, value: String) -> Self {
        Self::new(format_date_key(instant, zone), entry_type, value)
    }
}
