//! Platform store contract
//!
//! Request and response objects exchanged with the health-data store, and the
//! [`HealthStore`] / [`HealthStoreProvider`] traits a host implements to plug a
//! real store behind the bridge.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BridgeError;
use crate::types::{Record, RecordType};
use crate::units::{Mass, Pressure};

/// Time window for reads and aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRangeFilter {
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    After {
        start: DateTime<Utc>,
    },
    Before {
        end: DateTime<Utc>,
    },
}

impl TimeRangeFilter {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeRangeFilter::Between { start, .. } | TimeRangeFilter::After { start } => {
                Some(*start)
            }
            TimeRangeFilter::Before { .. } => None,
        }
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeRangeFilter::Between { end, .. } | TimeRangeFilter::Before { end } => Some(*end),
            TimeRangeFilter::After { .. } => None,
        }
    }

    /// Half-open `[start, end)` membership for an instant
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start().map_or(true, |start| instant >= start)
            && self.end().map_or(true, |end| instant < end)
    }

    /// Whether the interval `[start, end)` intersects the window
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start().map_or(true, |s| end > s) && self.end().map_or(true, |e| start < e)
    }
}

/// Native aggregate metrics, named by their wire result key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    StepsCountTotal,
    HeartRateBpmAvg,
    HeartRateBpmMax,
    HeartRateBpmMin,
    HeartRateMeasurementsCount,
    RestingHeartRateBpmAvg,
    RestingHeartRateBpmMax,
    RestingHeartRateBpmMin,
    WeightAvg,
    WeightMax,
    WeightMin,
    SystolicAvg,
    SystolicMin,
    SystolicMax,
    DiastolicAvg,
    DiastolicMin,
    DiastolicMax,
    SleepDurationTotal,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::StepsCountTotal => "COUNT_TOTAL",
            Metric::HeartRateBpmAvg | Metric::RestingHeartRateBpmAvg => "BPM_AVG",
            Metric::HeartRateBpmMax | Metric::RestingHeartRateBpmMax => "BPM_MAX",
            Metric::HeartRateBpmMin | Metric::RestingHeartRateBpmMin => "BPM_MIN",
            Metric::HeartRateMeasurementsCount => "MEASUREMENTS_COUNT",
            Metric::WeightAvg => "WEIGHT_AVG",
            Metric::WeightMax => "WEIGHT_MAX",
            Metric::WeightMin => "WEIGHT_MIN",
            Metric::SystolicAvg => "SYSTOLIC_AVG",
            Metric::SystolicMin => "SYSTOLIC_MIN",
            Metric::SystolicMax => "SYSTOLIC_MAX",
            Metric::DiastolicAvg => "DIASTOLIC_AVG",
            Metric::DiastolicMin => "DIASTOLIC_MIN",
            Metric::DiastolicMax => "DIASTOLIC_MAX",
            Metric::SleepDurationTotal => "SLEEP_DURATION_TOTAL",
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Metric::StepsCountTotal => RecordType::Steps,
            Metric::HeartRateBpmAvg
            | Metric::HeartRateBpmMax
            | Metric::HeartRateBpmMin
            | Metric::HeartRateMeasurementsCount => RecordType::HeartRate,
            Metric::RestingHeartRateBpmAvg
            | Metric::RestingHeartRateBpmMax
            | Metric::RestingHeartRateBpmMin => RecordType::RestingHeartRate,
            Metric::WeightAvg | Metric::WeightMax | Metric::WeightMin => RecordType::Weight,
            Metric::SystolicAvg
            | Metric::SystolicMin
            | Metric::SystolicMax
            | Metric::DiastolicAvg
            | Metric::DiastolicMin
            | Metric::DiastolicMax => RecordType::BloodPressure,
            Metric::SleepDurationTotal => RecordType::SleepSession,
        }
    }
}

/// Typed value reported for a metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Long(i64),
    Mass(Mass),
    Pressure(Pressure),
    Duration(Duration),
}

/// Store answer to an aggregate request. Metrics without data are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    values: HashMap<Metric, MetricValue>,
    pub data_origins: Vec<String>,
}

impl AggregationResult {
    pub fn new(data_origins: Vec<String>) -> Self {
        Self {
            values: HashMap::new(),
            data_origins,
        }
    }

    pub fn insert(&mut self, metric: Metric, value: MetricValue) {
        self.values.insert(metric, value);
    }

    pub fn with(mut self, metric: Metric, value: MetricValue) -> Self {
        self.insert(metric, value);
        self
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.values.get(&metric)
    }

    pub fn get_long(&self, metric: Metric) -> Option<i64> {
        match self.get(metric)? {
            MetricValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_mass(&self, metric: Metric) -> Option<Mass> {
        match self.get(metric)? {
            MetricValue::Mass(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_pressure(&self, metric: Metric) -> Option<Pressure> {
        match self.get(metric)? {
            MetricValue::Pressure(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_duration(&self, metric: Metric) -> Option<Duration> {
        match self.get(metric)? {
            MetricValue::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecordsRequest {
    pub record_type: RecordType,
    pub time_range_filter: TimeRangeFilter,
    pub data_origin_filter: Vec<String>,
    pub ascending_order: bool,
    pub page_size: usize,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRecordsResponse {
    pub records: Vec<Record>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub metrics: Vec<Metric>,
    pub time_range_filter: TimeRangeFilter,
    pub data_origin_filter: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateGroupByDurationRequest {
    pub metrics: Vec<Metric>,
    pub time_range_filter: TimeRangeFilter,
    pub data_origin_filter: Vec<String>,
    /// Fixed bucket length
    pub slicer: Duration,
}

/// One fixed-length bucket of a grouped aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResultGroupedByDuration {
    pub result: AggregationResult,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesTokenRequest {
    pub record_types: Vec<RecordType>,
    pub data_origin_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsertion(Record),
    Deletion { record_id: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesResponse {
    pub changes: Vec<Change>,
    pub next_changes_token: String,
    pub has_more: bool,
    pub changes_token_expired: bool,
}

/// Wire result of `revokeAllPermissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllPermissionsResponse {
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Availability of the platform health SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkStatus {
    Unavailable,
    ProviderUpdateRequired,
    Available,
}

impl SdkStatus {
    pub fn code(&self) -> i32 {
        match self {
            SdkStatus::Unavailable => 1,
            SdkStatus::ProviderUpdateRequired => 2,
            SdkStatus::Available => 3,
        }
    }
}

/// A permission-gated health-data store
pub trait HealthStore: Send + Sync {
    fn read_records(&self, request: &ReadRecordsRequest) -> Result<ReadRecordsResponse, BridgeError>;

    fn read_record(&self, record_type: RecordType, id: &str) -> Result<Record, BridgeError>;

    /// Insert records, returning the ids the store assigned
    fn insert_records(&self, records: Vec<Record>) -> Result<Vec<String>, BridgeError>;

    fn delete_records(&self, record_type: RecordType, ids: &[String]) -> Result<(), BridgeError>;

    fn aggregate(&self, request: &AggregateRequest) -> Result<AggregationResult, BridgeError>;

    fn aggregate_group_by_duration(
        &self,
        request: &AggregateGroupByDurationRequest,
    ) -> Result<Vec<AggregationResultGroupedByDuration>, BridgeError>;

    fn get_changes_token(&self, request: &ChangesTokenRequest) -> Result<String, BridgeError>;

    fn get_changes(&self, token: &str) -> Result<ChangesResponse, BridgeError>;

    /// Granted platform permission strings
    fn get_granted_permissions(&self) -> Result<Vec<String>, BridgeError>;

    fn revoke_all_permissions(&self) -> Result<RevokeAllPermissionsResponse, BridgeError>;
}

/// Host side of the platform SDK: availability, client creation and settings screens
pub trait HealthStoreProvider: Send + Sync {
    type Store: HealthStore;

    fn sdk_status(&self, provider_package: &str) -> SdkStatus;

    fn create_client(&self, provider_package: &str) -> Result<Arc<Self::Store>, BridgeError>;

    fn open_settings(&self) -> Result<(), BridgeError>;

    fn open_data_management(&self, provider_package: Option<&str>) -> Result<(), BridgeError>;
}
