//! Per-record-type codecs
//!
//! Each record type has one codec translating between platform records and the
//! wire format. Aggregation, native bucketing and manual bucketing are optional
//! capabilities: a codec exposes the ones it supports through the accessor
//! methods on [`RecordCodec`], and callers check before invoking.

mod blood_pressure;
mod body_temperature;
mod heart_rate;
mod hrv;
mod resting_heart_rate;
mod sleep_session;
mod steps;
mod weight;

pub use blood_pressure::BloodPressureCodec;
pub use body_temperature::BodyTemperatureCodec;
pub use heart_rate::HeartRateCodec;
pub use hrv::HeartRateVariabilityCodec;
pub use resting_heart_rate::RestingHeartRateCodec;
pub use sleep_session::SleepSessionCodec;
pub use steps::StepsCodec;
pub use weight::WeightCodec;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::envelope::{
    parse_bucket_period, parse_time_range_filter, AggregateOptions, BucketEnvelope, BucketOptions,
    LocalZone,
};
use crate::error::BridgeError;
use crate::platform::{
    AggregateGroupByDurationRequest, AggregateRequest, AggregationResult,
    AggregationResultGroupedByDuration, Metric,
};
use crate::types::{Record, RecordType};

/// Translation between platform records and the wire format for one type
pub trait RecordCodec: Send + Sync {
    fn record_type(&self) -> RecordType;

    /// Legacy short tag used in bucketed envelopes
    fn result_type(&self) -> &'static str;

    /// Wire record to platform record, for insertion
    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError>;

    /// Platform record to wire record, metadata included
    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError>;

    fn aggregation(&self) -> Option<&dyn AggregateCodec> {
        None
    }

    fn native_buckets(&self) -> Option<&dyn BucketCodec> {
        None
    }

    fn manual_buckets(&self) -> Option<&dyn ManualBucketCodec> {
        None
    }
}

/// Native aggregation over a time range
pub trait AggregateCodec: RecordCodec {
    fn metrics(&self) -> &'static [Metric];

    /// Every declared metric is present in the output; missing data reads as zero
    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value;

    fn get_aggregate_request(&self, options: &AggregateOptions) -> Result<AggregateRequest, BridgeError> {
        Ok(AggregateRequest {
            metrics: self.metrics().to_vec(),
            time_range_filter: parse_time_range_filter(options.time_range_filter.as_ref())?,
            data_origin_filter: options.data_origin_filter.clone(),
        })
    }
}

/// Native duration-bucketed aggregation
pub trait BucketCodec: RecordCodec {
    fn bucket_metrics(&self) -> &'static [Metric];

    /// Formatted value for one bucket, `None` when the bucket lacks data
    fn bucket_value(&self, result: &AggregationResult, options: &BucketOptions) -> Option<String>;

    fn get_bucketed_request(
        &self,
        options: &BucketOptions,
    ) -> Result<AggregateGroupByDurationRequest, BridgeError> {
        Ok(AggregateGroupByDurationRequest {
            metrics: self.bucket_metrics().to_vec(),
            time_range_filter: parse_time_range_filter(options.time_range_filter.as_ref())?,
            data_origin_filter: options.data_origin_filter.clone(),
            slicer: parse_bucket_period(options.bucket_period.as_deref())?,
        })
    }

    /// One envelope per populated bucket, in store order. Empty buckets are skipped.
    fn parse_bucketed_result(
        &self,
        buckets: &[AggregationResultGroupedByDuration],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Vec<BucketEnvelope> {
        buckets
            .iter()
            .filter_map(|bucket| {
                let value = self.bucket_value(&bucket.result, options)?;
                Some(BucketEnvelope::at(
                    &bucket.start_time,
                    zone,
                    self.result_type(),
                    value,
                ))
            })
            .collect()
    }
}

/// Bucketing computed from raw records
pub trait ManualBucketCodec: RecordCodec {
    fn parse_manually_bucketed_result(
        &self,
        records: &[Record],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError>;
}

pub(crate) fn mismatch(expected: RecordType, record: &Record) -> BridgeError {
    BridgeError::InvalidRecordType(format!(
        "expected {expected} record, got {}",
        record.record_type()
    ))
}

/// Borrow the typed payloads out of a record slice, rejecting foreign types
pub(crate) fn typed_records<'a, T>(
    records: &'a [Record],
    expected: RecordType,
    pick: impl Fn(&'a Record) -> Option<&'a T>,
) -> Result<Vec<&'a T>, BridgeError> {
    records
        .iter()
        .map(|record| pick(record).ok_or_else(|| mismatch(expected, record)))
        .collect()
}

/// Reject intervals that end before they start
pub(crate) fn ordered_interval(
    what: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), BridgeError> {
    if end < start {
        return Err(BridgeError::invalid_argument(format!(
            "{what} endTime must not be before startTime"
        )));
    }
    Ok(())
}

pub(crate) fn long_or_zero(result: &AggregationResult, metric: Metric) -> f64 {
    result.get_long(metric).unwrap_or(0) as f64
}
