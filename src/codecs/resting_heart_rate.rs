//! Resting heart rate codec

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{long_or_zero, mismatch, AggregateCodec, BucketCodec, RecordCodec};
use crate::envelope::{format_instant, BucketOptions};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{Metadata, Record, RecordType, RestingHeartRateRecord};

pub struct RestingHeartRateCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRestingHeartRate {
    time: DateTime<Utc>,
    beats_per_minute: f64,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for RestingHeartRateCodec {
    fn record_type(&self) -> RecordType {
        RecordType::RestingHeartRate
    }

    fn result_type(&self) -> &'static str {
        "RESTING_HEART_RATE"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireRestingHeartRate::deserialize(wire)?;
        Ok(Record::RestingHeartRate(RestingHeartRateRecord {
            time: wire.time,
            beats_per_minute: wire.beats_per_minute as i64,
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::RestingHeartRate(r) = record else {
            return Err(mismatch(RecordType::RestingHeartRate, record));
        };
        Ok(json!({
            "time": format_instant(&r.time),
            "beatsPerMinute": r.beats_per_minute as f64,
            "metadata": r.metadata.to_wire(),
        }))
    }

    fn aggregation(&self) -> Option<&dyn AggregateCodec> {
        Some(self)
    }

    fn native_buckets(&self) -> Option<&dyn BucketCodec> {
        Some(self)
    }
}

impl AggregateCodec for RestingHeartRateCodec {
    fn metrics(&self) -> &'static [Metric] {
        &[
            Metric::RestingHeartRateBpmAvg,
            Metric::RestingHeartRateBpmMax,
            Metric::RestingHeartRateBpmMin,
        ]
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        json!({
            "BPM_AVG": long_or_zero(result, Metric::RestingHeartRateBpmAvg),
            "BPM_MAX": long_or_zero(result, Metric::RestingHeartRateBpmMax),
            "BPM_MIN": long_or_zero(result, Metric::RestingHeartRateBpmMin),
            "dataOrigins": result.data_origins,
        })
    }
}

impl BucketCodec for RestingHeartRateCodec {
    fn bucket_metrics(&self) -> &'static [Metric] {
        &[Metric::RestingHeartRateBpmAvg]
    }

    fn bucket_value(&self, result: &AggregationResult, _options: &BucketOptions) -> Option<String> {
        result
            .get_long(Metric::RestingHeartRateBpmAvg)
            .map(|avg| avg.to_string())
    }
}
