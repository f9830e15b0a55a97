//! Heart rate codec

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{long_or_zero, mismatch, ordered_interval, AggregateCodec, BucketCodec, RecordCodec};
use crate::envelope::{format_instant, BucketOptions};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{HeartRateRecord, HeartRateSample, Metadata, Record, RecordType};

pub struct HeartRateCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSample {
    time: DateTime<Utc>,
    beats_per_minute: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHeartRate {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    samples: Vec<WireSample>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for HeartRateCodec {
    fn record_type(&self) -> RecordType {
        RecordType::HeartRate
    }

    fn result_type(&self) -> &'static str {
        "HEART"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireHeartRate::deserialize(wire)?;
        ordered_interval("HeartRate", wire.start_time, wire.end_time)?;
        Ok(Record::HeartRate(HeartRateRecord {
            start_time: wire.start_time,
            end_time: wire.end_time,
            samples: wire
                .samples
                .into_iter()
                .map(|s| HeartRateSample {
                    time: s.time,
                    beats_per_minute: s.beats_per_minute as i64,
                })
                .collect(),
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::HeartRate(r) = record else {
            return Err(mismatch(RecordType::HeartRate, record));
        };
        let samples: Vec<Value> = r
            .samples
            .iter()
            .map(|s| {
                json!({
                    "time": format_instant(&s.time),
                    "beatsPerMinute": s.beats_per_minute as f64,
                })
            })
            .collect();

        Ok(json!({
            "startTime": format_instant(&r.start_time),
            "endTime": format_instant(&r.end_time),
            "samples": samples,
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

impl AggregateCodec for HeartRateCodec {
    fn metrics(&self) -> &'static [Metric] {
        &[
            Metric::HeartRateBpmAvg,
            Metric::HeartRateBpmMax,
            Metric::HeartRateBpmMin,
            Metric::HeartRateMeasurementsCount,
        ]
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        json!({
            "BPM_AVG": long_or_zero(result, Metric::HeartRateBpmAvg),
            "BPM_MAX": long_or_zero(result, Metric::HeartRateBpmMax),
            "BPM_MIN": long_or_zero(result, Metric::HeartRateBpmMin),
            "MEASUREMENTS_COUNT": long_or_zero(result, Metric::HeartRateMeasurementsCount),
            "dataOrigins": result.data_origins,
        })
    }
}

impl BucketCodec for HeartRateCodec {
    fn bucket_metrics(&self) -> &'static [Metric] {
        &[
            Metric::HeartRateBpmAvg,
            Metric::HeartRateBpmMax,
            Metric::HeartRateBpmMin,
        ]
    }

    /// `min/avg/max`, only when all three are reported
    fn bucket_value(&self, result: &AggregationResult, _options: &BucketOptions) -> Option<String> {
        let min = result.get_long(Metric::HeartRateBpmMin)?;
        let avg = result.get_long(Metric::HeartRateBpmAvg)?;
        let max = result.get_long(Metric::HeartRateBpmMax)?;
        Some(format!("{min}/{avg}/{max}"))
    }
}
