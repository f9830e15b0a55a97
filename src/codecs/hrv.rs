//! Heart rate variability (RMSSD) codec

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{mismatch, typed_records, ManualBucketCodec, RecordCodec};
use crate::bucketing::{group_by_day, mean};
use crate::envelope::{format_instant, format_number, BucketEnvelope, BucketOptions, LocalZone};
use crate::error::BridgeError;
use crate::types::{HeartRateVariabilityRmssdRecord, Metadata, Record, RecordType};

pub struct HeartRateVariabilityCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHeartRateVariability {
    time: DateTime<Utc>,
    heart_rate_variability_millis: f64,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for HeartRateVariabilityCodec {
    fn record_type(&self) -> RecordType {
        RecordType::HeartRateVariabilityRmssd
    }

    fn result_type(&self) -> &'static str {
        "HEART_RATE_VARIABILITY"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireHeartRateVariability::deserialize(wire)?;
        Ok(Record::HeartRateVariabilityRmssd(
            HeartRateVariabilityRmssdRecord {
                time: wire.time,
                heart_rate_variability_millis: wire.heart_rate_variability_millis,
                metadata: Metadata::from_wire(wire.metadata.as_ref()),
            },
        ))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::HeartRateVariabilityRmssd(r) = record else {
            return Err(mismatch(RecordType::HeartRateVariabilityRmssd, record));
        };
        Ok(json!({
            "time": format_instant(&r.time),
            "heartRateVariabilityMillis": r.heart_rate_variability_millis,
            "metadata": r.metadata.to_wire(),
        }))
    }

    fn manual_buckets(&self) -> Option<&dyn ManualBucketCodec> {
        Some(self)
    }
}

impl ManualBucketCodec for HeartRateVariabilityCodec {
    fn parse_manually_bucketed_result(
        &self,
        records: &[Record],
        _options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        let readings = typed_records(records, RecordType::HeartRateVariabilityRmssd, |r| match r {
            Record::HeartRateVariabilityRmssd(hrv) => Some(hrv),
            _ => None,
        })?;

        Ok(group_by_day(&readings, |r| r.time, zone)
            .into_iter()
            .map(|(day, readings)| {
                let avg = mean(readings.iter().map(|r| r.heart_rate_variability_millis));
                BucketEnvelope::new(day, self.result_type(), format_number(avg))
            })
            .collect())
    }
}
