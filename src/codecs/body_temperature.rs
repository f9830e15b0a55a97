//! Body temperature codec
//!
//! No native aggregation. Daily buckets average the readings in celsius, or in
//! fahrenheit when the caller asks for `"fahrenheit"`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{mismatch, typed_records, ManualBucketCodec, RecordCodec};
use crate::bucketing::{group_by_day, mean};
use crate::envelope::{format_instant, format_number, BucketEnvelope, BucketOptions, LocalZone};
use crate::error::BridgeError;
use crate::types::{BodyTemperatureRecord, Metadata, Record, RecordType};
use crate::units::{self, Temperature};

pub struct BodyTemperatureCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBodyTemperature {
    time: DateTime<Utc>,
    #[serde(default)]
    temperature: Option<Value>,
    #[serde(default)]
    measurement_location: i32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for BodyTemperatureCodec {
    fn record_type(&self) -> RecordType {
        RecordType::BodyTemperature
    }

    fn result_type(&self) -> &'static str {
        "BODY_TEMPERATURE"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireBodyTemperature::deserialize(wire)?;
        Ok(Record::BodyTemperature(BodyTemperatureRecord {
            time: wire.time,
            temperature: units::decode::<Temperature>(wire.temperature.as_ref())?,
            measurement_location: wire.measurement_location,
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::BodyTemperature(r) = record else {
            return Err(mismatch(RecordType::BodyTemperature, record));
        };
        Ok(json!({
            "time": format_instant(&r.time),
            "measurementLocation": r.measurement_location,
            "temperature": units::encode(Some(&r.temperature)),
            "metadata": r.metadata.to_wire(),
        }))
    }

    fn manual_buckets(&self) -> Option<&dyn ManualBucketCodec> {
        Some(self)
    }
}

impl ManualBucketCodec for BodyTemperatureCodec {
    fn parse_manually_bucketed_result(
        &self,
        records: &[Record],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        let readings = typed_records(records, RecordType::BodyTemperature, |r| match r {
            Record::BodyTemperature(t) => Some(t),
            _ => None,
        })?;
        let in_unit = |t: &Temperature| match options.unit.as_deref() {
            Some("fahrenheit") => t.in_fahrenheit(),
            _ => t.in_celsius(),
        };

        Ok(group_by_day(&readings, |r| r.time, zone)
            .into_iter()
            .map(|(day, readings)| {
                let avg = mean(readings.iter().map(|r| in_unit(&r.temperature)));
                BucketEnvelope::new(day, self.result_type(), format_number(avg))
            })
            .collect())
    }
}
