//! Weight codec
//!
//! Bucketed values are reported in kilograms unless the caller asks for
//! `"pound"`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{mismatch, AggregateCodec, BucketCodec, RecordCodec};
use crate::envelope::{format_instant, format_number, BucketOptions};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{Metadata, Record, RecordType, WeightRecord};
use crate::units::{self, Mass};

pub struct WeightCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireWeight {
    time: DateTime<Utc>,
    #[serde(default)]
    weight: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for WeightCodec {
    fn record_type(&self) -> RecordType {
        RecordType::Weight
    }

    fn result_type(&self) -> &'static str {
        "WEIGHT"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireWeight::deserialize(wire)?;
        Ok(Record::Weight(WeightRecord {
            time: wire.time,
            weight: units::decode::<Mass>(wire.weight.as_ref())?,
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::Weight(r) = record else {
            return Err(mismatch(RecordType::Weight, record));
        };
        Ok(json!({
            "time": format_instant(&r.time),
            "weight": units::encode(Some(&r.weight)),
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

impl AggregateCodec for WeightCodec {
    fn metrics(&self) -> &'static [Metric] {
        &[Metric::WeightAvg, Metric::WeightMax, Metric::WeightMin]
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        json!({
            "WEIGHT_AVG": units::encode(result.get_mass(Metric::WeightAvg).as_ref()),
            "WEIGHT_MAX": units::encode(result.get_mass(Metric::WeightMax).as_ref()),
            "WEIGHT_MIN": units::encode(result.get_mass(Metric::WeightMin).as_ref()),
            "dataOrigins": result.data_origins,
        })
    }
}

impl BucketCodec for WeightCodec {
    fn bucket_metrics(&self) -> &'static [Metric] {
        &[Metric::WeightAvg]
    }

    fn bucket_value(&self, result: &AggregationResult, options: &BucketOptions) -> Option<String> {
        let avg = result.get_mass(Metric::WeightAvg)?;
        let value = match options.unit.as_deref() {
            Some("pound") => avg.in_pounds(),
            _ => avg.in_kilograms(),
        };
        Some(format_number(value))
    }
}
