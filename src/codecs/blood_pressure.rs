//! Blood pressure codec
//!
//! The store aggregates the six systolic/diastolic stats natively but cannot
//! bucket them, so daily buckets are averaged here as `"systolic/diastolic"`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{mismatch, typed_records, AggregateCodec, ManualBucketCodec, RecordCodec};
use crate::bucketing::{group_by_day, mean};
use crate::envelope::{format_instant, format_number, BucketEnvelope, BucketOptions, LocalZone};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{BloodPressureRecord, Metadata, Record, RecordType};
use crate::units::{self, Pressure};

pub struct BloodPressureCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBloodPressure {
    time: DateTime<Utc>,
    #[serde(default)]
    systolic: Option<Value>,
    #[serde(default)]
    diastolic: Option<Value>,
    #[serde(default)]
    body_position: i32,
    #[serde(default)]
    measurement_location: i32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for BloodPressureCodec {
    fn record_type(&self) -> RecordType {
        RecordType::BloodPressure
    }

    fn result_type(&self) -> &'static str {
        "PRESSURE"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireBloodPressure::deserialize(wire)?;
        Ok(Record::BloodPressure(BloodPressureRecord {
            time: wire.time,
            systolic: units::decode::<Pressure>(wire.systolic.as_ref())?,
            diastolic: units::decode::<Pressure>(wire.diastolic.as_ref())?,
            body_position: wire.body_position,
            measurement_location: wire.measurement_location,
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::BloodPressure(r) = record else {
            return Err(mismatch(RecordType::BloodPressure, record));
        };
        Ok(json!({
            "time": format_instant(&r.time),
            "measurementLocation": r.measurement_location,
            "bodyPosition": r.body_position,
            "systolic": units::encode(Some(&r.systolic)),
            "diastolic": units::encode(Some(&r.diastolic)),
            "metadata": r.metadata.to_wire(),
        }))
    }

    fn aggregation(&self) -> Option<&dyn AggregateCodec> {
        Some(self)
    }

    fn manual_buckets(&self) -> Option<&dyn ManualBucketCodec> {
        Some(self)
    }
}

impl AggregateCodec for BloodPressureCodec {
    fn metrics(&self) -> &'static [Metric] {
        &[
            Metric::SystolicAvg,
            Metric::SystolicMin,
            Metric::SystolicMax,
            Metric::DiastolicAvg,
            Metric::DiastolicMin,
            Metric::DiastolicMax,
        ]
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        let mut object = serde_json::Map::new();
        for metric in self.metrics() {
            let pressure = result.get_pressure(*metric);
            object.insert(metric.name().to_string(), units::encode(pressure.as_ref()));
        }
        object.insert("dataOrigins".to_string(), json!(result.data_origins));
        Value::Object(object)
    }
}

impl ManualBucketCodec for BloodPressureCodec {
    fn parse_manually_bucketed_result(
        &self,
        records: &[Record],
        _options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        let readings = typed_records(records, RecordType::BloodPressure, |r| match r {
            Record::BloodPressure(bp) => Some(bp),
            _ => None,
        })?;

        Ok(group_by_day(&readings, |r| r.time, zone)
            .into_iter()
            .map(|(day, readings)| {
                let systolic = mean(readings.iter().map(|r| r.systolic.in_millimeters_of_mercury()));
                let diastolic =
                    mean(readings.iter().map(|r| r.diastolic.in_millimeters_of_mercury()));
                let value = format!("{}/{}", format_number(systolic), format_number(diastolic));
                BucketEnvelope::new(day, self.result_type(), value)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::test_support::week_options;
    use crate::platform::MetricValue;
    use pretty_assertions::assert_eq;

    fn reading(time: &str, systolic: f64, diastolic: f64) -> Record {
        BloodPressureCodec
            .parse_write_record(&json!({
                "time": time,
                "systolic": { "value": systolic, "unit": "millimetersOfMercury" },
                "diastolic": { "value": diastolic, "unit": "millimetersOfMercury" },
                "bodyPosition": 1,
                "measurementLocation": 3
            }))
            .unwrap()
    }

    #[test]
    fn test_read_shape() {
        let read = BloodPressureCodec
            .parse_record(&reading("2024-03-01T08:00:00Z", 120.0, 80.0))
            .unwrap();
        assert_eq!(read["systolic"], json!({ "inMillimetersOfMercury": 120.0 }));
        assert_eq!(read["bodyPosition"], 1);
        assert_eq!(read["measurementLocation"], 3);
    }

    #[test]
    fn test_missing_pressure_is_invalid() {
        let err = BloodPressureCodec
            .parse_write_record(&json!({
                "time": "2024-03-01T08:00:00Z",
                "systolic": { "value": 120, "unit": "millimetersOfMercury" }
            }))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PRESSURE");
    }

    #[test]
    fn test_daily_mean() {
        let records = vec![
            reading("2024-03-02T08:00:00Z", 121.0, 80.0),
            reading("2024-03-01T08:00:00Z", 120.0, 80.0),
            reading("2024-03-01T20:00:00Z", 131.0, 85.0),
        ];
        let envelopes = BloodPressureCodec
            .parse_manually_bucketed_result(&records, &week_options(json!({})), &LocalZone::utc())
            .unwrap();

        let summary: Vec<_> = envelopes
            .iter()
            .map(|e| (e.date_key.as_str(), e.entry.value.as_str()))
            .collect();
        assert_eq!(summary, vec![("20240301", "125.5/82.5"), ("20240302", "121/80")]);
        assert_eq!(envelopes[0].entry.entry_type, "PRESSURE");
    }

    #[test]
    fn test_six_stat_aggregate_zero_fill() {
        let result = AggregationResult::new(vec!["com.example.bp".into()]).with(
            Metric::SystolicAvg,
            MetricValue::Pressure(Pressure::millimeters_of_mercury(118.0)),
        );
        let parsed = BloodPressureCodec.parse_aggregation_result(&result);
        assert_eq!(parsed["SYSTOLIC_AVG"]["inMillimetersOfMercury"], 118.0);
        for key in ["SYSTOLIC_MIN", "SYSTOLIC_MAX", "DIASTOLIC_AVG", "DIASTOLIC_MIN", "DIASTOLIC_MAX"] {
            assert_eq!(parsed[key]["inMillimetersOfMercury"], 0.0, "{key}");
        }
        assert_eq!(parsed["dataOrigins"], json!(["com.example.bp"]));
    }

    #[test]
    fn test_manual_rejects_foreign_records() {
        let steps = crate::codecs::StepsCodec
            .parse_write_record(&json!({
                "startTime": "2024-03-01T08:00:00Z",
                "endTime": "2024-03-01T09:00:00Z",
                "count": 10
            }))
            .unwrap();
        let err = BloodPressureCodec
            .parse_manually_bucketed_result(&[steps], &week_options(json!({})), &LocalZone::utc())
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RECORD_TYPE");
    }
}
