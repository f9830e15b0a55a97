//! Steps codec

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{long_or_zero, mismatch, ordered_interval, AggregateCodec, BucketCodec, RecordCodec};
use crate::envelope::{format_instant, BucketOptions};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{Metadata, Record, RecordType, StepsRecord};

const METRICS: &[Metric] = &[Metric::StepsCountTotal];

pub struct StepsCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSteps {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    count: f64,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for StepsCodec {
    fn record_type(&self) -> RecordType {
        RecordType::Steps
    }

    fn result_type(&self) -> &'static str {
        "STEPS"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireSteps::deserialize(wire)?;
        ordered_interval("Steps", wire.start_time, wire.end_time)?;
        Ok(Record::Steps(StepsRecord {
            start_time: wire.start_time,
            end_time: wire.end_time,
            count: wire.count as i64,
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::Steps(r) = record else {
            return Err(mismatch(RecordType::Steps, record));
        };
        Ok(json!({
            "startTime": format_instant(&r.start_time),
            "endTime": format_instant(&r.end_time),
            "count": r.count as f64,
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

impl AggregateCodec for StepsCodec {
    fn metrics(&self) -> &'static [Metric] {
        METRICS
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        json!({
            "COUNT_TOTAL": long_or_zero(result, Metric::StepsCountTotal),
            "dataOrigins": result.data_origins,
        })
    }
}

impl BucketCodec for StepsCodec {
    fn bucket_metrics(&self) -> &'static [Metric] {
        METRICS
    }

    fn bucket_value(&self, result: &AggregationResult, _options: &BucketOptions) -> Option<String> {
        result
            .get_long(Metric::StepsCountTotal)
            .map(|total| total.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::test_support::{at, daily_bucket, week_options};
    use crate::envelope::LocalZone;
    use crate::platform::MetricValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_then_read() {
        let wire = json!({
            "recordType": "Steps",
            "startTime": "2024-03-01T08:00:00Z",
            "endTime": "2024-03-01T09:00:00Z",
            "count": 1200,
        });
        let record = StepsCodec.parse_write_record(&wire).unwrap();
        let read = StepsCodec.parse_record(&record).unwrap();

        assert_eq!(read["startTime"], "2024-03-01T08:00:00Z");
        assert_eq!(read["count"], 1200.0);
        assert!(read["metadata"].is_object());
    }

    #[test]
    fn test_write_rejects_missing_fields() {
        let err = StepsCodec
            .parse_write_record(&json!({ "startTime": "2024-03-01T08:00:00Z" }))
            .unwrap_err();
        assert_eq!(err.code(), "ARGUMENT_VALIDATION_ERROR");
    }

    #[test]
    fn test_write_rejects_reversed_interval() {
        let err = StepsCodec
            .parse_write_record(&json!({
                "startTime": "2024-03-01T09:00:00Z",
                "endTime": "2024-03-01T08:00:00Z",
                "count": 10,
            }))
            .unwrap_err();
        assert_eq!(err.code(), "ARGUMENT_VALIDATION_ERROR");
    }

    #[test]
    fn test_aggregate_zero_fill() {
        let parsed = StepsCodec.parse_aggregation_result(&AggregationResult::default());
        assert_eq!(parsed, json!({ "COUNT_TOTAL": 0.0, "dataOrigins": [] }));
    }

    #[test]
    fn test_sparse_buckets_keep_order() {
        let buckets: Vec<_> = (1..=7)
            .map(|day| {
                let result = if [2, 4, 6].contains(&day) {
                    AggregationResult::default()
                } else {
                    AggregationResult::default()
                        .with(Metric::StepsCountTotal, MetricValue::Long(day as i64 * 1000))
                };
                daily_bucket(day, result)
            })
            .collect();

        let envelopes =
            StepsCodec.parse_bucketed_result(&buckets, &week_options(json!({})), &LocalZone::utc());
        let summary: Vec<_> = envelopes
            .iter()
            .map(|e| (e.date_key.as_str(), e.entry.value.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("20240301", "1000"),
                ("20240303", "3000"),
                ("20240305", "5000"),
                ("20240307", "7000"),
            ]
        );
        assert!(envelopes.iter().all(|e| e.entry.entry_type == "STEPS"));
    }

    #[test]
    fn test_bucketed_request_defaults_to_daily() {
        let request = StepsCodec.get_bucketed_request(&week_options(json!({}))).unwrap();
        assert_eq!(request.slicer, chrono::Duration::days(1));
        assert_eq!(request.metrics, vec![Metric::StepsCountTotal]);
        assert_eq!(request.time_range_filter.start(), Some(at(1, 18)));
    }
}
