//! Sleep session codec
//!
//! Native aggregation only reports total sleep duration; daily buckets come
//! from the sleep merge in [`crate::bucketing`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{mismatch, ordered_interval, typed_records, AggregateCodec, ManualBucketCodec, RecordCodec};
use crate::bucketing::sleep_envelopes;
use crate::envelope::{cutoff_hour, format_instant, BucketEnvelope, BucketOptions, LocalZone};
use crate::error::BridgeError;
use crate::platform::{AggregationResult, Metric};
use crate::types::{Metadata, Record, RecordType, SleepSessionRecord, SleepStage};

pub struct SleepSessionCodec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStage {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    stage: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSleepSession {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    stages: Vec<WireStage>,
    #[serde(default)]
    metadata: Option<Value>,
}

impl RecordCodec for SleepSessionCodec {
    fn record_type(&self) -> RecordType {
        RecordType::SleepSession
    }

    fn result_type(&self) -> &'static str {
        "SLEEP"
    }

    fn parse_write_record(&self, wire: &Value) -> Result<Record, BridgeError> {
        let wire = WireSleepSession::deserialize(wire)?;
        ordered_interval("SleepSession", wire.start_time, wire.end_time)?;
        for stage in &wire.stages {
            ordered_interval("Sleep stage", stage.start_time, stage.end_time)?;
        }
        Ok(Record::SleepSession(SleepSessionRecord {
            start_time: wire.start_time,
            end_time: wire.end_time,
            title: wire.title,
            notes: wire.notes,
            stages: wire
                .stages
                .into_iter()
                .map(|s| SleepStage {
                    start_time: s.start_time,
                    end_time: s.end_time,
                    stage: s.stage as i32,
                })
                .collect(),
            metadata: Metadata::from_wire(wire.metadata.as_ref()),
        }))
    }

    fn parse_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let Record::SleepSession(r) = record else {
            return Err(mismatch(RecordType::SleepSession, record));
        };
        let stages: Vec<Value> = r
            .stages
            .iter()
            .map(|s| {
                json!({
                    "startTime": format_instant(&s.start_time),
                    "endTime": format_instant(&s.end_time),
                    "stage": s.stage as f64,
                })
            })
            .collect();

        Ok(json!({
            "startTime": format_instant(&r.start_time),
            "endTime": format_instant(&r.end_time),
            "title": r.title,
            "notes": r.notes,
            "stages": stages,
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

impl AggregateCodec for SleepSessionCodec {
    fn metrics(&self) -> &'static [Metric] {
        &[Metric::SleepDurationTotal]
    }

    fn parse_aggregation_result(&self, result: &AggregationResult) -> Value {
        let seconds = result
            .get_duration(Metric::SleepDurationTotal)
            .map(|d| d.num_seconds())
            .unwrap_or(0);
        json!({
            "SLEEP_DURATION_TOTAL": seconds as f64,
            "dataOrigins": result.data_origins,
        })
    }
}

impl ManualBucketCodec for SleepSessionCodec {
    fn parse_manually_bucketed_result(
        &self,
        records: &[Record],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        let cutoff = cutoff_hour(options)?;
        let sessions: Vec<SleepSessionRecord> =
            typed_records(records, RecordType::SleepSession, |r| match r {
                Record::SleepSession(s) => Some(s),
                _ => None,
            })?
            .into_iter()
            .cloned()
            .collect();

        Ok(sleep_envelopes(&sessions, cutoff, zone, self.result_type()))
    }
}
