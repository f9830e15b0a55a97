//! Record type registry
//!
//! An immutable table from [`RecordType`] to its codec. The bridge receives one
//! at construction; [`RecordTypeRegistry::standard`] builds the full set.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::codecs::{
    AggregateCodec, BloodPressureCodec, BodyTemperatureCodec, BucketCodec, HeartRateCodec,
    HeartRateVariabilityCodec, ManualBucketCodec, RecordCodec, RestingHeartRateCodec,
    SleepSessionCodec, StepsCodec, WeightCodec,
};
use crate::envelope::{
    parse_time_range_filter, AggregateOptions, BucketEnvelope, BucketOptions, LocalZone,
    ReadRecordsOptions,
};
use crate::error::BridgeError;
use crate::platform::{
    AggregateGroupByDurationRequest, AggregateRequest, AggregationResult,
    AggregationResultGroupedByDuration, ReadRecordsRequest, ReadRecordsResponse,
};
use crate::types::{Record, RecordType};

/// How bucketed reads are served for a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketingMode {
    /// The store groups by duration
    Native,
    /// Raw records are fetched and grouped by the bridge
    Manual,
}

impl BucketingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketingMode::Native => "native",
            BucketingMode::Manual => "manual",
        }
    }
}

pub struct RecordTypeRegistry {
    codecs: BTreeMap<RecordType, Box<dyn RecordCodec>>,
}

impl RecordTypeRegistry {
    /// Registry with a codec for every supported record type
    pub fn standard() -> Self {
        Self::empty()
            .with_codec(Box::new(StepsCodec))
            .with_codec(Box::new(HeartRateCodec))
            .with_codec(Box::new(RestingHeartRateCodec))
            .with_codec(Box::new(WeightCodec))
            .with_codec(Box::new(BloodPressureCodec))
            .with_codec(Box::new(BodyTemperatureCodec))
            .with_codec(Box::new(HeartRateVariabilityCodec))
            .with_codec(Box::new(SleepSessionCodec))
    }

    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn RecordCodec>) -> Self {
        self.codecs.insert(codec.record_type(), codec);
        self
    }

    pub fn record_types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.codecs.keys().copied()
    }

    pub fn codec(&self, record_type: RecordType) -> Result<&dyn RecordCodec, BridgeError> {
        self.codecs
            .get(&record_type)
            .map(|codec| codec.as_ref())
            .ok_or_else(|| BridgeError::InvalidRecordType(record_type.to_string()))
    }

    /// Codec for a wire type name
    pub fn resolve(&self, record_type: &str) -> Result<&dyn RecordCodec, BridgeError> {
        self.codec(record_type.parse()?)
    }

    pub fn codec_for(&self, record: &Record) -> Result<&dyn RecordCodec, BridgeError> {
        self.codec(record.record_type())
    }

    fn aggregation(&self, record_type: &str) -> Result<&dyn AggregateCodec, BridgeError> {
        let codec = self.resolve(record_type)?;
        codec
            .aggregation()
            .ok_or(BridgeError::AggregationNotSupported(codec.record_type()))
    }

    fn native_buckets(&self, record_type: &str) -> Result<&dyn BucketCodec, BridgeError> {
        let codec = self.resolve(record_type)?;
        codec
            .native_buckets()
            .ok_or(BridgeError::AggregationNotSupported(codec.record_type()))
    }

    fn manual_buckets(&self, record_type: &str) -> Result<&dyn ManualBucketCodec, BridgeError> {
        let codec = self.resolve(record_type)?;
        codec
            .manual_buckets()
            .ok_or(BridgeError::AggregationNotSupported(codec.record_type()))
    }

    pub fn result_type(&self, record_type: &str) -> Result<&'static str, BridgeError> {
        Ok(self.resolve(record_type)?.result_type())
    }

    /// Native when the codec can build a grouped request, manual otherwise
    pub fn bucketing_mode(&self, record_type: &str) -> Result<BucketingMode, BridgeError> {
        let codec = self.resolve(record_type)?;
        if codec.native_buckets().is_some() {
            Ok(BucketingMode::Native)
        } else if codec.manual_buckets().is_some() {
            Ok(BucketingMode::Manual)
        } else {
            Err(BridgeError::AggregationNotSupported(codec.record_type()))
        }
    }

    pub fn parse_read_request(
        &self,
        record_type: &str,
        options: &ReadRecordsOptions,
        default_page_size: usize,
    ) -> Result<ReadRecordsRequest, BridgeError> {
        let codec = self.resolve(record_type)?;
        Ok(ReadRecordsRequest {
            record_type: codec.record_type(),
            time_range_filter: parse_time_range_filter(options.time_range_filter.as_ref())?,
            data_origin_filter: options.data_origin_filter.clone(),
            ascending_order: options.ascending_order.unwrap_or(true),
            page_size: options.page_size.unwrap_or(default_page_size),
            page_token: options.page_token.clone(),
        })
    }

    /// `{records, pageToken?}` for a read response
    pub fn parse_records(
        &self,
        record_type: &str,
        response: &ReadRecordsResponse,
    ) -> Result<Value, BridgeError> {
        let codec = self.resolve(record_type)?;
        let records = response
            .records
            .iter()
            .map(|record| codec.parse_record(record))
            .collect::<Result<Vec<_>, _>>()?;

        let mut object = Map::new();
        object.insert("records".to_string(), Value::Array(records));
        if let Some(token) = &response.page_token {
            object.insert("pageToken".to_string(), Value::from(token.as_str()));
        }
        Ok(Value::Object(object))
    }

    pub fn parse_record(&self, record_type: &str, record: &Record) -> Result<Value, BridgeError> {
        self.resolve(record_type)?.parse_record(record)
    }

    /// Change-feed record, tagged with its wire type name
    pub fn parse_change_record(&self, record: &Record) -> Result<Value, BridgeError> {
        let mut value = self.codec_for(record)?.parse_record(record)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "recordType".to_string(),
                Value::from(record.record_type().wire_name()),
            );
        }
        Ok(value)
    }

    /// Wire records carrying their own `recordType`
    pub fn parse_write_records(&self, wire: &[Value]) -> Result<Vec<Record>, BridgeError> {
        wire.iter()
            .map(|value| {
                let record_type = value
                    .get("recordType")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BridgeError::InvalidRecordType("missing recordType".into()))?;
                self.resolve(record_type)?.parse_write_record(value)
            })
            .collect()
    }

    pub fn get_aggregate_request(
        &self,
        record_type: &str,
        options: &AggregateOptions,
    ) -> Result<AggregateRequest, BridgeError> {
        self.aggregation(record_type)?.get_aggregate_request(options)
    }

    pub fn parse_aggregation_result(
        &self,
        record_type: &str,
        result: &AggregationResult,
    ) -> Result<Value, BridgeError> {
        Ok(self.aggregation(record_type)?.parse_aggregation_result(result))
    }

    pub fn get_bucketed_request(
        &self,
        record_type: &str,
        options: &BucketOptions,
    ) -> Result<AggregateGroupByDurationRequest, BridgeError> {
        self.native_buckets(record_type)?.get_bucketed_request(options)
    }

    pub fn parse_bucketed_result(
        &self,
        record_type: &str,
        buckets: &[AggregationResultGroupedByDuration],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        Ok(self
            .native_buckets(record_type)?
            .parse_bucketed_result(buckets, options, zone))
    }

    pub fn parse_manually_bucketed_result(
        &self,
        record_type: &str,
        records: &[Record],
        options: &BucketOptions,
        zone: &LocalZone,
    ) -> Result<Vec<BucketEnvelope>, BridgeError> {
        self.manual_buckets(record_type)?
            .parse_manually_bucketed_result(records, options, zone)
    }
}

impl Default for RecordTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::parse_options;
    use serde_json::json;

    fn bucket_options() -> BucketOptions {
        parse_options(&json!({
            "timeRangeFilter": {
                "operator": "between",
                "startTime": "2024-03-01T18:00:00Z",
                "endTime": "2024-03-08T18:00:00Z"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_every_type_resolves() {
        let registry = RecordTypeRegistry::standard();
        for record_type in RecordType::ALL {
            let codec = registry.resolve(record_type.wire_name()).unwrap();
            assert_eq!(codec.record_type(), record_type);
            assert!(registry.bucketing_mode(record_type.wire_name()).is_ok());
        }
        assert_eq!(registry.record_types().count(), 8);
    }

    #[test]
    fn test_unknown_type_fails_every_entry_point() {
        let registry = RecordTypeRegistry::standard();
        let name = "Hydration";
        let read = ReadRecordsOptions::default();
        let aggregate = AggregateOptions::default();
        let bucket = bucket_options();
        let zone = LocalZone::utc();

        let results: Vec<BridgeError> = vec![
            registry.parse_read_request(name, &read, 1000).unwrap_err(),
            registry
                .parse_records(name, &ReadRecordsResponse::default())
                .unwrap_err(),
            registry.get_aggregate_request(name, &aggregate).unwrap_err(),
            registry
                .parse_aggregation_result(name, &AggregationResult::default())
                .unwrap_err(),
            registry.get_bucketed_request(name, &bucket).unwrap_err(),
            registry.parse_bucketed_result(name, &[], &bucket, &zone).unwrap_err(),
            registry
                .parse_manually_bucketed_result(name, &[], &bucket, &zone)
                .unwrap_err(),
            registry.result_type(name).unwrap_err(),
            registry.bucketing_mode(name).unwrap_err(),
            registry
                .parse_write_records(&[json!({ "recordType": name })])
                .unwrap_err(),
        ];
        for err in results {
            assert_eq!(err.code(), "INVALID_RECORD_TYPE");
        }
    }

    #[test]
    fn test_missing_capability_is_not_supported() {
        let registry = RecordTypeRegistry::standard();
        let err = registry
            .get_aggregate_request("BodyTemperature", &AggregateOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::AggregationNotSupported(RecordType::BodyTemperature)
        ));
        assert!(matches!(
            registry.get_bucketed_request("SleepSession", &bucket_options()),
            Err(BridgeError::AggregationNotSupported(_))
        ));
        assert!(matches!(
            registry.parse_manually_bucketed_result("Steps", &[], &bucket_options(), &LocalZone::utc()),
            Err(BridgeError::AggregationNotSupported(_))
        ));
    }

    #[test]
    fn test_bucketing_modes() {
        let registry = RecordTypeRegistry::standard();
        for name in ["Steps", "HeartRate", "RestingHeartRate", "Weight"] {
            assert_eq!(registry.bucketing_mode(name).unwrap(), BucketingMode::Native);
        }
        for name in [
            "BloodPressure",
            "BodyTemperature",
            "HeartRateVariabilityRmssd",
            "SleepSession",
        ] {
            assert_eq!(registry.bucketing_mode(name).unwrap(), BucketingMode::Manual);
        }
    }

    #[test]
    fn test_registry_missing_a_type() {
        let registry = RecordTypeRegistry::empty().with_codec(Box::new(StepsCodec));
        assert!(registry.resolve("Steps").is_ok());
        assert_eq!(
            registry.resolve("Weight").err().map(|e| e.code()),
            Some("INVALID_RECORD_TYPE")
        );
    }

    #[test]
    fn test_read_request_defaults() {
        let registry = RecordTypeRegistry::standard();
        let options: ReadRecordsOptions = parse_options(&json!({
            "timeRangeFilter": { "operator": "after", "startTime": "2024-03-01T00:00:00Z" }
        }))
        .unwrap();
        let request = registry.parse_read_request("Steps", &options, 1000).unwrap();
        assert!(request.ascending_order);
        assert_eq!(request.page_size, 1000);
        assert_eq!(request.page_token, None);
    }

    #[test]
    fn test_change_record_carries_type() {
        let registry = RecordTypeRegistry::standard();
        let records = registry
            .parse_write_records(&[json!({
                "recordType": "HeartRateVariabilityRmssd",
                "time": "2024-03-01T06:00:00Z",
                "heartRateVariabilityMillis": 40
            })])
            .unwrap();
        let change = registry.parse_change_record(&records[0]).unwrap();
        assert_eq!(change["recordType"], "HeartRateVariabilityRmssd");
        assert_eq!(change["heartRateVariabilityMillis"], 40.0);
    }
}
