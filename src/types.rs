//! Platform record model
//!
//! These are the typed, platform-native records held by a health store. Codecs
//! translate between these and the JSON wire format.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;
use crate::units::{Mass, Pressure, Temperature};

/// Closed set of record types the bridge can translate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    Steps,
    HeartRate,
    RestingHeartRate,
    Weight,
    BloodPressure,
    BodyTemperature,
    HeartRateVariabilityRmssd,
    SleepSession,
}

impl RecordType {
    pub const ALL: [RecordType; 8] = [
        RecordType::Steps,
        RecordType::HeartRate,
        RecordType::RestingHeartRate,
        RecordType::Weight,
        RecordType::BloodPressure,
        RecordType::BodyTemperature,
        RecordType::HeartRateVariabilityRmssd,
        RecordType::SleepSession,
    ];

    /// Wire-level type name (`recordType` in payloads)
    pub fn wire_name(&self) -> &'static str {
        match self {
            RecordType::Steps => "Steps",
            RecordType::HeartRate => "HeartRate",
            RecordType::RestingHeartRate => "RestingHeartRate",
            RecordType::Weight => "Weight",
            RecordType::BloodPressure => "BloodPressure",
            RecordType::BodyTemperature => "BodyTemperature",
            RecordType::HeartRateVariabilityRmssd => "HeartRateVariabilityRmssd",
            RecordType::SleepSession => "SleepSession",
        }
    }

    /// Interval records carry a start and end; the rest a single `time`
    pub fn is_interval(&self) -> bool {
        matches!(
            self,
            RecordType::Steps | RecordType::HeartRate | RecordType::SleepSession
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for RecordType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.wire_name() == s)
            .ok_or_else(|| BridgeError::InvalidRecordType(s.to_string()))
    }
}

/// Sleep stage codes as reported by the platform
pub mod sleep_stage {
    pub const UNKNOWN: i32 = 0;
    pub const AWAKE: i32 = 1;
    pub const SLEEPING: i32 = 2;
    pub const OUT_OF_BED: i32 = 3;
    pub const LIGHT: i32 = 4;
    pub const DEEP: i32 = 5;
    pub const REM: i32 = 6;
    pub const AWAKE_IN_BED: i32 = 7;
}

/// Device that produced a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub device_type: i32,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl Device {
    fn to_wire(&self) -> Value {
        json!({
            "type": self.device_type,
            "manufacturer": self.manufacturer,
            "model": self.model,
        })
    }

    fn from_wire(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            device_type: object.get("type").and_then(Value::as_i64).unwrap_or(0) as i32,
            manufacturer: object
                .get("manufacturer")
                .and_then(Value::as_str)
                .map(str::to_string),
            model: object.get("model").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Record provenance. Opaque to the bridge beyond serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub id: String,
    pub client_record_id: Option<String>,
    pub client_record_version: i64,
    /// Package name of the contributing app
    pub data_origin: String,
    pub last_modified_time: DateTime<Utc>,
    pub device: Option<Device>,
    pub recording_method: i32,
}

impl Metadata {
    pub fn to_wire(&self) -> Value {
        json!({
            "id": self.id,
            "clientRecordId": self.client_record_id,
            "clientRecordVersion": self.client_record_version as f64,
            "dataOrigin": self.data_origin,
            "lastModifiedTime": crate::envelope::format_instant(&self.last_modified_time),
            "device": self.device.as_ref().map(Device::to_wire),
            "recordingMethod": self.recording_method,
        })
    }

    /// Caller-settable metadata on a write. Store-owned fields stay empty.
    pub fn from_wire(value: Option<&Value>) -> Self {
        let Some(object) = value.and_then(Value::as_object) else {
            return Self::default();
        };

        Self {
            client_record_id: object
                .get("clientRecordId")
                .and_then(Value::as_str)
                .map(str::to_string),
            client_record_version: object
                .get("clientRecordVersion")
                .and_then(Value::as_f64)
                .map(|v| v as i64)
                .unwrap_or(0),
            device: object.get("device").and_then(Device::from_wire),
            recording_method: object
                .get("recordingMethod")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepsRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub count: i64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateSample {
    pub time: DateTime<Utc>,
    pub beats_per_minute: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub samples: Vec<HeartRateSample>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestingHeartRateRecord {
    pub time: DateTime<Utc>,
    pub beats_per_minute: i64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecord {
    pub time: DateTime<Utc>,
    pub weight: Mass,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BloodPressureRecord {
    pub time: DateTime<Utc>,
    pub systolic: Pressure,
    pub diastolic: Pressure,
    pub body_position: i32,
    pub measurement_location: i32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyTemperatureRecord {
    pub time: DateTime<Utc>,
    pub temperature: Temperature,
    pub measurement_location: i32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateVariabilityRmssdRecord {
    pub time: DateTime<Utc>,
    pub heart_rate_variability_millis: f64,
    pub metadata: Metadata,
}

/// One staged interval within a sleep session
#[derive(Debug, Clone, PartialEq)]
pub struct SleepStage {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// See [`sleep_stage`]
    pub stage: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SleepSessionRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub stages: Vec<SleepStage>,
    pub metadata: Metadata,
}

/// A platform-native record of any supported type
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Steps(StepsRecord),
    HeartRate(HeartRateRecord),
    RestingHeartRate(RestingHeartRateRecord),
    Weight(WeightRecord),
    BloodPressure(BloodPressureRecord),
    BodyTemperature(BodyTemperatureRecord),
    HeartRateVariabilityRmssd(HeartRateVariabilityRmssdRecord),
    SleepSession(SleepSessionRecord),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Steps(_) => RecordType::Steps,
            Record::HeartRate(_) => RecordType::HeartRate,
            Record::RestingHeartRate(_) => RecordType::RestingHeartRate,
            Record::Weight(_) => RecordType::Weight,
            Record::BloodPressure(_) => RecordType::BloodPressure,
            Record::BodyTemperature(_) => RecordType::BodyTemperature,
            Record::HeartRateVariabilityRmssd(_) => RecordType::HeartRateVariabilityRmssd,
            Record::SleepSession(_) => RecordType::SleepSession,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Record::Steps(r) => &r.metadata,
            Record::HeartRate(r) => &r.metadata,
            Record::RestingHeartRate(r) => &r.metadata,
            Record::Weight(r) => &r.metadata,
            Record::BloodPressure(r) => &r.metadata,
            Record::BodyTemperature(r) => &r.metadata,
            Record::HeartRateVariabilityRmssd(r) => &r.metadata,
            Record::SleepSession(r) => &r.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Record::Steps(r) => &mut r.metadata,
            Record::HeartRate(r) => &mut r.metadata,
            Record::RestingHeartRate(r) => &mut r.metadata,
            Record::Weight(r) => &mut r.metadata,
            Record::BloodPressure(r) => &mut r.metadata,
            Record::BodyTemperature(r) => &mut r.metadata,
            Record::HeartRateVariabilityRmssd(r) => &mut r.metadata,
            Record::SleepSession(r) => &mut r.metadata,
        }
    }

    /// `(start, end)` of the record; instantaneous records have `start == end`
    pub fn span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            Record::Steps(r) => (r.start_time, r.end_time),
            Record::HeartRate(r) => (r.start_time, r.end_time),
            Record::SleepSession(r) => (r.start_time, r.end_time),
            Record::RestingHeartRate(r) => (r.time, r.time),
            Record::Weight(r) => (r.time, r.time),
            Record::BloodPressure(r) => (r.time, r.time),
            Record::BodyTemperature(r) => (r.time, r.time),
            Record::HeartRateVariabilityRmssd(r) => (r.time, r.time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_type_wire_names() {
        for record_type in RecordType::ALL {
            let parsed: RecordType = record_type.wire_name().parse().unwrap();
            assert_eq!(parsed, record_type);
        }
        let err = "Hydration".parse::<RecordType>().unwrap_err();
        assert_eq!(err.code(), "INVALID_RECORD_TYPE");
    }

    #[test]
    fn test_metadata_to_wire_nulls_absent_fields() {
        let metadata = Metadata {
            id: "abc".to_string(),
            data_origin: "com.example.app".to_string(),
            last_modified_time: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            ..Metadata::default()
        };
        let wire = metadata.to_wire();
        assert_eq!(wire["id"], "abc");
        assert!(wire["clientRecordId"].is_null());
        assert!(wire["device"].is_null());
        assert_eq!(wire["clientRecordVersion"], 0.0);
        assert_eq!(wire["lastModifiedTime"], "2024-03-01T08:00:00Z");
    }

    #[test]
    fn test_metadata_from_wire() {
        let wire = json!({
            "clientRecordId": "client-1",
            "clientRecordVersion": 3,
            "device": { "type": 2, "manufacturer": "Acme" },
            "recordingMethod": 1,
        });
        let metadata = Metadata::from_wire(Some(&wire));
        assert_eq!(metadata.client_record_id.as_deref(), Some("client-1"));
        assert_eq!(metadata.client_record_version, 3);
        assert_eq!(metadata.recording_method, 1);
        let device = metadata.device.unwrap();
        assert_eq!(device.device_type, 2);
        assert_eq!(device.manufacturer.as_deref(), Some("Acme"));
        assert!(device.model.is_none());
        assert!(metadata.id.is_empty());
    }

    #[test]
    fn test_span_of_instant_record() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let record = Record::HeartRateVariabilityRmssd(HeartRateVariabilityRmssdRecord {
            time: t,
            heart_rate_variability_millis: 42.0,
            metadata: Metadata::default(),
        });
        assert_eq!(record.span(), (t, t));
        assert_eq!(record.record_type(), RecordType::HeartRateVariabilityRmssd);
        assert!(!record.record_type().is_interval());
    }
}
