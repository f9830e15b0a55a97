//! Error types for the health bridge
//!
//! Every failure that crosses the bridge carries a stable wire code so the
//! application runtime can branch on it without parsing messages.

use serde::Serialize;
use thiserror::Error;

use crate::types::RecordType;
use crate::units::QuantityKind;

/// Errors that can occur while translating or dispatching a bridge call
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Health Connect client is not initialized")]
    ClientNotInitialized,

    #[error("Record type is not valid: {0}")]
    InvalidRecordType(String),

    #[error("{} is not valid", .0.label())]
    InvalidQuantity(QuantityKind),

    #[error("Aggregation is not supported for {0}")]
    AggregationNotSupported(RecordType),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Health Connect SDK version is too old: {0}")]
    SdkVersion(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    ArgumentValidation(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Underlying platform error: {0}")]
    Underlying(String),

    #[error("{0}")]
    Unknown(String),
}

impl BridgeError {
    /// Stable wire code reported to the application runtime
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::ClientNotInitialized => "CLIENT_NOT_INITIALIZED",
            BridgeError::InvalidRecordType(_) => "INVALID_RECORD_TYPE",
            BridgeError::InvalidQuantity(kind) => kind.error_code(),
            BridgeError::Permission(_) => "PERMISSION_ERROR",
            BridgeError::SdkVersion(_) => "SDK_VERSION_ERROR",
            BridgeError::Io(_) => "IO_EXCEPTION",
            BridgeError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            BridgeError::ArgumentValidation(_) | BridgeError::JsonError(_) => {
                "ARGUMENT_VALIDATION_ERROR"
            }
            BridgeError::Underlying(_) => "UNDERLYING_ERROR",
            // Unsupported operations are a caller contract violation and were
            // never given a dedicated code.
            BridgeError::AggregationNotSupported(_) | BridgeError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Shorthand for a validation failure on caller-supplied options
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BridgeError::ArgumentValidation(msg.into())
    }

    /// Rejection payload handed back across the bridge
    pub fn to_wire(&self) -> WireError {
        WireError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable `(code, message)` pair for a rejected call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::ClientNotInitialized.code(), "CLIENT_NOT_INITIALIZED");
        assert_eq!(
            BridgeError::InvalidRecordType("Foo".into()).code(),
            "INVALID_RECORD_TYPE"
        );
        assert_eq!(
            BridgeError::InvalidQuantity(QuantityKind::Temperature).code(),
            "INVALID_TEMPERATURE"
        );
        assert_eq!(
            BridgeError::InvalidQuantity(QuantityKind::BloodGlucose).code(),
            "INVALID_BLOOD_GLUCOSE_LEVEL"
        );
        assert_eq!(
            BridgeError::invalid_argument("bad filter").code(),
            "ARGUMENT_VALIDATION_ERROR"
        );
        assert_eq!(
            BridgeError::AggregationNotSupported(RecordType::BodyTemperature).code(),
            "UNKNOWN_ERROR"
        );
    }

    #[test]
    fn test_json_errors_are_validation_failures() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "ARGUMENT_VALIDATION_ERROR");
    }

    #[test]
    fn test_to_wire() {
        let wire = BridgeError::InvalidQuantity(QuantityKind::Energy).to_wire();
        assert_eq!(wire.code, "INVALID_ENERGY");
        assert_eq!(wire.message, "Energy is not valid");
    }
}
