//! Permissions
//!
//! Wire permissions (`{accessType, recordType}`) map onto platform permission
//! strings. Requests go through a single-slot rendezvous with the host's
//! permission picker: the caller blocks until the picker answers, and only one
//! request may be in flight at a time.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};

use crate::error::BridgeError;
use crate::types::RecordType;

const PREFIX: &str = "android.permission.health.";

pub const BACKGROUND_ACCESS: &str = "BackgroundAccessPermission";
pub const READ_HEALTH_DATA_HISTORY: &str = "ReadHealthDataHistory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Read,
    Write,
}

/// `{accessType, recordType}` as exchanged with the app runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub access_type: AccessType,
    pub record_type: String,
}

impl Permission {
    pub fn new(access_type: AccessType, record_type: impl Into<String>) -> Self {
        Self {
            access_type,
            record_type: record_type.into(),
        }
    }

    /// Platform permission string
    pub fn to_platform(&self) -> Result<String, BridgeError> {
        match (self.access_type, self.record_type.as_str()) {
            (AccessType::Read, BACKGROUND_ACCESS) => {
                Ok(format!("{PREFIX}READ_HEALTH_DATA_IN_BACKGROUND"))
            }
            (AccessType::Read, READ_HEALTH_DATA_HISTORY) => {
                Ok(format!("{PREFIX}READ_HEALTH_DATA_HISTORY"))
            }
            (access, name) => {
                let record_type: RecordType = name.parse()?;
                let verb = match access {
                    AccessType::Read => "READ",
                    AccessType::Write => "WRITE",
                };
                Ok(format!("{PREFIX}{verb}_{}", permission_suffix(record_type)))
            }
        }
    }

    /// Inverse of [`Permission::to_platform`]; `None` for strings this bridge does not model
    pub fn from_platform(permission: &str) -> Option<Self> {
        let name = permission.strip_prefix(PREFIX)?;
        match name {
            "READ_HEALTH_DATA_IN_BACKGROUND" => {
                return Some(Self::new(AccessType::Read, BACKGROUND_ACCESS))
            }
            "READ_HEALTH_DATA_HISTORY" => {
                return Some(Self::new(AccessType::Read, READ_HEALTH_DATA_HISTORY))
            }
            _ => {}
        }

        let (access_type, suffix) = if let Some(rest) = name.strip_prefix("READ_") {
            (AccessType::Read, rest)
        } else {
            (AccessType::Write, name.strip_prefix("WRITE_")?)
        };
        RecordType::ALL
            .into_iter()
            .find(|t| permission_suffix(*t) == suffix)
            .map(|t| Self::new(access_type, t.wire_name()))
    }
}

fn permission_suffix(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Steps => "STEPS",
        RecordType::HeartRate => "HEART_RATE",
        RecordType::RestingHeartRate => "RESTING_HEART_RATE",
        RecordType::Weight => "WEIGHT",
        RecordType::BloodPressure => "BLOOD_PRESSURE",
        RecordType::BodyTemperature => "BODY_TEMPERATURE",
        RecordType::HeartRateVariabilityRmssd => "HEART_RATE_VARIABILITY",
        RecordType::SleepSession => "SLEEP",
    }
}

/// Deduplicated platform strings for a wire request, in request order
pub fn parse_permissions(permissions: &[Permission]) -> Result<Vec<String>, BridgeError> {
    let mut platform: Vec<String> = Vec::with_capacity(permissions.len());
    for permission in permissions {
        let value = permission.to_platform()?;
        if !platform.contains(&value) {
            platform.push(value);
        }
    }
    Ok(platform)
}

/// Wire permissions for granted platform strings, skipping unknown ones
pub fn map_permission_result(granted: &[String]) -> Vec<Permission> {
    granted
        .iter()
        .filter_map(|p| Permission::from_platform(p))
        .collect()
}

// ============================================================================
// Rendezvous
// ============================================================================

/// One-shot reply handle handed to the permission picker
pub struct PermissionResponder {
    sender: SyncSender<Vec<String>>,
}

impl PermissionResponder {
    /// Deliver the granted platform permission strings
    pub fn respond(self, granted: Vec<String>) {
        if self.sender.send(granted).is_err() {
            log::warn!("permission result arrived after the request was abandoned");
        }
    }
}

/// Host permission picker. Must eventually call [`PermissionResponder::respond`]
/// or drop the responder; it may do so from any thread.
pub trait PermissionLauncher: Send + Sync {
    fn launch(&self, permissions: Vec<String>, provider_package: &str, responder: PermissionResponder);
}

impl<F> PermissionLauncher for F
where
    F: Fn(Vec<String>, &str, PermissionResponder) + Send + Sync,
{
    fn launch(&self, permissions: Vec<String>, provider_package: &str, responder: PermissionResponder) {
        self(permissions, provider_package, responder)
    }
}

/// Single-slot rendezvous between a caller and the permission picker
pub struct PermissionRendezvous {
    launcher: Box<dyn PermissionLauncher>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PermissionRendezvous {
    pub fn new(launcher: impl PermissionLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Launch the picker and block until it answers.
    ///
    /// A second request while one is pending fails with `SERVICE_UNAVAILABLE`.
    pub fn request(
        &self,
        permissions: Vec<String>,
        provider_package: &str,
    ) -> Result<Vec<String>, BridgeError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("rejecting permission request: another request is in flight");
            return Err(BridgeError::ServiceUnavailable(
                "A permission request is already in progress".to_string(),
            ));
        }
        let _slot = InFlight(&self.in_flight);

        let (sender, receiver) = mpsc::sync_channel(1);
        self.launcher
            .launch(permissions, provider_package, PermissionResponder { sender });

        receiver.recv().map_err(|_| {
            BridgeError::ServiceUnavailable("Permission picker closed without a result".to_string())
        })
    }
}
