//! Bridge orchestration
//!
//! [`HealthConnectBridge`] is the public operation set exposed to the app
//! runtime. Each call takes wire options, resolves the record codec through the
//! registry, talks to the store, and hands back wire JSON.

use serde_json::{json, Map, Value};
use std::sync::{Arc, RwLock};

use crate::envelope::{
    parse_options, AggregateOptions, BucketOptions, ChangesOptions, LocalZone, ReadRecordsOptions,
};
use crate::error::BridgeError;
use crate::permissions::{
    map_permission_result, parse_permissions, Permission, PermissionLauncher, PermissionRendezvous,
};
use crate::platform::{
    Change, ChangesTokenRequest, HealthStore, HealthStoreProvider, RevokeAllPermissionsResponse,
    SdkStatus,
};
use crate::registry::{BucketingMode, RecordTypeRegistry};
use crate::types::{Record, RecordType};

/// Package of the platform health app
pub const DEFAULT_PROVIDER_PACKAGE: &str = "com.google.android.apps.healthdata";

/// Page size used when a read does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Zone for day keys and local wall-clock strings
    pub zone: LocalZone,
    pub default_page_size: usize,
    pub default_provider_package: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            zone: LocalZone::System,
            default_page_size: DEFAULT_PAGE_SIZE,
            default_provider_package: DEFAULT_PROVIDER_PACKAGE.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn with_zone(mut self, zone: LocalZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn with_default_provider_package(mut self, package: impl Into<String>) -> Self {
        self.default_provider_package = package.into();
        self
    }
}

/// Health store bridge.
///
/// Holds the provider, the codec registry and, once [`initialize`] succeeds,
/// the store client. Every data operation fails with `CLIENT_NOT_INITIALIZED`
/// before that.
///
/// [`initialize`]: HealthConnectBridge::initialize
pub struct HealthConnectBridge<P: HealthStoreProvider> {
    provider: P,
    registry: RecordTypeRegistry,
    config: BridgeConfig,
    client: RwLock<Option<Arc<P::Store>>>,
    permissions: Option<PermissionRendezvous>,
}

impl<P: HealthStoreProvider> HealthConnectBridge<P> {
    /// Bridge over the standard registry with default configuration
    pub fn new(provider: P) -> Self {
        Self::with_registry(provider, RecordTypeRegistry::standard(), BridgeConfig::default())
    }

    pub fn with_registry(provider: P, registry: RecordTypeRegistry, config: BridgeConfig) -> Self {
        Self {
            provider,
            registry,
            config,
            client: RwLock::new(None),
            permissions: None,
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the host permission picker
    pub fn with_permission_launcher(mut self, launcher: impl PermissionLauncher + 'static) -> Self {
        self.permissions = Some(PermissionRendezvous::new(launcher));
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &RecordTypeRegistry {
        &self.registry
    }

    fn package<'a>(&'a self, package: Option<&'a str>) -> &'a str {
        package
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.config.default_provider_package)
    }

    fn client(&self) -> Result<Arc<P::Store>, BridgeError> {
        let guard = self
            .client
            .read()
            .map_err(|_| BridgeError::ServiceUnavailable("client lock poisoned".to_string()))?;
        guard.as_ref().cloned().ok_or(BridgeError::ClientNotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.client.read().map(|c| c.is_some()).unwrap_or(false)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn get_sdk_status(&self, provider_package: Option<&str>) -> SdkStatus {
        self.provider.sdk_status(self.package(provider_package))
    }

    /// Create the store client. Calling again replaces it.
    pub fn initialize(&self, provider_package: Option<&str>) -> Result<bool, BridgeError> {
        let package = self.package(provider_package);
        let client = self.provider.create_client(package)?;
        let mut slot = self
            .client
            .write()
            .map_err(|_| BridgeError::ServiceUnavailable("client lock poisoned".to_string()))?;
        *slot = Some(client);
        log::debug!("health store client initialized for {package}");
        Ok(true)
    }

    pub fn open_settings(&self) -> Result<(), BridgeError> {
        self.provider.open_settings()
    }

    pub fn open_data_management(&self, provider_package: Option<&str>) -> Result<(), BridgeError> {
        self.provider.open_data_management(provider_package)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// Launch the permission picker and wait for its answer.
    ///
    /// Returns the granted permissions this bridge models.
    pub fn request_permission(
        &self,
        permissions: &[Permission],
        provider_package: Option<&str>,
    ) -> Result<Vec<Permission>, BridgeError> {
        self.client()?;
        let rendezvous = self.permissions.as_ref().ok_or_else(|| {
            BridgeError::ServiceUnavailable("no permission launcher installed".to_string())
        })?;

        let requested = parse_permissions(permissions)?;
        let granted = rendezvous.request(requested, self.package(provider_package))?;
        Ok(map_permission_result(&granted))
    }

    pub fn get_granted_permissions(&self) -> Result<Vec<Permission>, BridgeError> {
        let granted = self.client()?.get_granted_permissions()?;
        Ok(map_permission_result(&granted))
    }

    pub fn revoke_all_permissions(&self) -> Result<RevokeAllPermissionsResponse, BridgeError> {
        self.client()?.revoke_all_permissions()
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// `{records, pageToken?}` for one page of a read
    pub fn read_records(&self, record_type: &str, options: &Value) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let options: ReadRecordsOptions = parse_options(options)?;
        let request =
            self.registry
                .parse_read_request(record_type, &options, self.config.default_page_size)?;
        let response = client.read_records(&request)?;
        self.registry.parse_records(record_type, &response)
    }

    pub fn read_record(&self, record_type: &str, record_id: &str) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let parsed: RecordType = record_type.parse()?;
        let record = client.read_record(parsed, record_id)?;
        self.registry.parse_record(record_type, &record)
    }

    /// Insert wire records, each tagged with its `recordType`; returns the new ids
    pub fn insert_records(&self, records: &[Value]) -> Result<Vec<String>, BridgeError> {
        let client = self.client()?;
        let records = self.registry.parse_write_records(records)?;
        client.insert_records(records)
    }

    pub fn delete_records_by_ids(
        &self,
        record_type: &str,
        record_ids: &[String],
    ) -> Result<(), BridgeError> {
        let client = self.client()?;
        let codec = self.registry.resolve(record_type)?;
        client.delete_records(codec.record_type(), record_ids)
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Aggregate over `{recordType, timeRangeFilter, dataOriginFilter?}`
    pub fn aggregate_record(&self, options: &Value) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let options: AggregateOptions = parse_options(options)?;
        let record_type = options.record_type.clone().unwrap_or_default();

        let request = self.registry.get_aggregate_request(&record_type, &options)?;
        let result = client.aggregate(&request)?;
        self.registry.parse_aggregation_result(&record_type, &result)
    }

    /// Daily `{dateKey, entry}` envelopes.
    ///
    /// Types the store can group natively go through a duration aggregate. The
    /// rest are read page by page and grouped here.
    pub fn read_bucketed_records(
        &self,
        record_type: &str,
        options: &Value,
    ) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let options: BucketOptions = parse_options(options)?;
        let zone = &self.config.zone;

        let envelopes = match self.registry.bucketing_mode(record_type)? {
            BucketingMode::Native => {
                let request = self.registry.get_bucketed_request(record_type, &options)?;
                let buckets = client.aggregate_group_by_duration(&request)?;
                log::debug!("{record_type}: {} native buckets", buckets.len());
                self.registry
                    .parse_bucketed_result(record_type, &buckets, &options, zone)?
            }
            BucketingMode::Manual => {
                let records = self.read_all(client.as_ref(), record_type, &options)?;
                log::debug!("{record_type}: bucketing {} records manually", records.len());
                self.registry
                    .parse_manually_bucketed_result(record_type, &records, &options, zone)?
            }
        };

        Ok(serde_json::to_value(envelopes)?)
    }

    fn read_all(
        &self,
        client: &P::Store,
        record_type: &str,
        options: &BucketOptions,
    ) -> Result<Vec<Record>, BridgeError> {
        let read_options = ReadRecordsOptions {
            time_range_filter: options.time_range_filter.clone(),
            data_origin_filter: options.data_origin_filter.clone(),
            ..ReadRecordsOptions::default()
        };
        let mut request = self.registry.parse_read_request(
            record_type,
            &read_options,
            self.config.default_page_size,
        )?;

        let mut records = Vec::new();
        loop {
            let page = client.read_records(&request)?;
            records.extend(page.records);
            match page.page_token {
                Some(token) => request.page_token = Some(token),
                None => return Ok(records),
            }
        }
    }

    // ========================================================================
    // Change feed
    // ========================================================================

    /// Changes since `changesToken`, or since a fresh token for the given filters
    pub fn get_changes(&self, options: &Value) -> Result<Value, BridgeError> {
        let client = self.client()?;
        let options: ChangesOptions = parse_options(options)?;

        let token = match options.changes_token {
            Some(token) => token,
            None => {
                let record_types = options
                    .record_types
                    .iter()
                    .filter_map(|name| match name.parse::<RecordType>() {
                        Ok(record_type) => Some(record_type),
                        Err(_) => {
                            log::warn!("ignoring unknown record type in changes request: {name}");
                            None
                        }
                    })
                    .collect();
                client.get_changes_token(&ChangesTokenRequest {
                    record_types,
                    data_origin_filters: options.data_origin_filters,
                })?
            }
        };

        let response = client.get_changes(&token)?;
        let mut upsertions = Vec::new();
        let mut deletions = Vec::new();
        for change in &response.changes {
            match change {
                Change::Upsertion(record) => {
                    let record = self.registry.parse_change_record(record)?;
                    upsertions.push(json!({ "record": record }));
                }
                Change::Deletion { record_id } => deletions.push(json!({ "recordId": record_id })),
            }
        }

        let mut object = Map::new();
        object.insert("upsertionChanges".to_string(), Value::Array(upsertions));
        object.insert("deletionChanges".to_string(), Value::Array(deletions));
        object.insert(
            "nextChangesToken".to_string(),
            Value::from(response.next_changes_token),
        );
        object.insert("hasMore".to_string(), Value::from(response.has_more));
        object.insert(
            "changesTokenExpired".to_string(),
            Value::from(response.changes_token_expired),
        );
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{AccessType, PermissionResponder};
    use crate::store::{MemoryStore, MemoryStoreProvider};
    use pretty_assertions::assert_eq;

    fn bridge() -> (HealthConnectBridge<MemoryStoreProvider>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new("com.example.app"));
        let provider = MemoryStoreProvider::new(Arc::clone(&store));
        let bridge = HealthConnectBridge::new(provider)
            .with_config(BridgeConfig::default().with_zone(LocalZone::utc()));
        bridge.initialize(None).unwrap();
        (bridge, store)
    }

    fn week() -> Value {
        json!({
            "operator": "between",
            "startTime": "2024-03-01T00:00:00Z",
            "endTime": "2024-03-08T00:00:00Z"
        })
    }

    #[test]
    fn test_requires_initialization() {
        let bridge = HealthConnectBridge::new(MemoryStoreProvider::default());
        assert!(!bridge.is_initialized());
        let err = bridge.read_records("Steps", &json!({})).unwrap_err();
        assert_eq!(err.code(), "CLIENT_NOT_INITIALIZED");

        assert_eq!(bridge.get_sdk_status(None), SdkStatus::Available);
        assert!(bridge.initialize(Some("")).unwrap());
        assert!(bridge.is_initialized());
    }

    #[test]
    fn test_initialize_propagates_sdk_errors() {
        let bridge = HealthConnectBridge::new(
            MemoryStoreProvider::default().with_status(SdkStatus::Unavailable),
        );
        assert_eq!(
            bridge.initialize(None).unwrap_err().code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_insert_then_read() {
        let (bridge, _) = bridge();
        let ids = bridge
            .insert_records(&[
                json!({
                    "recordType": "Steps",
                    "startTime": "2024-03-01T08:00:00Z",
                    "endTime": "2024-03-01T09:00:00Z",
                    "count": 1200
                }),
                json!({
                    "recordType": "Weight",
                    "time": "2024-03-01T07:00:00Z",
                    "weight": { "value": 72.5, "unit": "kilograms" }
                }),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let page = bridge
            .read_records("Steps", &json!({ "timeRangeFilter": week() }))
            .unwrap();
        assert_eq!(page["records"].as_array().unwrap().len(), 1);
        assert_eq!(page["records"][0]["count"], 1200.0);
        assert_eq!(page["records"][0]["metadata"]["dataOrigin"], "com.example.app");
        assert!(page.get("pageToken").is_none());

        let weight = bridge.read_record("Weight", &ids[1]).unwrap();
        assert_eq!(weight["weight"]["inKilograms"], 72.5);

        bridge.delete_records_by_ids("Weight", &ids[1..]).unwrap();
        assert_eq!(
            bridge.read_record("Weight", &ids[1]).unwrap_err().code(),
            "UNDERLYING_ERROR"
        );
    }

    #[test]
    fn test_read_needs_time_range() {
        let (bridge, _) = bridge();
        let err = bridge.read_records("Steps", &json!({})).unwrap_err();
        assert_eq!(err.code(), "ARGUMENT_VALIDATION_ERROR");

        let err = bridge
            .read_records("Hydration", &json!({ "timeRangeFilter": week() }))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RECORD_TYPE");
    }

    #[test]
    fn test_aggregate_record() {
        let (bridge, _) = bridge();
        bridge
            .insert_records(&[
                json!({
                    "recordType": "Steps",
                    "startTime": "2024-03-01T08:00:00Z",
                    "endTime": "2024-03-01T09:00:00Z",
                    "count": 1200
                }),
                json!({
                    "recordType": "Steps",
                    "startTime": "2024-03-02T08:00:00Z",
                    "endTime": "2024-03-02T09:00:00Z",
                    "count": 800
                }),
            ])
            .unwrap();

        let result = bridge
            .aggregate_record(&json!({ "recordType": "Steps", "timeRangeFilter": week() }))
            .unwrap();
        assert_eq!(result["COUNT_TOTAL"], 2000.0);
        assert_eq!(result["dataOrigins"], json!(["com.example.app"]));

        let err = bridge
            .aggregate_record(&json!({ "recordType": "BodyTemperature", "timeRangeFilter": week() }))
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_ERROR");
    }

    #[test]
    fn test_native_buckets_are_sparse() {
        let (bridge, _) = bridge();
        let steps: Vec<Value> = [1, 3, 4, 6]
            .iter()
            .map(|day| {
                json!({
                    "recordType": "Steps",
                    "startTime": format!("2024-03-0{day}T08:00:00Z"),
                    "endTime": format!("2024-03-0{day}T09:00:00Z"),
                    "count": 100 * day
                })
            })
            .collect();
        bridge.insert_records(&steps).unwrap();

        let buckets = bridge
            .read_bucketed_records("Steps", &json!({ "timeRangeFilter": week() }))
            .unwrap();
        let keys: Vec<&str> = buckets
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["dateKey"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["20240301", "20240303", "20240304", "20240306"]);
        assert_eq!(buckets[1]["entry"]["value"], "300");
        assert_eq!(buckets[1]["entry"]["family"], "HEALTH");
        assert_eq!(buckets[1]["entry"]["type"], "STEPS");
    }

    #[test]
    fn test_manual_buckets_page_through_store() {
        let (bridge, _) = bridge();
        let bridge = bridge.with_config(
            BridgeConfig::default()
                .with_zone(LocalZone::utc())
                .with_default_page_size(2),
        );
        let readings: Vec<Value> = (0..5)
            .map(|i| {
                json!({
                    "recordType": "BloodPressure",
                    "time": format!("2024-03-02T0{i}:00:00Z"),
                    "systolic": { "value": 110 + 5 * i, "unit": "millimetersOfMercury" },
                    "diastolic": { "value": 70, "unit": "millimetersOfMercury" }
                })
            })
            .collect();
        bridge.insert_records(&readings).unwrap();

        let buckets = bridge
            .read_bucketed_records("BloodPressure", &json!({ "timeRangeFilter": week() }))
            .unwrap();
        assert_eq!(
            buckets,
            json!([{
                "dateKey": "20240302",
                "entry": { "type": "PRESSURE", "value": "120/70", "family": "HEALTH" }
            }])
        );
    }

    #[test]
    fn test_sleep_buckets_use_cutoff() {
        let (bridge, _) = bridge();
        bridge
            .insert_records(&[json!({
                "recordType": "SleepSession",
                "startTime": "2024-03-01T22:00:00Z",
                "endTime": "2024-03-02T06:30:00Z"
            })])
            .unwrap();

        let options = json!({
            "timeRangeFilter": {
                "operator": "between",
                "startTime": "2024-02-29T18:00:00Z",
                "endTime": "2024-03-08T18:00:00Z"
            }
        });
        let buckets = bridge.read_bucketed_records("SleepSession", &options).unwrap();
        assert_eq!(buckets.as_array().unwrap().len(), 1);
        assert_eq!(buckets[0]["dateKey"], "20240302");
        assert_eq!(buckets[0]["entry"]["value"], "8:30");
        assert_eq!(
            buckets[0]["entry"]["sleepTimes"]["fellAsleepAt"],
            "2024-03-01 22:00:00.000"
        );
    }

    #[test]
    fn test_change_feed() {
        let (bridge, _) = bridge();
        let first = bridge
            .get_changes(&json!({ "recordTypes": ["Steps", "Hydration"] }))
            .unwrap();
        assert_eq!(first["upsertionChanges"], json!([]));
        let token = first["nextChangesToken"].as_str().unwrap().to_string();

        let ids = bridge
            .insert_records(&[json!({
                "recordType": "Steps",
                "startTime": "2024-03-01T08:00:00Z",
                "endTime": "2024-03-01T09:00:00Z",
                "count": 42
            })])
            .unwrap();
        bridge.delete_records_by_ids("Steps", &ids).unwrap();

        let changes = bridge.get_changes(&json!({ "changesToken": token })).unwrap();
        assert_eq!(changes["upsertionChanges"][0]["record"]["recordType"], "Steps");
        assert_eq!(changes["upsertionChanges"][0]["record"]["count"], 42.0);
        assert_eq!(changes["deletionChanges"], json!([{ "recordId": ids[0] }]));
        assert_eq!(changes["hasMore"], false);
        assert_eq!(changes["changesTokenExpired"], false);
    }

    #[test]
    fn test_permission_round_trip() {
        let store = Arc::new(MemoryStore::default());
        let granting = Arc::clone(&store);
        let bridge = HealthConnectBridge::new(MemoryStoreProvider::new(Arc::clone(&store)))
            .with_permission_launcher(
                move |permissions: Vec<String>, _: &str, responder: PermissionResponder| {
                    let _ = granting.grant(&permissions);
                    responder.respond(permissions);
                },
            );

        let wanted = vec![
            Permission::new(AccessType::Read, "Steps"),
            Permission::new(AccessType::Write, "SleepSession"),
        ];
        assert_eq!(
            bridge.request_permission(&wanted, None).unwrap_err().code(),
            "CLIENT_NOT_INITIALIZED"
        );

        bridge.initialize(None).unwrap();
        assert_eq!(bridge.request_permission(&wanted, None).unwrap(), wanted);
        assert_eq!(bridge.get_granted_permissions().unwrap().len(), 2);

        assert!(bridge.revoke_all_permissions().unwrap().revoked);
        assert!(bridge.get_granted_permissions().unwrap().is_empty());
    }

    #[test]
    fn test_permission_without_launcher() {
        let (bridge, _) = bridge();
        let err = bridge
            .request_permission(&[Permission::new(AccessType::Read, "Steps")], None)
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }
}
