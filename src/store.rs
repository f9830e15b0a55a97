//! In-memory health store
//!
//! A host-free [`HealthStore`] with native aggregation, duration bucketing,
//! offset paging and a change feed. Used by the CLI, by tests, and by embedders
//! that have no platform store to bridge to.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::platform::{
    AggregateGroupByDurationRequest, AggregateRequest, AggregationResult,
    AggregationResultGroupedByDuration, Change, ChangesResponse, ChangesTokenRequest, HealthStore,
    HealthStoreProvider, Metric, MetricValue, ReadRecordsRequest, ReadRecordsResponse,
    RevokeAllPermissionsResponse, SdkStatus, TimeRangeFilter,
};
use crate::types::{Record, RecordType};
use crate::units::{Mass, Pressure};

/// Origin stamped on records inserted without one
pub const DEFAULT_DATA_ORIGIN: &str = "com.synheart.healthbridge";

/// Maximum changes returned by one `get_changes` call
const CHANGES_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
enum LoggedChange {
    Upsert(Record),
    Delete {
        record_type: RecordType,
        record_id: String,
        data_origin: String,
    },
}

impl LoggedChange {
    fn record_type(&self) -> RecordType {
        match self {
            LoggedChange::Upsert(record) => record.record_type(),
            LoggedChange::Delete { record_type, .. } => *record_type,
        }
    }

    fn data_origin(&self) -> &str {
        match self {
            LoggedChange::Upsert(record) => &record.metadata().data_origin,
            LoggedChange::Delete { data_origin, .. } => data_origin,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenState {
    position: usize,
    record_types: Vec<RecordType>,
    data_origins: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Record>,
    changes: Vec<LoggedChange>,
    tokens: HashMap<String, TokenState>,
    granted: BTreeSet<String>,
}

/// Thread-safe in-memory record store
#[derive(Debug)]
pub struct MemoryStore {
    data_origin: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(data_origin: impl Into<String>) -> Self {
        Self {
            data_origin: data_origin.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_granted_permissions<I, S>(self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut inner) = self.inner.lock() {
            inner.granted.extend(permissions.into_iter().map(Into::into));
        }
        self
    }

    /// Record platform permission strings as granted
    pub fn grant(&self, permissions: &[String]) -> Result<(), BridgeError> {
        self.lock()?.granted.extend(permissions.iter().cloned());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, BridgeError> {
        self.inner
            .lock()
            .map_err(|_| BridgeError::ServiceUnavailable("health store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_ORIGIN)
    }
}

fn in_range(record: &Record, filter: &TimeRangeFilter) -> bool {
    let (start, end) = record.span();
    if record.record_type().is_interval() {
        filter.overlaps(start, end)
    } else {
        filter.contains(start)
    }
}

fn origin_allowed(origin: &str, filter: &[String]) -> bool {
    filter.is_empty() || filter.iter().any(|o| o == origin)
}

fn matching<'a>(
    records: &'a [Record],
    record_type: RecordType,
    filter: &TimeRangeFilter,
    origins: &[String],
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|r| r.record_type() == record_type)
        .filter(|r| in_range(r, filter))
        .filter(|r| origin_allowed(&r.metadata().data_origin, origins))
        .collect()
}

// ============================================================================
// Aggregation
// ============================================================================

enum Reduce {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

fn reduction(metric: Metric) -> Reduce {
    match metric {
        Metric::StepsCountTotal | Metric::SleepDurationTotal => Reduce::Sum,
        Metric::HeartRateMeasurementsCount => Reduce::Count,
        Metric::HeartRateBpmAvg
        | Metric::RestingHeartRateBpmAvg
        | Metric::WeightAvg
        | Metric::SystolicAvg
        | Metric::DiastolicAvg => Reduce::Avg,
        Metric::HeartRateBpmMin
        | Metric::RestingHeartRateBpmMin
        | Metric::WeightMin
        | Metric::SystolicMin
        | Metric::DiastolicMin => Reduce::Min,
        Metric::HeartRateBpmMax
        | Metric::RestingHeartRateBpmMax
        | Metric::WeightMax
        | Metric::SystolicMax
        | Metric::DiastolicMax => Reduce::Max,
    }
}

/// Raw values a record contributes to a metric
fn series(metric: Metric, record: &Record, filter: &TimeRangeFilter) -> Vec<f64> {
    match (metric, record) {
        (Metric::StepsCountTotal, Record::Steps(r)) => {
            vec![prorated(r.count as f64, r.start_time, r.end_time, filter)]
        }
        (
            Metric::HeartRateBpmAvg
            | Metric::HeartRateBpmMax
            | Metric::HeartRateBpmMin
            | Metric::HeartRateMeasurementsCount,
            Record::HeartRate(r),
        ) => r
            .samples
            .iter()
            .filter(|s| filter.contains(s.time))
            .map(|s| s.beats_per_minute as f64)
            .collect(),
        (
            Metric::RestingHeartRateBpmAvg
            | Metric::RestingHeartRateBpmMax
            | Metric::RestingHeartRateBpmMin,
            Record::RestingHeartRate(r),
        ) => vec![r.beats_per_minute as f64],
        (Metric::WeightAvg | Metric::WeightMax | Metric::WeightMin, Record::Weight(r)) => {
            vec![r.weight.in_grams()]
        }
        (Metric::SystolicAvg | Metric::SystolicMin | Metric::SystolicMax, Record::BloodPressure(r)) => {
            vec![r.systolic.in_millimeters_of_mercury()]
        }
        (
            Metric::DiastolicAvg | Metric::DiastolicMin | Metric::DiastolicMax,
            Record::BloodPressure(r),
        ) => vec![r.diastolic.in_millimeters_of_mercury()],
        (Metric::SleepDurationTotal, Record::SleepSession(r)) => {
            vec![clipped_seconds(r.start_time, r.end_time, filter) as f64]
        }
        _ => Vec::new(),
    }
}

fn clipped(start: DateTime<Utc>, end: DateTime<Utc>, filter: &TimeRangeFilter) -> Duration {
    let start = filter.start().map_or(start, |s| start.max(s));
    let end = filter.end().map_or(end, |e| end.min(e));
    (end - start).max(Duration::zero())
}

fn clipped_seconds(start: DateTime<Utc>, end: DateTime<Utc>, filter: &TimeRangeFilter) -> i64 {
    clipped(start, end, filter).num_seconds()
}

/// Share of `total` falling inside the filter, by overlap with `[start, end)`
fn prorated(total: f64, start: DateTime<Utc>, end: DateTime<Utc>, filter: &TimeRangeFilter) -> f64 {
    let span = (end - start).num_milliseconds();
    if span <= 0 {
        return total;
    }
    total * clipped(start, end, filter).num_milliseconds() as f64 / span as f64
}

fn reduce(how: Reduce, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(match how {
        Reduce::Sum => values.iter().sum(),
        Reduce::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Reduce::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Reduce::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Reduce::Count => values.len() as f64,
    })
}

fn wrap(metric: Metric, value: f64) -> MetricValue {
    match metric.record_type() {
        RecordType::Weight => MetricValue::Mass(Mass::grams(value)),
        RecordType::BloodPressure => MetricValue::Pressure(Pressure::millimeters_of_mercury(value)),
        RecordType::SleepSession => MetricValue::Duration(Duration::seconds(value as i64)),
        _ => MetricValue::Long(value.round() as i64),
    }
}

fn aggregate_records(
    records: &[Record],
    metrics: &[Metric],
    filter: &TimeRangeFilter,
    origins: &[String],
) -> AggregationResult {
    let mut result = AggregationResult::default();
    let mut contributing: BTreeSet<String> = BTreeSet::new();

    for metric in metrics {
        let mut values = Vec::new();
        for record in matching(records, metric.record_type(), filter, origins) {
            let contributed = series(*metric, record, filter);
            if !contributed.is_empty() {
                contributing.insert(record.metadata().data_origin.clone());
                values.extend(contributed);
            }
        }
        if let Some(value) = reduce(reduction(*metric), &values) {
            result.insert(*metric, wrap(*metric, value));
        }
    }

    result.data_origins = contributing.into_iter().collect();
    result
}

// ============================================================================
// HealthStore
// ============================================================================

impl HealthStore for MemoryStore {
    fn read_records(&self, request: &ReadRecordsRequest) -> Result<ReadRecordsResponse, BridgeError> {
        let inner = self.lock()?;
        let mut found = matching(
            &inner.records,
            request.record_type,
            &request.time_range_filter,
            &request.data_origin_filter,
        );
        found.sort_by_key(|r| r.span().0);
        if !request.ascending_order {
            found.reverse();
        }

        let offset = match &request.page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| BridgeError::invalid_argument(format!("Invalid page token: {token}")))?,
            None => 0,
        };
        let page_size = request.page_size.max(1);
        let records: Vec<Record> = found
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|r| (*r).clone())
            .collect();
        let next = offset + records.len();

        Ok(ReadRecordsResponse {
            records,
            page_token: (next < found.len()).then(|| next.to_string()),
        })
    }

    fn read_record(&self, record_type: RecordType, id: &str) -> Result<Record, BridgeError> {
        self.lock()?
            .records
            .iter()
            .find(|r| r.record_type() == record_type && r.metadata().id == id)
            .cloned()
            .ok_or_else(|| BridgeError::Underlying(format!("No {record_type} record with id {id}")))
    }

    fn insert_records(&self, records: Vec<Record>) -> Result<Vec<String>, BridgeError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(records.len());

        for mut record in records {
            let metadata = record.metadata_mut();
            if metadata.data_origin.is_empty() {
                metadata.data_origin = self.data_origin.clone();
            }
            metadata.last_modified_time = now;

            // Same client id from the same origin replaces the stored record
            let existing = metadata.client_record_id.as_ref().and_then(|client_id| {
                let origin = &metadata.data_origin;
                inner.records.iter().position(|r| {
                    r.metadata().client_record_id.as_ref() == Some(client_id)
                        && &r.metadata().data_origin == origin
                })
            });

            match existing {
                Some(index) => {
                    record.metadata_mut().id = inner.records[index].metadata().id.clone();
                    inner.records[index] = record.clone();
                }
                None => {
                    if record.metadata().id.is_empty() {
                        record.metadata_mut().id = Uuid::new_v4().to_string();
                    }
                    inner.records.push(record.clone());
                }
            }

            ids.push(record.metadata().id.clone());
            inner.changes.push(LoggedChange::Upsert(record));
        }

        log::debug!("memory store: inserted {} records", ids.len());
        Ok(ids)
    }

    fn delete_records(&self, record_type: RecordType, ids: &[String]) -> Result<(), BridgeError> {
        let mut inner = self.lock()?;
        let (removed, kept): (Vec<Record>, Vec<Record>) = std::mem::take(&mut inner.records)
            .into_iter()
            .partition(|r| r.record_type() == record_type && ids.contains(&r.metadata().id));
        inner.records = kept;

        for record in removed {
            inner.changes.push(LoggedChange::Delete {
                record_type,
                record_id: record.metadata().id.clone(),
                data_origin: record.metadata().data_origin.clone(),
            });
        }
        Ok(())
    }

    fn aggregate(&self, request: &AggregateRequest) -> Result<AggregationResult, BridgeError> {
        let inner = self.lock()?;
        Ok(aggregate_records(
            &inner.records,
            &request.metrics,
            &request.time_range_filter,
            &request.data_origin_filter,
        ))
    }

    fn aggregate_group_by_duration(
        &self,
        request: &AggregateGroupByDurationRequest,
    ) -> Result<Vec<AggregationResultGroupedByDuration>, BridgeError> {
        let TimeRangeFilter::Between { start, end } = request.time_range_filter else {
            return Err(BridgeError::invalid_argument(
                "Grouped aggregation needs a time range with both bounds",
            ));
        };
        if request.slicer <= Duration::zero() {
            return Err(BridgeError::invalid_argument("Bucket length must be positive"));
        }

        let inner = self.lock()?;
        let mut buckets = Vec::new();
        let mut bucket_start = start;
        while bucket_start < end {
            let bucket_end = (bucket_start + request.slicer).min(end);
            let window = TimeRangeFilter::Between {
                start: bucket_start,
                end: bucket_end,
            };
            buckets.push(AggregationResultGroupedByDuration {
                result: aggregate_records(
                    &inner.records,
                    &request.metrics,
                    &window,
                    &request.data_origin_filter,
                ),
                start_time: bucket_start,
                end_time: bucket_end,
            });
            bucket_start = bucket_end;
        }
        Ok(buckets)
    }

    fn get_changes_token(&self, request: &ChangesTokenRequest) -> Result<String, BridgeError> {
        let mut inner = self.lock()?;
        let token = Uuid::new_v4().to_string();
        let state = TokenState {
            position: inner.changes.len(),
            record_types: request.record_types.clone(),
            data_origins: request.data_origin_filters.clone(),
        };
        inner.tokens.insert(token.clone(), state);
        Ok(token)
    }

    fn get_changes(&self, token: &str) -> Result<ChangesResponse, BridgeError> {
        let mut inner = self.lock()?;
        let state = inner
            .tokens
            .remove(token)
            .ok_or_else(|| BridgeError::invalid_argument(format!("Unknown changes token: {token}")))?;

        let mut changes = Vec::new();
        let mut position = state.position;
        for logged in inner.changes.iter().skip(state.position) {
            if changes.len() == CHANGES_PAGE_SIZE {
                break;
            }
            position += 1;
            let type_ok =
                state.record_types.is_empty() || state.record_types.contains(&logged.record_type());
            if !type_ok || !origin_allowed(logged.data_origin(), &state.data_origins) {
                continue;
            }
            changes.push(match logged {
                LoggedChange::Upsert(record) => Change::Upsertion(record.clone()),
                LoggedChange::Delete { record_id, .. } => Change::Deletion {
                    record_id: record_id.clone(),
                },
            });
        }
        let has_more = position < inner.changes.len();

        let next_token = Uuid::new_v4().to_string();
        inner.tokens.insert(
            next_token.clone(),
            TokenState {
                position,
                ..state
            },
        );

        Ok(ChangesResponse {
            changes,
            next_changes_token: next_token,
            has_more,
            changes_token_expired: false,
        })
    }

    fn get_granted_permissions(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.lock()?.granted.iter().cloned().collect())
    }

    fn revoke_all_permissions(&self) -> Result<RevokeAllPermissionsResponse, BridgeError> {
        self.lock()?.granted.clear();
        Ok(RevokeAllPermissionsResponse {
            revoked: true,
            requires_restart: None,
            message: None,
        })
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Provider handing out one shared [`MemoryStore`]
pub struct MemoryStoreProvider {
    store: Arc<MemoryStore>,
    status: SdkStatus,
}

impl MemoryStoreProvider {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            status: SdkStatus::Available,
        }
    }

    pub fn with_status(mut self, status: SdkStatus) -> Self {
        self.status = status;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Default for MemoryStoreProvider {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }
}

impl HealthStoreProvider for MemoryStoreProvider {
    type Store = MemoryStore;

    fn sdk_status(&self, _provider_package: &str) -> SdkStatus {
        self.status
    }

    fn create_client(&self, provider_package: &str) -> Result<Arc<MemoryStore>, BridgeError> {
        match self.status {
            SdkStatus::Available => Ok(Arc::clone(&self.store)),
            SdkStatus::ProviderUpdateRequired => Err(BridgeError::SdkVersion(format!(
                "{provider_package} needs an update"
            ))),
            SdkStatus::Unavailable => Err(BridgeError::ServiceUnavailable(format!(
                "{provider_package} is not available"
            ))),
        }
    }

    fn open_settings(&self) -> Result<(), BridgeError> {
        log::info!("memory store has no settings screen");
        Ok(())
    }

    fn open_data_management(&self, provider_package: Option<&str>) -> Result<(), BridgeError> {
        log::info!(
            "memory store has no data management screen ({})",
            provider_package.unwrap_or("default provider")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        HeartRateRecord, HeartRateSample, Metadata, SleepSessionRecord, StepsRecord, WeightRecord,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn steps(day: u32, hour: u32, count: i64) -> Record {
        Record::Steps(StepsRecord {
            start_time: at(day, hour),
            end_time: at(day, hour + 1),
            count,
            metadata: Metadata::default(),
        })
    }

    fn week() -> TimeRangeFilter {
        TimeRangeFilter::Between {
            start: at(1, 0),
            end: at(8, 0),
        }
    }

    #[test]
    fn test_insert_assigns_ids_and_origin() {
        let store = MemoryStore::default();
        let ids = store.insert_records(vec![steps(1, 8, 100), steps(1, 9, 200)]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);

        let record = store.read_record(RecordType::Steps, &ids[0]).unwrap();
        assert_eq!(record.metadata().data_origin, DEFAULT_DATA_ORIGIN);
        assert_eq!(
            store.read_record(RecordType::Weight, &ids[0]).unwrap_err().code(),
            "UNDERLYING_ERROR"
        );
    }

    #[test]
    fn test_client_record_id_upserts() {
        let store = MemoryStore::default();
        let mut first = steps(1, 8, 100);
        first.metadata_mut().client_record_id = Some("walk-1".to_string());
        let mut second = steps(1, 8, 150);
        second.metadata_mut().client_record_id = Some("walk-1".to_string());

        let a = store.insert_records(vec![first]).unwrap();
        let b = store.insert_records(vec![second]).unwrap();
        assert_eq!(a, b);

        let total = store
            .aggregate(&AggregateRequest {
                metrics: vec![Metric::StepsCountTotal],
                time_range_filter: week(),
                data_origin_filter: vec![],
            })
            .unwrap();
        assert_eq!(total.get_long(Metric::StepsCountTotal), Some(150));
    }

    #[test]
    fn test_paging_and_order() {
        let store = MemoryStore::default();
        store
            .insert_records((0..5).map(|h| steps(2, h, h as i64)).collect())
            .unwrap();

        let mut request = ReadRecordsRequest {
            record_type: RecordType::Steps,
            time_range_filter: week(),
            data_origin_filter: vec![],
            ascending_order: true,
            page_size: 2,
            page_token: None,
        };
        let mut counts = Vec::new();
        loop {
            let page = store.read_records(&request).unwrap();
            counts.extend(page.records.iter().map(|r| match r {
                Record::Steps(s) => s.count,
                _ => -1,
            }));
            match page.page_token {
                Some(token) => request.page_token = Some(token),
                None => break,
            }
        }
        assert_eq!(counts, vec![0, 1, 2, 3, 4]);

        request.ascending_order = false;
        request.page_token = None;
        request.page_size = 1;
        let page = store.read_records(&request).unwrap();
        assert!(matches!(&page.records[0], Record::Steps(s) if s.count == 4));

        request.page_token = Some("abc".to_string());
        assert_eq!(
            store.read_records(&request).unwrap_err().code(),
            "ARGUMENT_VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_instant_filter_is_half_open() {
        let store = MemoryStore::default();
        store
            .insert_records(vec![
                Record::Weight(WeightRecord {
                    time: at(1, 0),
                    weight: Mass::kilograms(70.0),
                    metadata: Metadata::default(),
                }),
                Record::Weight(WeightRecord {
                    time: at(8, 0),
                    weight: Mass::kilograms(90.0),
                    metadata: Metadata::default(),
                }),
            ])
            .unwrap();

        let result = store
            .aggregate(&AggregateRequest {
                metrics: vec![Metric::WeightAvg, Metric::WeightMax],
                time_range_filter: week(),
                data_origin_filter: vec![],
            })
            .unwrap();
        assert_eq!(result.get_mass(Metric::WeightMax), Some(Mass::kilograms(70.0)));
    }

    #[test]
    fn test_heart_rate_aggregate() {
        let store = MemoryStore::new("com.example.watch");
        store
            .insert_records(vec![Record::HeartRate(HeartRateRecord {
                start_time: at(1, 8),
                end_time: at(1, 9),
                samples: vec![
                    HeartRateSample { time: at(1, 8), beats_per_minute: 60 },
                    HeartRateSample { time: at(1, 8) + Duration::minutes(30), beats_per_minute: 71 },
                    HeartRateSample { time: at(1, 9) - Duration::minutes(1), beats_per_minute: 90 },
                ],
                metadata: Metadata::default(),
            })])
            .unwrap();

        let result = store
            .aggregate(&AggregateRequest {
                metrics: vec![
                    Metric::HeartRateBpmAvg,
                    Metric::HeartRateBpmMin,
                    Metric::HeartRateBpmMax,
                    Metric::HeartRateMeasurementsCount,
                ],
                time_range_filter: week(),
                data_origin_filter: vec![],
            })
            .unwrap();
        assert_eq!(result.get_long(Metric::HeartRateBpmAvg), Some(74));
        assert_eq!(result.get_long(Metric::HeartRateBpmMin), Some(60));
        assert_eq!(result.get_long(Metric::HeartRateBpmMax), Some(90));
        assert_eq!(result.get_long(Metric::HeartRateMeasurementsCount), Some(3));
        assert_eq!(result.data_origins, vec!["com.example.watch".to_string()]);
    }

    #[test]
    fn test_group_by_duration_covers_range() {
        let store = MemoryStore::default();
        store
            .insert_records(vec![steps(1, 8, 100), steps(3, 8, 300), steps(3, 12, 50)])
            .unwrap();

        let buckets = store
            .aggregate_group_by_duration(&AggregateGroupByDurationRequest {
                metrics: vec![Metric::StepsCountTotal],
                time_range_filter: week(),
                data_origin_filter: vec![],
                slicer: Duration::days(1),
            })
            .unwrap();
        assert_eq!(buckets.len(), 7);
        let totals: Vec<_> = buckets
            .iter()
            .map(|b| b.result.get_long(Metric::StepsCountTotal))
            .collect();
        assert_eq!(
            totals,
            vec![Some(100), None, Some(350), None, None, None, None]
        );

        let open = store.aggregate_group_by_duration(&AggregateGroupByDurationRequest {
            metrics: vec![Metric::StepsCountTotal],
            time_range_filter: TimeRangeFilter::After { start: at(1, 0) },
            data_origin_filter: vec![],
            slicer: Duration::days(1),
        });
        assert_eq!(open.unwrap_err().code(), "ARGUMENT_VALIDATION_ERROR");
    }

    #[test]
    fn test_steps_split_across_midnight() {
        let store = MemoryStore::default();
        store
            .insert_records(vec![Record::Steps(StepsRecord {
                start_time: at(1, 23),
                end_time: at(2, 1),
                count: 100,
                metadata: Metadata::default(),
            })])
            .unwrap();

        let total = store
            .aggregate(&AggregateRequest {
                metrics: vec![Metric::StepsCountTotal],
                time_range_filter: week(),
                data_origin_filter: vec![],
            })
            .unwrap();
        assert_eq!(total.get_long(Metric::StepsCountTotal), Some(100));

        let buckets = store
            .aggregate_group_by_duration(&AggregateGroupByDurationRequest {
                metrics: vec![Metric::StepsCountTotal],
                time_range_filter: week(),
                data_origin_filter: vec![],
                slicer: Duration::days(1),
            })
            .unwrap();
        let totals: Vec<_> = buckets
            .iter()
            .map(|b| b.result.get_long(Metric::StepsCountTotal))
            .collect();
        assert_eq!(
            totals,
            vec![Some(50), Some(50), None, None, None, None, None]
        );
    }

    #[test]
    fn test_sleep_duration_is_clipped_to_window() {
        let store = MemoryStore::default();
        store
            .insert_records(vec![Record::SleepSession(SleepSessionRecord {
                start_time: at(1, 22),
                end_time: at(2, 6),
                title: None,
                notes: None,
                stages: vec![],
                metadata: Metadata::default(),
            })])
            .unwrap();

        let result = store
            .aggregate(&AggregateRequest {
                metrics: vec![Metric::SleepDurationTotal],
                time_range_filter: TimeRangeFilter::Between {
                    start: at(2, 0),
                    end: at(3, 0),
                },
                data_origin_filter: vec![],
            })
            .unwrap();
        assert_eq!(
            result.get_duration(Metric::SleepDurationTotal),
            Some(Duration::hours(6))
        );
    }

    #[test]
    fn test_change_feed() {
        let store = MemoryStore::default();
        let token = store
            .get_changes_token(&ChangesTokenRequest {
                record_types: vec![RecordType::Steps],
                data_origin_filters: vec![],
            })
            .unwrap();

        let ids = store.insert_records(vec![steps(1, 8, 100)]).unwrap();
        store
            .insert_records(vec![Record::Weight(WeightRecord {
                time: at(1, 8),
                weight: Mass::kilograms(70.0),
                metadata: Metadata::default(),
            })])
            .unwrap();
        store.delete_records(RecordType::Steps, &ids).unwrap();

        let response = store.get_changes(&token).unwrap();
        assert_eq!(response.changes.len(), 2);
        assert!(matches!(response.changes[0], Change::Upsertion(Record::Steps(_))));
        assert_eq!(
            response.changes[1],
            Change::Deletion {
                record_id: ids[0].clone()
            }
        );
        assert!(!response.has_more);

        let next = store.get_changes(&response.next_changes_token).unwrap();
        assert!(next.changes.is_empty());
        assert_eq!(store.lock().unwrap().tokens.len(), 1);
        assert_eq!(
            store.get_changes(&token).unwrap_err().code(),
            "ARGUMENT_VALIDATION_ERROR"
        );

        assert_eq!(
            store.get_changes("nope").unwrap_err().code(),
            "ARGUMENT_VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_permissions() {
        let store = MemoryStore::default()
            .with_granted_permissions(["android.permission.health.READ_STEPS"]);
        store
            .grant(&["android.permission.health.READ_SLEEP".to_string()])
            .unwrap();
        assert_eq!(store.get_granted_permissions().unwrap().len(), 2);

        let response = store.revoke_all_permissions().unwrap();
        assert!(response.revoked);
        assert!(store.get_granted_permissions().unwrap().is_empty());
    }

    #[test]
    fn test_provider_status() {
        let provider = MemoryStoreProvider::default().with_status(SdkStatus::ProviderUpdateRequired);
        assert_eq!(provider.sdk_status("pkg").code(), 2);
        assert_eq!(
            provider.create_client("pkg").unwrap_err().code(),
            "SDK_VERSION_ERROR"
        );
    }
}
