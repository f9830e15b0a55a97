//! Manual bucketing engine
//!
//! Day grouping and averaging for record types the store cannot bucket
//! natively, plus the sleep-interval merge that turns staged sleep sessions into
//! one summary per sleep day.
//!
//! Everything here is pure in-memory computation over already-fetched records.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::envelope::{
    format_date_key, format_duration, format_local_string, format_sleep_date_key, BucketEnvelope,
    LocalZone, SleepTimes, TimesInBed,
};
use crate::types::{sleep_stage, SleepSessionRecord};

/// Group items by the local day key of their timestamp, ordered by key
pub fn group_by_day<'a, R>(
    items: &'a [R],
    time: impl Fn(&R) -> DateTime<Utc>,
    zone: &LocalZone,
) -> BTreeMap<String, Vec<&'a R>> {
    let mut by_day: BTreeMap<String, Vec<&R>> = BTreeMap::new();
    for item in items {
        by_day
            .entry(format_date_key(&time(item), zone))
            .or_default()
            .push(item);
    }
    by_day
}

/// Arithmetic mean; 0.0 for an empty input
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

// ============================================================================
// Sleep
// ============================================================================

/// Coarse sleep classification used for bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SleepTag {
    InBed,
    Asleep,
    Awake,
}

impl SleepTag {
    pub fn from_stage(stage: i32) -> Self {
        match stage {
            sleep_stage::AWAKE | sleep_stage::OUT_OF_BED | sleep_stage::UNKNOWN => SleepTag::Awake,
            sleep_stage::AWAKE_IN_BED => SleepTag::InBed,
            _ => SleepTag::Asleep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSample {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tag: SleepTag,
}

impl SleepSample {
    fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Samples for one session. A session without stages is a manual entry and
/// counts as both asleep and in bed over its whole span.
pub fn sleep_samples(record: &SleepSessionRecord) -> Vec<SleepSample> {
    if record.stages.is_empty() {
        return [SleepTag::Asleep, SleepTag::InBed]
            .into_iter()
            .map(|tag| SleepSample {
                start: record.start_time,
                end: record.end_time,
                tag,
            })
            .collect();
    }

    record
        .stages
        .iter()
        .map(|stage| SleepSample {
            start: stage.start_time,
            end: stage.end_time,
            tag: SleepTag::from_stage(stage.stage),
        })
        .collect()
}

/// Merge samples of one tag: sort by start, drop samples contained in the
/// previous one, extend the previous one on partial overlap.
pub fn merge_samples(mut samples: Vec<SleepSample>) -> Vec<SleepSample> {
    samples.sort_by_key(|s| (s.start, s.end));

    samples
        .into_iter()
        .fold(Vec::new(), |mut merged: Vec<SleepSample>, sample| {
            match merged.last().copied() {
                Some(last) if last.end > sample.start && last.end >= sample.end => {}
                Some(last) if last.end > sample.start => {
                    merged.pop();
                    merged.push(SleepSample {
                        start: last.start,
                        ..sample
                    });
                }
                _ => merged.push(sample),
            }
            merged
        })
}

/// Per sleep-day summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SleepValue {
    /// Total seconds asleep (time in bed when no asleep samples exist)
    pub duration_seconds: i64,
    pub in_bed: Option<DateTime<Utc>>,
    pub out_of_bed: Option<DateTime<Utc>>,
    pub fell_asleep: Option<DateTime<Utc>>,
    pub woke_up: Option<DateTime<Utc>>,
}

impl SleepValue {
    fn from_groups(in_bed: &[SleepSample], asleep: &[SleepSample]) -> Self {
        let mut value = SleepValue {
            duration_seconds: asleep.iter().map(SleepSample::seconds).sum(),
            in_bed: in_bed.iter().map(|s| s.start).min(),
            out_of_bed: in_bed.iter().map(|s| s.end).max(),
            fell_asleep: asleep.iter().map(|s| s.start).min(),
            woke_up: asleep.iter().map(|s| s.end).max(),
        };

        if asleep.is_empty() {
            if let (Some(start), Some(end)) = (value.in_bed, value.out_of_bed) {
                value.duration_seconds = (end - start).num_seconds();
            }
        }
        value
    }

    pub fn to_envelope(&self, date_key: &str, result_type: &str, zone: &LocalZone) -> BucketEnvelope {
        let mut envelope =
            BucketEnvelope::new(date_key, result_type, format_duration(self.duration_seconds));
        let local = |t: &Option<DateTime<Utc>>| t.as_ref().map(|t| format_local_string(t, zone));

        if self.in_bed.is_some() || self.out_of_bed.is_some() {
            envelope.entry.times_in_bed = Some(TimesInBed {
                in_bed_at: local(&self.in_bed),
                out_of_bed_at: local(&self.out_of_bed),
            });
        }
        if self.fell_asleep.is_some() || self.woke_up.is_some() {
            envelope.entry.sleep_times = Some(SleepTimes {
                fell_asleep_at: local(&self.fell_asleep),
                woke_up_at: local(&self.woke_up),
            });
        }
        envelope
    }
}

/// Merge sessions into one [`SleepValue`] per sleep day, keyed by day
pub fn bucket_sleep(
    records: &[SleepSessionRecord],
    cutoff_hour: u32,
    zone: &LocalZone,
) -> BTreeMap<String, SleepValue> {
    let mut groups: BTreeMap<String, BTreeMap<SleepTag, Vec<SleepSample>>> = BTreeMap::new();

    for sample in records.iter().flat_map(sleep_samples) {
        if sample.tag == SleepTag::Awake {
            continue;
        }
        groups
            .entry(format_sleep_date_key(&sample.start, cutoff_hour, zone))
            .or_default()
            .entry(sample.tag)
            .or_default()
            .push(sample);
    }

    log::debug!(
        "sleep bucketing: {} sessions into {} days (cutoff {}h)",
        records.len(),
        groups.len(),
        cutoff_hour
    );

    groups
        .into_iter()
        .map(|(day, mut by_tag)| {
            let in_bed = merge_samples(by_tag.remove(&SleepTag::InBed).unwrap_or_default());
            let asleep = merge_samples(by_tag.remove(&SleepTag::Asleep).unwrap_or_default());
            (day, SleepValue::from_groups(&in_bed, &asleep))
        })
        .collect()
}

/// Sleep envelopes ordered by day key
pub fn sleep_envelopes(
    records: &[SleepSessionRecord],
    cutoff_hour: u32,
    zone: &LocalZone,
    result_type: &str,
) -> Vec<BucketEnvelope> {
    bucket_sleep(records, cutoff_hour, zone)
        .iter()
        .map(|(day, value)| value.to_envelope(day, result_type, zone))
        .collect()
}
