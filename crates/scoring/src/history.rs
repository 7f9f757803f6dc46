//! Prediction history store.
//!
//! Per-participant rolling log of forecasts keyed by bucketed timestamp.
//! Writes and reads share one rounding rule so a lookup for any instant in a
//! bucket finds what was recorded for that bucket.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use common::config::HistoryConfig;
use common::{Forecast, HistoryRecord, ParticipantId};
use schedule::round_down_to_bucket;
use tracing::debug;

/// One participant's forecasts by bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionHistory {
    entries: BTreeMap<DateTime<Utc>, Forecast>,
}

impl PredictionHistory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.keys().next().copied()
    }

    fn upsert(&mut self, bucket: DateTime<Utc>, forecast: Forecast) {
        self.entries.entry(bucket).or_default().merge(forecast);
    }

    /// Drop buckets strictly before `cutoff`; returns how many were removed.
    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries = self.entries.split_off(&cutoff);
        before - self.entries.len()
    }
}

/// All participants' histories.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    bucket_minutes: u32,
    retention: Duration,
    participants: HashMap<ParticipantId, PredictionHistory>,
}

impl HistoryStore {
    pub fn new(bucket_minutes: u32, retention: Duration) -> Self {
        Self {
            bucket_minutes,
            retention,
            participants: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &HistoryConfig) -> Self {
        Self::new(
            cfg.bucket_minutes,
            Duration::hours(i64::from(cfg.retention_hours)),
        )
    }

    /// Canonical key for `timestamp`.
    pub fn bucket(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        round_down_to_bucket(timestamp, self.bucket_minutes)
    }

    /// Record a forecast. Only the fields present in `forecast` are written.
    pub fn add(&mut self, participant: ParticipantId, timestamp: DateTime<Utc>, forecast: Forecast) {
        let forecast = forecast.sanitized();
        if forecast.is_empty() {
            return;
        }
        let bucket = self.bucket(timestamp);
        self.participants
            .entry(participant)
            .or_default()
            .upsert(bucket, forecast);
    }

    /// Forecast stored for the bucket containing `timestamp`; all-absent if none.
    pub fn get(&self, participant: ParticipantId, timestamp: DateTime<Utc>) -> Forecast {
        let bucket = self.bucket(timestamp);
        self.participants
            .get(&participant)
            .and_then(|h| h.entries.get(&bucket))
            .copied()
            .unwrap_or_default()
    }

    /// Remove every entry whose bucket is strictly before `now - retention`.
    pub fn evict_older_than(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let removed: usize = self
            .participants
            .values_mut()
            .map(|h| h.evict_before(cutoff))
            .sum();
        if removed > 0 {
            debug!("Evicted {} history entries older than {}", removed, cutoff);
        }
        removed
    }

    /// Create an empty history for `participant` if it has none.
    pub fn ensure_participant(&mut self, participant: ParticipantId) {
        self.participants.entry(participant).or_default();
    }

    /// Replace `participant`'s history with an empty one.
    pub fn reset_participant(&mut self, participant: ParticipantId) {
        self.participants
            .insert(participant, PredictionHistory::default());
    }

    pub fn remove_participant(&mut self, participant: ParticipantId) -> bool {
        self.participants.remove(&participant).is_some()
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.participants.contains_key(&participant)
    }

    pub fn history(&self, participant: ParticipantId) -> Option<&PredictionHistory> {
        self.participants.get(&participant)
    }

    /// Participant ids, sorted.
    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.participants.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Total stored buckets across participants.
    pub fn total_entries(&self) -> usize {
        self.participants.values().map(PredictionHistory::len).sum()
    }

    /// Persistable copy of every history.
    pub fn snapshot(&self) -> BTreeMap<ParticipantId, Vec<HistoryRecord>> {
        self.participants
            .iter()
            .map(|(id, h)| {
                let records = h
                    .entries
                    .iter()
                    .map(|(bucket, forecast)| HistoryRecord {
                        bucket: *bucket,
                        forecast: *forecast,
                    })
                    .collect();
                (*id, records)
            })
            .collect()
    }

    /// Replace contents with a persisted snapshot. Records are re-bucketed
    /// with the current granularity.
    pub fn restore(&mut self, snapshot: &BTreeMap<ParticipantId, Vec<HistoryRecord>>) {
        self.participants.clear();
        for (id, records) in snapshot {
            self.ensure_participant(*id);
            for record in records {
                self.add(*id, record.bucket, record.forecast);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn store() -> HistoryStore {
        HistoryStore::from_config(&HistoryConfig::default())
    }

    fn point(p: f64) -> Forecast {
        Forecast {
            point: Some(p),
            ..Forecast::default()
        }
    }

    #[test]
    fn lookup_uses_write_rounding() {
        let mut s = store();
        s.add(1, ts("2024-11-14T18:18:16Z"), point(5900.0));

        assert_eq!(s.get(1, ts("2024-11-14T18:15:00Z")).point, Some(5900.0));
        assert_eq!(s.get(1, ts("2024-11-14T18:19:59Z")).point, Some(5900.0));
        assert!(s.get(1, ts("2024-11-14T18:20:00Z")).is_empty());
        assert!(s.get(2, ts("2024-11-14T18:15:00Z")).is_empty());
    }

    #[test]
    fn partial_update_does_not_erase_fields() {
        let mut s = store();
        let at = ts("2024-11-14T15:00:00Z");
        s.add(
            1,
            at,
            Forecast {
                point: Some(7.01),
                interval: Some(Interval::new(6.9, 7.1)),
                direction: None,
            },
        );
        s.add(
            1,
            at,
            Forecast {
                direction: Some(true),
                ..Forecast::default()
            },
        );

        let f = s.get(1, at);
        assert_eq!(f.point, Some(7.01));
        assert_eq!(f.interval, Some(Interval::new(6.9, 7.1)));
        assert_eq!(f.direction, Some(true));
    }

    #[test]
    fn eviction_removes_only_entries_past_retention() {
        let mut s = store();
        s.add(1, ts("2024-11-13T14:55:00Z"), point(1.0));
        s.add(1, ts("2024-11-13T15:00:00Z"), point(2.0));
        s.add(2, ts("2024-11-14T12:00:00Z"), point(3.0));

        let removed = s.evict_older_than(ts("2024-11-14T15:00:00Z"));
        assert_eq!(removed, 1);
        assert!(s.get(1, ts("2024-11-13T14:55:00Z")).is_empty());
        // Exactly at the cutoff is kept.
        assert_eq!(s.get(1, ts("2024-11-13T15:00:00Z")).point, Some(2.0));
        assert_eq!(s.get(2, ts("2024-11-14T12:00:00Z")).point, Some(3.0));
    }

    #[test]
    fn eviction_is_idempotent_at_any_frequency() {
        let mut s = store();
        let start = ts("2024-11-12T00:00:00Z");
        for i in 0..(12 * 48) {
            s.add(1, start + Duration::minutes(5 * i), point(i as f64));
        }

        let now = ts("2024-11-14T00:00:00Z");
        for step in 0..30 {
            s.evict_older_than(now - Duration::minutes(90 - 3 * step));
        }
        s.evict_older_than(now);
        assert_eq!(s.evict_older_than(now), 0);

        let cutoff = now - Duration::hours(24);
        let oldest = s.history(1).and_then(PredictionHistory::oldest).unwrap();
        assert!(oldest >= cutoff);
        assert_eq!(s.history(1).unwrap().len(), 12 * 24);
    }

    #[test]
    fn non_finite_values_are_not_stored() {
        let mut s = store();
        let at = ts("2024-11-14T15:00:00Z");
        s.add(1, at, point(f64::NAN));
        assert!(s.get(1, at).is_empty());
        assert_eq!(s.total_entries(), 0);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut s = store();
        s.add(4, ts("2024-11-14T15:02:00Z"), point(10.0));
        s.ensure_participant(9);

        let mut restored = store();
        restored.restore(&s.snapshot());
        assert_eq!(restored.participants(), vec![4, 9]);
        assert_eq!(restored.get(4, ts("2024-11-14T15:00:00Z")).point, Some(10.0));
    }

    #[test]
    fn reset_and_remove_participant() {
        let mut s = store();
        let at = ts("2024-11-14T15:00:00Z");
        s.add(1, at, point(1.0));
        s.reset_participant(1);
        assert!(s.contains(1));
        assert!(s.get(1, at).is_empty());
        assert!(s.remove_participant(1));
        assert!(!s.contains(1));
    }
}
