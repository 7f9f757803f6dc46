//! Scoring engine.
//!
//! Scores matured forecasts against ground truth under one of two profiles.
//! `PointInterval` yields rank shares that are meant to be smoothed;
//! `PointDirection` yields normalized rewards that replace the weight table.

use std::collections::BTreeSet;

use common::config::{ScoringConfig, ScoringProfile};
use common::{Forecast, GroundTruth, ParticipantId, WeightMap};
use tracing::{debug, warn};

use crate::rank::{dense_ranks, shares_by_rank, RankOrder};

/// Result of scoring one epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum EpochOutcome {
    /// Per-epoch shares to feed the smoother.
    Shares(WeightMap),
    /// Final normalized rewards; bypass the smoother.
    Rewards(WeightMap),
}

impl EpochOutcome {
    pub fn scores(&self) -> &WeightMap {
        match self {
            EpochOutcome::Shares(m) | EpochOutcome::Rewards(m) => m,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scores().is_empty()
    }
}

/// Profile-selected scorer.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    profile: ScoringProfile,
    decay_base: f64,
    width_scale: f64,
    softmax_rate: f64,
}

impl ScoringEngine {
    pub fn from_config(cfg: &ScoringConfig) -> Self {
        Self {
            profile: cfg.profile,
            decay_base: cfg.decay_base,
            width_scale: cfg.interval_width_scale,
            softmax_rate: cfg.softmax_rate,
        }
    }

    pub fn profile(&self) -> ScoringProfile {
        self.profile
    }

    /// Score `forecasts` (eligibility order) against `truth`.
    pub fn score(&self, truth: &GroundTruth, forecasts: &[(ParticipantId, Forecast)]) -> EpochOutcome {
        match self.profile {
            ScoringProfile::PointInterval => {
                EpochOutcome::Shares(self.point_interval_shares(truth.price_now, forecasts))
            }
            ScoringProfile::PointDirection => {
                EpochOutcome::Rewards(self.direction_rewards(truth, forecasts))
            }
        }
    }

    // ── Point + interval blend ────────────────────────────────────────

    fn point_interval_shares(&self, actual: f64, forecasts: &[(ParticipantId, Forecast)]) -> WeightMap {
        if !actual.is_finite() || actual <= 0.0 {
            warn!("Ground truth {} is not a positive price; no shares this epoch", actual);
            return WeightMap::new();
        }
        let point = self.point_shares(actual, forecasts);
        let interval = self.interval_shares(actual, forecasts);
        combine_shares(&point, &interval)
    }

    /// Relative point error ranked ascending. Absent points get no share.
    pub fn point_shares(&self, actual: f64, forecasts: &[(ParticipantId, Forecast)]) -> WeightMap {
        let errors: Vec<(ParticipantId, f64)> = forecasts
            .iter()
            .filter_map(|(id, f)| {
                f.point
                    .filter(|p| p.is_finite())
                    .map(|p| (*id, (p - actual).abs() / actual))
            })
            .collect();
        shares_by_rank(&errors, RankOrder::Ascending, self.decay_base)
    }

    /// Inclusion times tightness, ranked descending. Missing or inverted
    /// intervals get no share.
    pub fn interval_shares(&self, actual: f64, forecasts: &[(ParticipantId, Forecast)]) -> WeightMap {
        let quality: Vec<(ParticipantId, f64)> = forecasts
            .iter()
            .filter_map(|(id, f)| {
                let interval = f.interval.filter(|i| i.is_well_formed())?;
                let inclusion = if interval.contains(actual) { 1.0 } else { 0.0 };
                let tightness = 1.0 / (1.0 + interval.width() * self.width_scale);
                Some((*id, inclusion * tightness))
            })
            .collect();
        shares_by_rank(&quality, RankOrder::Descending, self.decay_base)
    }

    // ── Point + direction ─────────────────────────────────────────────

    /// Softmax over dense ranks; wrong or missing direction demotes a
    /// participant behind everyone with a correct one.
    pub fn direction_rewards(&self, truth: &GroundTruth, forecasts: &[(ParticipantId, Forecast)]) -> WeightMap {
        if forecasts.is_empty() {
            return WeightMap::new();
        }
        let ranks = self.direction_ranks(truth, forecasts);
        let raw: Vec<f64> = ranks
            .iter()
            .map(|r| (-self.softmax_rate * *r as f64).exp())
            .collect();
        let total: f64 = raw.iter().sum();

        forecasts
            .iter()
            .zip(raw)
            .map(|((id, _), r)| (*id, r / total))
            .collect()
    }

    /// Final dense ranks aligned with `forecasts`.
    pub fn direction_ranks(&self, truth: &GroundTruth, forecasts: &[(ParticipantId, Forecast)]) -> Vec<usize> {
        let moved_up = truth.moved_up();
        let errors: Vec<f64> = forecasts
            .iter()
            .map(|(_, f)| {
                f.point
                    .map(|p| (p - truth.price_now).abs())
                    .filter(|e| e.is_finite())
                    .unwrap_or(f64::INFINITY)
            })
            .collect();
        let point_ranks = dense_ranks(&errors);

        let n = forecasts.len();
        let adjusted: Vec<f64> = forecasts
            .iter()
            .zip(point_ranks)
            .map(|((_, f), rank)| {
                let correct = f.direction == Some(moved_up);
                if correct {
                    rank as f64
                } else {
                    (rank + n) as f64
                }
            })
            .collect();

        let ranks = dense_ranks(&adjusted);
        debug!("direction ranks (moved_up={}): {:?}", moved_up, ranks);
        ranks
    }
}

/// Average of point and interval shares over their union; a missing side
/// counts as zero.
pub fn combine_shares(point: &WeightMap, interval: &WeightMap) -> WeightMap {
    let ids: BTreeSet<ParticipantId> = point.keys().chain(interval.keys()).copied().collect();
    ids.into_iter()
        .map(|id| {
            let p = point.get(&id).copied().unwrap_or(0.0);
            let i = interval.get(&id).copied().unwrap_or(0.0);
            (id, (p + i) / 2.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    fn engine(profile: ScoringProfile) -> ScoringEngine {
        ScoringEngine::from_config(&ScoringConfig {
            profile,
            ..ScoringConfig::default()
        })
    }

    fn point(p: f64) -> Forecast {
        Forecast {
            point: Some(p),
            ..Forecast::default()
        }
    }

    fn truth(now: f64, reference: f64) -> GroundTruth {
        GroundTruth {
            price_now: now,
            price_at_reference: reference,
        }
    }

    #[test]
    fn point_shares_scenario() {
        let e = engine(ScoringProfile::PointInterval);
        let forecasts = vec![(0, point(7.01)), (1, Forecast::default()), (2, point(6.95))];
        let shares = e.point_shares(7.00, &forecasts);

        assert_eq!(shares.len(), 2);
        assert!((shares[&0] - 1.0).abs() < 1e-12);
        assert!((shares[&2] - 0.9).abs() < 1e-12);
        assert!(!shares.contains_key(&1));
    }

    #[test]
    fn point_shares_strictly_decrease_with_error() {
        let e = engine(ScoringProfile::PointInterval);
        let forecasts: Vec<_> = (0..6u32).map(|i| (i, point(100.0 + f64::from(i)))).collect();
        let shares = e.point_shares(100.0, &forecasts);
        for i in 1..6 {
            assert!(shares[&(i - 1)] > shares[&i]);
        }
    }

    #[test]
    fn interval_quality_prefers_tight_hits() {
        let e = engine(ScoringProfile::PointInterval);
        let with = |lo, hi| Forecast {
            interval: Some(Interval::new(lo, hi)),
            ..Forecast::default()
        };
        let forecasts = vec![
            (0, with(6.0, 8.0)),  // hit, wide
            (1, with(6.99, 7.01)), // hit, tight
            (2, with(7.5, 7.6)),  // miss
            (3, with(8.0, 6.0)),  // inverted
        ];
        let shares = e.interval_shares(7.0, &forecasts);
        assert!((shares[&1] - 1.0).abs() < 1e-12);
        assert!((shares[&0] - 0.9).abs() < 1e-12);
        assert!((shares[&2] - 0.81).abs() < 1e-12);
        assert!(!shares.contains_key(&3));
    }

    #[test]
    fn combined_share_averages_over_union() {
        let point = WeightMap::from([(0, 1.0), (1, 0.9)]);
        let interval = WeightMap::from([(1, 1.0), (2, 0.9)]);
        let combined = combine_shares(&point, &interval);
        assert!((combined[&0] - 0.5).abs() < 1e-12);
        assert!((combined[&1] - 0.95).abs() < 1e-12);
        assert!((combined[&2] - 0.45).abs() < 1e-12);
    }

    #[test]
    fn non_positive_actual_yields_nothing() {
        let e = engine(ScoringProfile::PointInterval);
        let forecasts = vec![(0, point(1.0))];
        assert!(e.score(&truth(0.0, 1.0), &forecasts).is_empty());
        assert!(e.score(&truth(f64::NAN, 1.0), &forecasts).is_empty());
    }

    #[test]
    fn direction_scenario() {
        let e = engine(ScoringProfile::PointDirection);
        let t = truth(100.0, 99.0);
        let with = |p: Option<f64>, d: bool| Forecast {
            point: p,
            interval: None,
            direction: Some(d),
        };
        let forecasts = vec![
            (0, with(Some(100.5), true)),
            (1, with(None, false)),
            (2, with(Some(99.8), false)),
        ];

        assert_eq!(e.direction_ranks(&t, &forecasts), vec![0, 2, 1]);

        let rewards = e.direction_rewards(&t, &forecasts);
        let sum: f64 = rewards.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let z: f64 = [0.0, 1.0, 2.0].iter().map(|r: &f64| (-0.05 * r).exp()).sum();
        assert!((rewards[&0] - 1.0 / z).abs() < 1e-12);
        assert!((rewards[&2] - (-0.05_f64).exp() / z).abs() < 1e-12);
        assert!((rewards[&1] - (-0.1_f64).exp() / z).abs() < 1e-12);
    }

    #[test]
    fn all_absent_gets_uniform_reward() {
        let e = engine(ScoringProfile::PointDirection);
        let forecasts: Vec<_> = (0..4u32).map(|i| (i, Forecast::default())).collect();
        let outcome = e.score(&truth(10.0, 9.0), &forecasts);

        let EpochOutcome::Rewards(rewards) = outcome else {
            panic!("direction profile must yield rewards");
        };
        assert_eq!(rewards.len(), 4);
        for r in rewards.values() {
            assert!((r - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn rewards_cover_every_participant_and_sum_to_one() {
        let e = engine(ScoringProfile::PointDirection);
        let forecasts: Vec<_> = (0..20u32)
            .map(|i| {
                let f = Forecast {
                    point: (i % 3 != 0).then_some(50.0 + f64::from(i) * 0.1),
                    interval: None,
                    direction: (i % 4 != 0).then_some(i % 2 == 0),
                };
                (i, f)
            })
            .collect();
        let rewards = e.direction_rewards(&truth(51.0, 51.5), &forecasts);
        assert_eq!(rewards.len(), 20);
        assert!((rewards.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }
}
