//! Exponential moving average over per-epoch shares.

use common::config::ScoringConfig;
use common::WeightMap;

/// Turns per-epoch shares into durable weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSmoother {
    alpha: f64,
    prior: f64,
}

impl WeightSmoother {
    pub fn new(alpha: f64, prior: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prior,
        }
    }

    pub fn from_config(cfg: &ScoringConfig) -> Self {
        Self::new(cfg.alpha, cfg.new_participant_prior)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Blend `shares` into `previous`.
    ///
    /// Scored participants move toward their share; everyone else only
    /// decays. A participant never weighted before starts from the prior.
    pub fn update(&self, shares: &WeightMap, previous: &WeightMap) -> WeightMap {
        let keep = 1.0 - self.alpha;
        let mut next: WeightMap = previous
            .iter()
            .map(|(id, weight)| (*id, keep * weight))
            .collect();

        for (id, share) in shares {
            let prev = previous.get(id).copied().unwrap_or(self.prior);
            next.insert(*id, self.alpha * share + keep * prev);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scored_participant_moves_toward_share() {
        let s = WeightSmoother::new(0.1, 0.0);
        let prev = WeightMap::from([(1, 0.5)]);
        let next = s.update(&WeightMap::from([(1, 1.0)]), &prev);
        assert!((next[&1] - 0.55).abs() < 1e-12);
    }

    #[test]
    fn absent_participant_decays_geometrically() {
        let s = WeightSmoother::new(0.00958, 0.0);
        let w0 = 0.8;
        let mut weights = WeightMap::from([(4, w0), (5, 0.2)]);
        for _ in 0..25 {
            weights = s.update(&WeightMap::from([(5, 0.9)]), &weights);
        }
        let expected = (1.0 - 0.00958_f64).powi(25) * w0;
        assert!((weights[&4] - expected).abs() < 1e-12);
    }

    #[test]
    fn new_participant_starts_from_prior() {
        let zero = WeightSmoother::new(0.5, 0.0);
        let next = zero.update(&WeightMap::from([(2, 1.0)]), &WeightMap::new());
        assert!((next[&2] - 0.5).abs() < 1e-12);

        let generous = WeightSmoother::new(0.5, 1.0);
        let next = generous.update(&WeightMap::from([(2, 1.0)]), &WeightMap::new());
        assert!((next[&2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_participants_stay_out() {
        let s = WeightSmoother::new(0.5, 0.0);
        let next = s.update(&WeightMap::new(), &WeightMap::from([(1, 1.0)]));
        assert_eq!(next.keys().copied().collect::<Vec<_>>(), vec![1]);
    }
}
