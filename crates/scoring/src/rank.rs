//! Ranking helpers shared by both scoring profiles.

use std::cmp::Ordering;

use common::{ParticipantId, WeightMap};

/// Which end of the score range is best.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Lower scores rank first (errors).
    Ascending,
    /// Higher scores rank first (quality).
    Descending,
}

/// 0-based positions in the stable sorted order. Equal scores keep their
/// input order, so the earlier entry wins the tie.
pub fn ordinal_ranks(scores: &[(ParticipantId, f64)], order: RankOrder) -> Vec<(ParticipantId, usize)> {
    let mut sorted: Vec<(ParticipantId, f64)> = scores.to_vec();
    sorted.sort_by(|a, b| match order {
        RankOrder::Ascending => a.1.total_cmp(&b.1),
        RankOrder::Descending => b.1.total_cmp(&a.1),
    });
    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| (id, rank))
        .collect()
}

/// Dense ascending ranks: equal values share a rank and the next distinct
/// value gets the next integer. Output is aligned with `values`.
pub fn dense_ranks(values: &[f64]) -> Vec<usize> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);

    values
        .iter()
        .map(|v| {
            distinct
                .binary_search_by(|probe| probe.total_cmp(v))
                .unwrap_or_default()
        })
        .collect()
}

/// `decay_base ^ rank`.
pub fn rank_to_share(rank: usize, decay_base: f64) -> f64 {
    decay_base.powi(rank.min(i32::MAX as usize) as i32)
}

/// Rank `scores` and turn each rank into a share.
pub fn shares_by_rank(scores: &[(ParticipantId, f64)], order: RankOrder, decay_base: f64) -> WeightMap {
    ordinal_ranks(scores, order)
        .into_iter()
        .map(|(id, rank)| (id, rank_to_share(rank, decay_base)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_sort_is_stable() {
        let scores = [(7, 0.5), (3, 0.1), (9, 0.5), (1, 0.5)];
        let ranks = ordinal_ranks(&scores, RankOrder::Ascending);
        assert_eq!(ranks, vec![(3, 0), (7, 1), (9, 2), (1, 3)]);

        let ranks = ordinal_ranks(&scores, RankOrder::Descending);
        assert_eq!(ranks, vec![(7, 0), (9, 1), (1, 2), (3, 3)]);
    }

    #[test]
    fn dense_ranks_share_ties() {
        let ranks = dense_ranks(&[0.5, f64::INFINITY, 0.2, f64::INFINITY, 0.5]);
        assert_eq!(ranks, vec![1, 2, 0, 2, 1]);
        assert!(dense_ranks(&[]).is_empty());
    }

    #[test]
    fn shares_decay_with_rank() {
        let shares = shares_by_rank(&[(0, 0.3), (1, 0.1), (2, 0.2)], RankOrder::Ascending, 0.9);
        assert!((shares[&1] - 1.0).abs() < 1e-12);
        assert!((shares[&2] - 0.9).abs() < 1e-12);
        assert!((shares[&0] - 0.81).abs() < 1e-12);
    }
}
