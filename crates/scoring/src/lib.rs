//! Scoring crate.
//!
//! Holds per-participant prediction history, ranks matured forecasts, and
//! smooths per-epoch shares into durable weights.

pub mod engine;
pub mod history;
pub mod rank;
pub mod smoother;

pub use engine::{combine_shares, EpochOutcome, ScoringEngine};
pub use history::{HistoryStore, PredictionHistory};
pub use rank::{dense_ranks, ordinal_ranks, rank_to_share, shares_by_rank, RankOrder};
pub use smoother::WeightSmoother;
