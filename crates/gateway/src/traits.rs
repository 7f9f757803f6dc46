//! Collaborator seams.
//!
//! The orchestrator only talks to the outside world through these traits so
//! the HTTP and file adapters can be swapped for in-memory ones in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    EpochReport, ForecastSubmission, GroundTruth, Participant, PersistedState, Result, WeightMap,
};

/// Solicits forecasts from participants.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Ask every participant for a forecast for `timestamp`. Participants
    /// that time out or answer garbage are simply missing from the result.
    /// Not retried: a forecast that arrives late is an absent forecast, so
    /// the transport's per-request timeout is the only bound.
    async fn solicit(
        &self,
        participants: &[Participant],
        timestamp: DateTime<Utc>,
    ) -> Vec<ForecastSubmission>;
}

/// Provides realized reference prices.
#[async_trait]
pub trait GroundTruthSource: Send + Sync {
    async fn fetch(&self, now: DateTime<Utc>, reference: DateTime<Utc>) -> Result<GroundTruth>;
}

/// Reports the currently eligible participant set.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn eligible(&self) -> Result<Vec<Participant>>;
}

/// Durable validator state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<PersistedState>;
    async fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Destination for final weights.
#[async_trait]
pub trait WeightLedger: Send + Sync {
    /// Whether the ledger will accept an emission now.
    async fn ready(&self) -> Result<bool>;
    async fn emit(&self, weights: &WeightMap) -> Result<()>;
}

/// Best-effort epoch telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, report: EpochReport);
}

/// Telemetry sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

#[async_trait]
impl TelemetrySink for NullTelemetry {
    async fn record(&self, _report: EpochReport) {}
}
