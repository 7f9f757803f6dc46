//! Gateway crate.
//!
//! Collaborator traits the orchestrator depends on, plus the concrete HTTP
//! and file adapters used in production.

pub mod journal;
pub mod price;
pub mod rate_limit;
pub mod retry;
pub mod roster;
pub mod solicit;
pub mod state;
pub mod traits;

pub use journal::{normalize, Journal, JournalLedger};
pub use price::{ground_truth_from_series, YahooChartClient};
pub use rate_limit::EmissionGate;
pub use retry::RetryPolicy;
pub use roster::{parse_roster, RosterFile};
pub use solicit::HttpForecastClient;
pub use state::JsonStateStore;
pub use traits::{
    ForecastSource, GroundTruthSource, MembershipSource, NullTelemetry, StateStore,
    TelemetrySink, WeightLedger,
};
