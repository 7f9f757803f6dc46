//! Unified error type for the oracle validator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Ground truth unavailable: {0}")]
    GroundTruth(String),

    #[error("Forecast solicitation failed: {0}")]
    Solicitation(String),

    #[error("Membership source error: {0}")]
    Membership(String),

    #[error("State store error: {0}")]
    State(String),

    #[error("Ledger rejected weights: {0}")]
    Ledger(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
