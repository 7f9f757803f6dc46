//! Domain types shared across the validator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque participant identifier (a network slot id).
pub type ParticipantId = u32;

/// Durable weight per participant. Ordered so emission and logs are stable.
pub type WeightMap = BTreeMap<ParticipantId, f64>;

// ── Participants ──────────────────────────────────────────────────────

/// A participant as reported by the membership source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Identity currently bound to this slot. A change means the slot was
    /// handed to someone else.
    pub identity: String,
    /// Transport address used to solicit forecasts.
    #[serde(default)]
    pub endpoint: String,
}

// ── Forecasts ─────────────────────────────────────────────────────────

/// A confidence interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
}

impl Interval {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Finite bounds with `low <= high`.
    pub fn is_well_formed(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low <= self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// One participant's forecast for one bucket. Every field may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<bool>,
}

impl Forecast {
    pub fn is_empty(&self) -> bool {
        self.point.is_none() && self.interval.is_none() && self.direction.is_none()
    }

    /// Drop values that cannot be scored or persisted (NaN / infinite).
    pub fn sanitized(self) -> Self {
        Self {
            point: self.point.filter(|p| p.is_finite()),
            interval: self
                .interval
                .filter(|i| i.low.is_finite() && i.high.is_finite()),
            direction: self.direction,
        }
    }

    /// Overlay the fields present in `update`; absent fields keep their value.
    pub fn merge(&mut self, update: Forecast) {
        if update.point.is_some() {
            self.point = update.point;
        }
        if update.interval.is_some() {
            self.interval = update.interval;
        }
        if update.direction.is_some() {
            self.direction = update.direction;
        }
    }
}

/// A forecast as returned by the solicitation transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSubmission {
    pub participant: ParticipantId,
    pub forecast: Forecast,
}

// ── Ground truth ──────────────────────────────────────────────────────

/// Realized reference prices for one scoring epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub price_now: f64,
    pub price_at_reference: f64,
}

impl GroundTruth {
    /// Realized direction: true when the price rose over the lead time.
    pub fn moved_up(&self) -> bool {
        self.price_now > self.price_at_reference
    }
}

// ── Persistence ───────────────────────────────────────────────────────

/// One stored history bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub bucket: DateTime<Utc>,
    pub forecast: Forecast,
}

/// Everything the validator needs to resume after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub weights: WeightMap,
    #[serde(default)]
    pub history: BTreeMap<ParticipantId, Vec<HistoryRecord>>,
    /// Identity each known slot was bound to when last resynced.
    #[serde(default)]
    pub identities: BTreeMap<ParticipantId, String>,
    #[serde(default)]
    pub last_query: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_scoring: Option<DateTime<Utc>>,
}

// ── Telemetry ─────────────────────────────────────────────────────────

/// What kind of epoch action a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochAction {
    Query,
    Scoring,
}

/// Summary of one epoch action, handed to telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub action: EpochAction,
    pub boundary: DateTime<Utc>,
    pub participants: Vec<ParticipantId>,
    /// Submissions collected (query) or matured forecasts scored (scoring).
    pub responses: Vec<ForecastSubmission>,
    /// Per-epoch scores (empty for query actions).
    pub scores: WeightMap,
    /// Weight table after the action.
    pub weights: WeightMap,
}
