//! Epoch scheduler.
//!
//! Decides once per tick whether the current instant is a query boundary, a
//! scoring boundary, both, or neither. Purely computational: a calendar that
//! cannot answer is treated as closed.

use chrono::{DateTime, Duration, DurationRound, NaiveTime, TimeZone, Timelike, Utc};
use common::config::EpochConfig;
use tracing::debug;

use crate::calendar::{Session, TradingCalendar};

/// Epoch window derived from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    pub interval_minutes: u32,
    pub lead_time: Duration,
    pub tolerance: Duration,
}

impl EpochWindow {
    pub fn from_config(cfg: &EpochConfig) -> Self {
        Self {
            interval_minutes: cfg.interval_minutes.max(1),
            lead_time: Duration::hours(i64::from(cfg.lead_time_hours)),
            tolerance: Duration::seconds(cfg.tolerance_secs as i64),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(i64::from(self.interval_minutes))
    }
}

/// Last boundary each side has acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochCursor {
    pub last_query: DateTime<Utc>,
    pub last_scoring: DateTime<Utc>,
}

impl EpochCursor {
    /// Fresh cursor that treats the previous epoch as already handled.
    pub fn starting_at(now: DateTime<Utc>, window: &EpochWindow) -> Self {
        let previous = now - window.interval();
        Self {
            last_query: previous,
            last_scoring: previous,
        }
    }
}

/// What the scheduler decided for one tick. Each field holds the canonical
/// boundary to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochDecision {
    pub query: Option<DateTime<Utc>>,
    pub scoring: Option<DateTime<Utc>>,
}

impl EpochDecision {
    pub fn is_idle(&self) -> bool {
        self.query.is_none() && self.scoring.is_none()
    }
}

/// Round to the nearest multiple of `interval_minutes` counted from midnight
/// UTC. Seconds are discarded first; ties round up.
pub fn round_to_interval(ts: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let interval = i64::from(interval_minutes.max(1));
    let minute_floor = ts
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts);
    let midnight = Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN));
    let minutes = (minute_floor - midnight).num_minutes();
    let remainder = minutes % interval;
    let rounded = if remainder * 2 >= interval {
        minutes - remainder + interval
    } else {
        minutes - remainder
    };
    midnight + Duration::minutes(rounded)
}

/// Round down to a multiple of `bucket_minutes` since the Unix epoch.
pub fn round_down_to_bucket(ts: DateTime<Utc>, bucket_minutes: u32) -> DateTime<Utc> {
    let bucket = Duration::minutes(i64::from(bucket_minutes.max(1)));
    ts.duration_trunc(bucket).unwrap_or(ts)
}

/// The calendar-aware epoch state machine.
#[derive(Debug, Clone)]
pub struct EpochScheduler {
    calendar: TradingCalendar,
    window: EpochWindow,
}

impl EpochScheduler {
    pub fn new(calendar: TradingCalendar, window: EpochWindow) -> Self {
        Self { calendar, window }
    }

    pub fn window(&self) -> &EpochWindow {
        &self.window
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Canonical boundary for `now`.
    pub fn boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        round_to_interval(now, self.window.interval_minutes)
    }

    /// Instant whose forecasts mature at `boundary`.
    pub fn reference_time(&self, boundary: DateTime<Utc>) -> DateTime<Utc> {
        boundary - self.window.lead_time
    }

    /// Should forecasts be solicited now?
    pub fn is_query_due(&self, now: DateTime<Utc>, last_query: DateTime<Utc>) -> bool {
        let Some(session) = self.boundary_session(now, last_query) else {
            return false;
        };

        // A forecast solicited now must mature by the close.
        let cutoff = session.close - self.window.lead_time + self.window.tolerance;
        if now > cutoff {
            debug!("query skipped: {} is past the last maturing boundary", now);
            return false;
        }
        debug!("query due (open={}, now={})", session.open, now);
        true
    }

    /// Should matured forecasts be scored now?
    pub fn is_scoring_due(&self, now: DateTime<Utc>, last_scoring: DateTime<Utc>) -> bool {
        let Some(session) = self.boundary_session(now, last_scoring) else {
            return false;
        };

        // Nothing has matured during the first lead-time of the session.
        if now < session.open + self.window.lead_time {
            debug!("scoring skipped: {} is within the first lead time", now);
            return false;
        }
        debug!("scoring due (open={}, now={})", session.open, now);
        true
    }

    /// Evaluate both sides and advance the cursor for each one that fires.
    pub fn decide(&self, now: DateTime<Utc>, cursor: &mut EpochCursor) -> EpochDecision {
        let mut decision = EpochDecision::default();
        let boundary = self.boundary(now);

        if self.is_query_due(now, cursor.last_query) {
            cursor.last_query = boundary;
            decision.query = Some(boundary);
        }
        if self.is_scoring_due(now, cursor.last_scoring) {
            cursor.last_scoring = boundary;
            decision.scoring = Some(boundary);
        }
        decision
    }

    /// Shared gate: venue open, not the same epoch as `last`, and within
    /// tolerance of a boundary.
    fn boundary_session(&self, now: DateTime<Utc>, last: DateTime<Utc>) -> Option<Session> {
        let session = self.calendar.session(now)?;
        if !session.contains(now) {
            return None;
        }

        let tolerance_ms = self.window.tolerance.num_milliseconds();
        if (now - last).num_milliseconds().abs() < tolerance_ms {
            return None;
        }

        let since_open = (now - session.open).num_milliseconds();
        let interval_ms = self.window.interval().num_milliseconds();
        if since_open.rem_euclid(interval_ms) >= tolerance_ms {
            return None;
        }
        Some(session)
    }
}
