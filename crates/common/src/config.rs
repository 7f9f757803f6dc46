//! Validator configuration types.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Top-level validator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Epoch boundaries and forecast lead time.
    #[serde(default)]
    pub epoch: EpochConfig,

    /// Trading calendar used to gate queries and scoring.
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Scoring profile and its constants.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Prediction history retention.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Task cadences (seconds).
    #[serde(default)]
    pub timing: TimingConfig,

    /// Retry policy for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Weight emission gate.
    #[serde(default)]
    pub emission: EmissionConfig,

    /// Ground truth and participant transport settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// State and journal locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Epoch window. Never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Minutes between epoch boundaries.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// Hours between soliciting a forecast and scoring it.
    #[serde(default = "default_lead_time_hours")]
    pub lead_time_hours: u32,

    /// How long after a boundary an action may still fire (seconds).
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,
}

/// Venue trading hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// IANA timezone of the venue (e.g., "America/New_York").
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Local opening time.
    #[serde(default = "default_open")]
    pub open: NaiveTime,

    /// Local closing time.
    #[serde(default = "default_close")]
    pub close: NaiveTime,

    /// Apply the NYSE holiday rules.
    #[serde(default = "default_true")]
    pub nyse_holidays: bool,

    /// Additional full-day closures (local dates).
    #[serde(default)]
    pub extra_closures: Vec<NaiveDate>,
}

/// Which scoring algorithm the engine runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringProfile {
    /// Rank blend of point accuracy and interval quality, EMA-smoothed.
    PointInterval,
    /// Point ranks demoted on wrong direction, softmax-normalized.
    PointDirection,
}

/// Scoring constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_profile")]
    pub profile: ScoringProfile,

    /// Base of the `decay_base ^ rank` share transform.
    #[serde(default = "default_decay_base")]
    pub decay_base: f64,

    /// Interval width multiplier in `1 / (1 + width * scale)`.
    #[serde(default = "default_interval_width_scale")]
    pub interval_width_scale: f64,

    /// Rate in `exp(-rate * rank)` for the direction profile.
    #[serde(default = "default_softmax_rate")]
    pub softmax_rate: f64,

    /// EMA smoothing factor.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Previous weight assumed for a participant never scored before.
    #[serde(default)]
    pub new_participant_prior: f64,
}

/// History store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Bucket granularity for history keys (minutes).
    #[serde(default = "default_bucket_minutes")]
    pub bucket_minutes: u32,

    /// Entries older than this are evicted (hours).
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
}

/// Task cadences (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Epoch tick interval.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Membership resync interval.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// History eviction interval.
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,

    /// How often the emission task asks the ledger gate.
    #[serde(default = "default_emission_poll")]
    pub emission_poll_secs: u64,
}

/// Bounded retry with fixed delay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

/// Ledger emission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionConfig {
    /// Minimum seconds between two weight emissions.
    #[serde(default = "default_min_emission_interval")]
    pub min_interval_secs: u64,
}

/// External data sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Chart API base URL.
    #[serde(default = "default_chart_base_url")]
    pub chart_base_url: String,

    /// Reference symbol (e.g., "^GSPC").
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Per-participant solicitation timeout.
    #[serde(default = "default_solicit_timeout")]
    pub solicit_timeout_secs: u64,

    /// Roster file listing participants.
    #[serde(default = "default_roster_path")]
    pub roster_path: String,
}

/// Where state and journals live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: String,

    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Write epoch telemetry events to the journal.
    #[serde(default = "default_true")]
    pub telemetry: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u32 {
    5
}
fn default_lead_time_hours() -> u32 {
    1
}
fn default_tolerance_secs() -> u64 {
    120
}

fn default_timezone() -> String {
    "America/New_York".into()
}
fn default_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN)
}
fn default_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_profile() -> ScoringProfile {
    ScoringProfile::PointInterval
}
fn default_decay_base() -> f64 {
    0.9
}
fn default_interval_width_scale() -> f64 {
    1000.0
}
fn default_softmax_rate() -> f64 {
    0.05
}
fn default_alpha() -> f64 {
    0.00958
}

fn default_bucket_minutes() -> u32 {
    5
}
fn default_retention_hours() -> u32 {
    24
}

fn default_tick_interval() -> u64 {
    12
}
fn default_resync_interval() -> u64 {
    600
}
fn default_eviction_interval() -> u64 {
    3600
}
fn default_emission_poll() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_min_emission_interval() -> u64 {
    1200
}

fn default_chart_base_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".into()
}
fn default_symbol() -> String {
    "^GSPC".into()
}
fn default_solicit_timeout() -> u64 {
    20
}
fn default_roster_path() -> String {
    "roster.toml".into()
}

fn default_state_path() -> String {
    "state/validator_state.json".into()
}
fn default_journal_dir() -> String {
    "journal".into()
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            lead_time_hours: default_lead_time_hours(),
            tolerance_secs: default_tolerance_secs(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open: default_open(),
            close: default_close(),
            nyse_holidays: default_true(),
            extra_closures: Vec::new(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            decay_base: default_decay_base(),
            interval_width_scale: default_interval_width_scale(),
            softmax_rate: default_softmax_rate(),
            alpha: default_alpha(),
            new_participant_prior: 0.0,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            bucket_minutes: default_bucket_minutes(),
            retention_hours: default_retention_hours(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            resync_interval_secs: default_resync_interval(),
            eviction_interval_secs: default_eviction_interval(),
            emission_poll_secs: default_emission_poll(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_emission_interval(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            chart_base_url: default_chart_base_url(),
            symbol: default_symbol(),
            solicit_timeout_secs: default_solicit_timeout(),
            roster_path: default_roster_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            journal_dir: default_journal_dir(),
            telemetry: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: ValidatorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.epoch.interval_minutes, 5);
        assert_eq!(cfg.epoch.lead_time_hours, 1);
        assert_eq!(cfg.epoch.tolerance_secs, 120);
        assert_eq!(cfg.scoring.profile, ScoringProfile::PointInterval);
        assert_eq!(cfg.scoring.alpha, 0.00958);
        assert_eq!(cfg.scoring.new_participant_prior, 0.0);
        assert_eq!(cfg.history.retention_hours, 24);
        assert_eq!(cfg.calendar.open, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn profile_and_calendar_parse_from_toml() {
        let raw = r#"
            [scoring]
            profile = "point_direction"

            [calendar]
            close = "13:00:00"
            extra_closures = ["2025-01-09"]
        "#;
        let cfg: ValidatorConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.scoring.profile, ScoringProfile::PointDirection);
        assert_eq!(cfg.calendar.close, NaiveTime::from_hms_opt(13, 0, 0).unwrap());
        assert_eq!(
            cfg.calendar.extra_closures,
            vec![NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()]
        );
        assert_eq!(cfg.calendar.timezone, "America/New_York");
    }
}
