//! Configuration loader: merges .env, config.toml, and ORACLE_* env vars.

use std::path::Path;

use common::config::ScoringProfile;
use common::{Error, ValidatorConfig};
use schedule::TradingCalendar;

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &ValidatorConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.epoch.interval_minutes == 0 {
        issues.push("epoch.interval_minutes must be > 0".into());
    }
    if config.epoch.lead_time_hours == 0 {
        issues.push("epoch.lead_time_hours must be > 0".into());
    }
    if config.epoch.tolerance_secs == 0 {
        issues.push("epoch.tolerance_secs must be > 0".into());
    }
    // A tick late in the window must still round back to the boundary it
    // belongs to, not forward to the next one.
    let max_tolerance = u64::from(config.epoch.interval_minutes.saturating_add(1) / 2) * 60;
    if config.epoch.tolerance_secs > max_tolerance
        || config.epoch.tolerance_secs >= u64::from(config.epoch.interval_minutes) * 60
    {
        issues.push(format!(
            "epoch.tolerance_secs must be at most {}s (half an interval, rounded up to whole minutes) and shorter than one interval",
            max_tolerance
        ));
    }

    if let Err(e) = TradingCalendar::from_config(&config.calendar) {
        issues.push(format!("calendar: {}", e));
    }

    let s = &config.scoring;
    if !(s.decay_base > 0.0 && s.decay_base < 1.0) {
        issues.push("scoring.decay_base must be in (0,1)".into());
    }
    if !(s.interval_width_scale.is_finite() && s.interval_width_scale >= 0.0) {
        issues.push("scoring.interval_width_scale must be >= 0".into());
    }
    if !(s.softmax_rate.is_finite() && s.softmax_rate > 0.0) {
        issues.push("scoring.softmax_rate must be > 0".into());
    }
    if !(s.alpha > 0.0 && s.alpha <= 1.0) {
        issues.push("scoring.alpha must be in (0,1]".into());
    }
    if !(s.new_participant_prior.is_finite() && s.new_participant_prior >= 0.0) {
        issues.push("scoring.new_participant_prior must be >= 0".into());
    }

    if config.history.bucket_minutes == 0 {
        issues.push("history.bucket_minutes must be > 0".into());
    }
    if config.history.retention_hours < config.epoch.lead_time_hours {
        issues.push("history.retention_hours must cover epoch.lead_time_hours".into());
    }

    if config.timing.tick_interval_secs == 0 {
        issues.push("timing.tick_interval_secs must be > 0".into());
    }
    if config.timing.tick_interval_secs >= config.epoch.tolerance_secs {
        issues.push("timing.tick_interval_secs must be shorter than epoch.tolerance_secs".into());
    }
    if config.timing.resync_interval_secs == 0 {
        issues.push("timing.resync_interval_secs must be > 0".into());
    }
    if config.timing.eviction_interval_secs == 0 {
        issues.push("timing.eviction_interval_secs must be > 0".into());
    }
    if config.timing.emission_poll_secs == 0 {
        issues.push("timing.emission_poll_secs must be > 0".into());
    }

    if config.retry.max_attempts == 0 {
        issues.push("retry.max_attempts must be > 0".into());
    }

    if config.sources.symbol.trim().is_empty() {
        issues.push("sources.symbol must not be empty".into());
    }
    if config.sources.roster_path.trim().is_empty() {
        issues.push("sources.roster_path must not be empty".into());
    }
    if config.storage.state_path.trim().is_empty() {
        issues.push("storage.state_path must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply `ORACLE_*` overrides looked up through `var`.
fn apply_env_overrides<F>(config: &mut ValidatorConfig, var: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var("ORACLE_SCORING_PROFILE") {
        config.scoring.profile = match raw.trim().to_ascii_lowercase().as_str() {
            "point_interval" | "a" => ScoringProfile::PointInterval,
            "point_direction" | "b" => ScoringProfile::PointDirection,
            _ => {
                return Err(Error::Config(
                    "ORACLE_SCORING_PROFILE must be one of: point_interval, point_direction".into(),
                ));
            }
        };
    }
    if let Some(raw) = var("ORACLE_ALPHA") {
        config.scoring.alpha = parse_non_negative_f64(&raw, "ORACLE_ALPHA")?;
    }
    if let Some(raw) = var("ORACLE_NEW_PARTICIPANT_PRIOR") {
        config.scoring.new_participant_prior =
            parse_non_negative_f64(&raw, "ORACLE_NEW_PARTICIPANT_PRIOR")?;
    }
    if let Some(raw) = var("ORACLE_SYMBOL") {
        config.sources.symbol = raw.trim().to_string();
    }
    if let Some(raw) = var("ORACLE_CHART_BASE_URL") {
        config.sources.chart_base_url = raw.trim().to_string();
    }
    if let Some(raw) = var("ORACLE_ROSTER_PATH") {
        config.sources.roster_path = raw.trim().to_string();
    }
    if let Some(raw) = var("ORACLE_SOLICIT_TIMEOUT_SECS") {
        config.sources.solicit_timeout_secs = parse_u64(&raw, "ORACLE_SOLICIT_TIMEOUT_SECS")?;
    }
    if let Some(raw) = var("ORACLE_STATE_PATH") {
        config.storage.state_path = raw.trim().to_string();
    }
    if let Some(raw) = var("ORACLE_JOURNAL_DIR") {
        config.storage.journal_dir = raw.trim().to_string();
    }
    if let Some(raw) = var("ORACLE_TELEMETRY") {
        config.storage.telemetry = parse_bool(&raw);
    }
    if let Some(raw) = var("ORACLE_MIN_EMISSION_INTERVAL_SECS") {
        config.emission.min_interval_secs =
            parse_u64(&raw, "ORACLE_MIN_EMISSION_INTERVAL_SECS")?;
    }
    Ok(())
}

/// Load validator configuration from `.env`, an optional TOML file, and the
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<ValidatorConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced by the config file if one exists. An explicit
    //    path must exist.
    let mut config = ValidatorConfig::default();
    let config_path = path.unwrap_or_else(|| Path::new("config.toml"));
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    } else if path.is_some() {
        return Err(Error::Config(format!(
            "Config file {} does not exist",
            config_path.display()
        )));
    }

    // 3. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}
