//! Daily-rotated JSONL event journal, and the journal-backed weight ledger.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{EpochAction, EpochReport, Error, Result, WeightMap};
use serde_json::json;
use tracing::{info, warn};

use crate::rate_limit::EmissionGate;
use crate::traits::{TelemetrySink, WeightLedger};

struct JournalFile {
    day_key: String,
    file: File,
}

pub struct Journal {
    dir: PathBuf,
    inner: Mutex<JournalFile>,
}

impl Journal {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        create_dir_all(&dir)?;
        let day_key = day_key(Utc::now());
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self {
            dir,
            inner: Mutex::new(JournalFile { day_key, file }),
        })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("events-{}.jsonl", day_key)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one event. Failures are logged, never returned.
    pub fn write_event(&self, event: &str, payload: serde_json::Value) {
        self.write_event_at(Utc::now(), event, payload);
    }

    fn write_event_at(&self, now: DateTime<Utc>, event: &str, payload: serde_json::Value) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = (|| -> std::io::Result<()> {
            let today = day_key(now);
            if today != guard.day_key {
                guard.file = Self::open_day_file(&self.dir, &today)?;
                guard.day_key = today;
            }
            let line = json!({
                "ts": now.to_rfc3339_opts(SecondsFormat::Millis, true),
                "event": event,
                "data": payload,
            });
            writeln!(guard.file, "{}", line)?;
            guard.file.flush()?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!("journal write failed: {}", e);
        }
    }
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl TelemetrySink for Journal {
    async fn record(&self, report: EpochReport) {
        let event = match report.action {
            EpochAction::Query => "epoch_query",
            EpochAction::Scoring => "epoch_scoring",
        };
        match serde_json::to_value(&report) {
            Ok(payload) => self.write_event(event, payload),
            Err(e) => warn!("telemetry encode failed: {}", e),
        }
    }
}

/// Scale weights so they sum to one. Fails when there is nothing to scale.
pub fn normalize(weights: &WeightMap) -> Result<WeightMap> {
    let total: f64 = weights.values().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return Err(Error::Ledger("weights sum to zero".into()));
    }
    Ok(weights
        .iter()
        .map(|(id, w)| {
            let w = if w.is_finite() && *w > 0.0 { *w } else { 0.0 };
            (*id, w / total)
        })
        .collect())
}

/// Ledger that records normalized weights to the journal, at most once per
/// gate period.
pub struct JournalLedger {
    journal: Arc<Journal>,
    gate: EmissionGate,
}

impl JournalLedger {
    pub fn new(journal: Arc<Journal>, gate: EmissionGate) -> Self {
        Self { journal, gate }
    }
}

#[async_trait]
impl WeightLedger for JournalLedger {
    async fn ready(&self) -> Result<bool> {
        Ok(self.gate.try_acquire())
    }

    async fn emit(&self, weights: &WeightMap) -> Result<()> {
        let normalized = normalize(weights)?;
        self.journal.write_event(
            "weights_emitted",
            json!({
                "raw": weights,
                "normalized": normalized,
            }),
        );
        info!("Emitted weights for {} participants", normalized.len());
        Ok(())
    }
}
