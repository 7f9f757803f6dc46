//! Oracle validator: scores participant price forecasts and maintains
//! long-lived weights.
//!
//! Single-binary Tokio application that:
//! 1. Solicits forecasts from eligible participants at epoch boundaries
//! 2. Scores matured forecasts against realized prices
//! 3. Smooths per-epoch scores into durable weights
//! 4. Emits weights to the ledger whenever its gate allows

mod config;
mod orchestrator;
mod tasks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};

use common::ValidatorConfig;
use gateway::{
    EmissionGate, HttpForecastClient, Journal, JournalLedger, JsonStateStore, NullTelemetry,
    RosterFile, TelemetrySink, YahooChartClient,
};
use orchestrator::{Collaborators, RewardOrchestrator};
use schedule::{EpochScheduler, EpochWindow, TradingCalendar};

/// Forecast-scoring validator
#[derive(Parser)]
#[command(name = "oracle-validator", about = "Forecast-scoring validator")]
struct Cli {
    /// Path to the TOML config (defaults to ./config.toml if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ignore persisted state and start from zero weights.
    #[arg(long)]
    reset_state: bool,

    /// Run one epoch tick and one emission attempt, then exit.
    #[arg(long)]
    once: bool,

    /// Print the calendar decision for the current instant and exit.
    #[arg(long)]
    check_calendar: bool,
}

fn build_collaborators(cfg: &ValidatorConfig, journal: Arc<Journal>) -> common::Result<Collaborators> {
    let telemetry: Arc<dyn TelemetrySink> = if cfg.storage.telemetry {
        journal.clone()
    } else {
        Arc::new(NullTelemetry)
    };

    Ok(Collaborators {
        forecasts: Arc::new(HttpForecastClient::new(&cfg.sources)?),
        ground_truth: Arc::new(YahooChartClient::new(&cfg.sources)?),
        membership: Arc::new(RosterFile::new(&cfg.sources.roster_path)),
        store: Arc::new(JsonStateStore::new(&cfg.storage.state_path)),
        ledger: Arc::new(JournalLedger::new(
            journal,
            EmissionGate::from_secs(cfg.emission.min_interval_secs),
        )),
        telemetry,
    })
}

fn check_calendar(cfg: &ValidatorConfig) -> common::Result<()> {
    let calendar = TradingCalendar::from_config(&cfg.calendar)?;
    let window = EpochWindow::from_config(&cfg.epoch);
    let scheduler = EpochScheduler::new(calendar, window);

    let now = Utc::now();
    let fresh = now - window.interval();
    let local = now.with_timezone(&scheduler.calendar().timezone());

    info!("Now: {} ({})", now, local);
    match scheduler.calendar().session(now) {
        Some(s) => info!("Session: {} to {} (open now: {})", s.open, s.close, s.contains(now)),
        None => info!("Session: closed today"),
    }
    info!("Boundary: {}", scheduler.boundary(now));
    info!("Query due: {}", scheduler.is_query_due(now, fresh));
    info!("Scoring due: {}", scheduler.is_scoring_due(now, fresh));
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "oracle_validator=info,scoring=info,schedule=info,gateway=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Oracle validator starting up...");

    // Load configuration.
    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Epoch: every {}m, lead {}h, tolerance {}s",
        cfg.epoch.interval_minutes, cfg.epoch.lead_time_hours, cfg.epoch.tolerance_secs
    );
    info!(
        "Scoring: {:?}, alpha={}, prior={}",
        cfg.scoring.profile, cfg.scoring.alpha, cfg.scoring.new_participant_prior
    );
    info!(
        "Sources: symbol={}, roster={}",
        cfg.sources.symbol, cfg.sources.roster_path
    );

    // ── Check-calendar mode ──────────────────────────────────────────
    if cli.check_calendar {
        if let Err(e) = check_calendar(&cfg) {
            error!("Calendar check failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let journal = match Journal::open(&cfg.storage.journal_dir) {
        Ok(j) => Arc::new(j),
        Err(e) => {
            error!("Failed to initialize journal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Journal path: {}", journal.dir().display());
    journal.write_event(
        "validator_start",
        json!({
            "mode": if cli.once { "once" } else { "daemon" },
            "profile": cfg.scoring.profile,
            "symbol": cfg.sources.symbol,
            "reset_state": cli.reset_state,
        }),
    );

    let io = match build_collaborators(&cfg, journal.clone()) {
        Ok(io) => io,
        Err(e) => {
            error!("Collaborator initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let orch = match RewardOrchestrator::bootstrap(&cfg, io, Utc::now(), cli.reset_state).await {
        Ok(o) => Arc::new(o),
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = orch.resync_membership().await {
        warn!("Initial membership sync failed: {}", e);
    }

    // ── Once mode ────────────────────────────────────────────────────
    if cli.once {
        match orch.run_epoch_tick(Utc::now()).await {
            Ok(decision) => info!("Tick: query={:?} scoring={:?}", decision.query, decision.scoring),
            Err(e) => warn!("Tick failed: {}", e),
        }
        match orch.emit_weights().await {
            Ok(emitted) => info!("Emission attempted: emitted={}", emitted),
            Err(e) => warn!("Emission failed: {}", e),
        }
        info!("Weights: {:?}", orch.weights().await);
        if let Err(e) = orch.persist().await {
            error!("Failed to persist state: {}", e);
        }
        return;
    }

    // ── Periodic tasks ───────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    let timing = cfg.timing.clone();

    let tick_orch = orch.clone();
    let tick_handle = tokio::spawn(tasks::run_periodic(
        "epoch",
        Duration::from_secs(timing.tick_interval_secs),
        stop_rx.clone(),
        move || {
            let orch = tick_orch.clone();
            async move { orch.run_epoch_tick(Utc::now()).await.map(|_| ()) }
        },
    ));

    let resync_orch = orch.clone();
    let resync_handle = tokio::spawn(tasks::run_periodic(
        "membership",
        Duration::from_secs(timing.resync_interval_secs),
        stop_rx.clone(),
        move || {
            let orch = resync_orch.clone();
            async move { orch.resync_membership().await.map(|_| ()) }
        },
    ));

    let evict_orch = orch.clone();
    let evict_handle = tokio::spawn(tasks::run_periodic(
        "eviction",
        Duration::from_secs(timing.eviction_interval_secs),
        stop_rx.clone(),
        move || {
            let orch = evict_orch.clone();
            async move {
                orch.evict_history(Utc::now()).await;
                Ok(())
            }
        },
    ));

    let emit_orch = orch.clone();
    let emit_handle = tokio::spawn(tasks::run_periodic(
        "emission",
        Duration::from_secs(timing.emission_poll_secs),
        stop_rx,
        move || {
            let orch = emit_orch.clone();
            async move { orch.emit_weights().await.map(|_| ()) }
        },
    ));

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("Oracle validator is running. Press Ctrl+C to stop.");

    let shutdown_reason = match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl_c",
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            "signal_error"
        }
    };
    info!("Shutdown requested ({}); finishing current work...", shutdown_reason);

    if stop_tx.send(true).is_err() {
        warn!("All tasks already stopped");
    }
    for (name, handle) in [
        ("epoch", tick_handle),
        ("membership", resync_handle),
        ("eviction", evict_handle),
        ("emission", emit_handle),
    ] {
        if let Err(e) = handle.await {
            error!("{} task ended abnormally: {}", name, e);
        }
    }

    if let Err(e) = orch.persist().await {
        error!("Failed to persist state on shutdown: {}", e);
    }
    journal.write_event("validator_shutdown", json!({ "reason": shutdown_reason }));

    info!("Oracle validator shut down.");
}
