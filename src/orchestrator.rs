//! Reward orchestrator.
//!
//! Glues the epoch scheduler, history store, scoring engine, and smoother
//! to the external collaborators. All mutable state lives in one
//! `ValidatorState` behind one lock, held for a unit of work's whole run.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::config::HistoryConfig;
use common::{
    EpochAction, EpochReport, Forecast, ForecastSubmission, Participant, ParticipantId,
    PersistedState, Result, ValidatorConfig, WeightMap,
};
use gateway::{
    ForecastSource, GroundTruthSource, MembershipSource, RetryPolicy, StateStore, TelemetrySink,
    WeightLedger,
};
use schedule::{EpochCursor, EpochDecision, EpochScheduler, EpochWindow, TradingCalendar};
use scoring::{EpochOutcome, HistoryStore, ScoringEngine, WeightSmoother};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything the validator mutates at runtime.
#[derive(Debug, Clone)]
pub struct ValidatorState {
    pub weights: WeightMap,
    pub history: HistoryStore,
    pub cursor: EpochCursor,
    /// Currently eligible participants, in membership order.
    pub eligible: Vec<Participant>,
    pub identities: BTreeMap<ParticipantId, String>,
}

/// What one membership resync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub added: Vec<ParticipantId>,
    pub replaced: Vec<ParticipantId>,
    pub removed: Vec<ParticipantId>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

impl ValidatorState {
    /// Rebuild from persisted state. Missing cursor sides start one interval
    /// back so the current epoch is not skipped.
    pub fn restore(
        persisted: &PersistedState,
        now: DateTime<Utc>,
        history_cfg: &HistoryConfig,
        window: &EpochWindow,
    ) -> Self {
        let mut history = HistoryStore::from_config(history_cfg);
        history.restore(&persisted.history);

        let fresh = EpochCursor::starting_at(now, window);
        let cursor = EpochCursor {
            last_query: persisted.last_query.unwrap_or(fresh.last_query),
            last_scoring: persisted.last_scoring.unwrap_or(fresh.last_scoring),
        };

        Self {
            weights: persisted.weights.clone(),
            history,
            cursor,
            eligible: Vec::new(),
            identities: persisted.identities.clone(),
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            weights: self.weights.clone(),
            history: self.history.snapshot(),
            identities: self.identities.clone(),
            last_query: Some(self.cursor.last_query),
            last_scoring: Some(self.cursor.last_scoring),
        }
    }

    /// Reconcile state with the eligible set.
    ///
    /// A participant seen for the first time, or whose slot now belongs to a
    /// different identity, loses its weight entry and starts a fresh history.
    /// Anything no longer eligible is forgotten entirely.
    pub fn apply_membership(&mut self, participants: Vec<Participant>) -> MembershipChange {
        let mut change = MembershipChange::default();
        let incoming: HashSet<ParticipantId> = participants.iter().map(|p| p.id).collect();

        for p in &participants {
            match self.identities.get(&p.id) {
                None => {
                    change.added.push(p.id);
                    self.weights.remove(&p.id);
                    self.history.reset_participant(p.id);
                }
                Some(known) if *known != p.identity => {
                    change.replaced.push(p.id);
                    self.weights.remove(&p.id);
                    self.history.reset_participant(p.id);
                }
                Some(_) => self.history.ensure_participant(p.id),
            }
            self.identities.insert(p.id, p.identity.clone());
        }

        let stale: BTreeSet<ParticipantId> = self
            .identities
            .keys()
            .chain(self.weights.keys())
            .copied()
            .chain(self.history.participants())
            .filter(|id| !incoming.contains(id))
            .collect();
        for id in stale {
            self.identities.remove(&id);
            self.weights.remove(&id);
            self.history.remove_participant(id);
            change.removed.push(id);
        }

        self.eligible = participants;
        change
    }

    /// Weight for every eligible participant; missing entries read as zero.
    /// When nobody holds a positive weight the split is uniform.
    pub fn emission_weights(&self) -> WeightMap {
        let weights: WeightMap = self
            .eligible
            .iter()
            .map(|p| (p.id, self.weights.get(&p.id).copied().unwrap_or(0.0)))
            .collect();
        if weights.is_empty() || weights.values().any(|w| *w > 0.0) {
            return weights;
        }
        let share = 1.0 / weights.len() as f64;
        weights.into_keys().map(|id| (id, share)).collect()
    }
}

/// External collaborators, injected so tests can substitute in-memory ones.
#[derive(Clone)]
pub struct Collaborators {
    pub forecasts: Arc<dyn ForecastSource>,
    pub ground_truth: Arc<dyn GroundTruthSource>,
    pub membership: Arc<dyn MembershipSource>,
    pub store: Arc<dyn StateStore>,
    pub ledger: Arc<dyn WeightLedger>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

pub struct RewardOrchestrator {
    scheduler: EpochScheduler,
    engine: ScoringEngine,
    smoother: WeightSmoother,
    retry: RetryPolicy,
    io: Collaborators,
    state: Mutex<ValidatorState>,
}

impl RewardOrchestrator {
    /// Build from config and restore persisted state. A state that cannot be
    /// loaded is replaced by a fresh zero state.
    pub async fn bootstrap(
        cfg: &ValidatorConfig,
        io: Collaborators,
        now: DateTime<Utc>,
        reset_state: bool,
    ) -> Result<Self> {
        let calendar = TradingCalendar::from_config(&cfg.calendar)?;
        let window = EpochWindow::from_config(&cfg.epoch);

        let persisted = if reset_state {
            info!("Ignoring persisted state (--reset-state)");
            PersistedState::default()
        } else {
            match io.store.load().await {
                Ok(state) => state,
                Err(e) => {
                    warn!("Failed to load state, starting from zero: {}", e);
                    PersistedState::default()
                }
            }
        };
        let state = ValidatorState::restore(&persisted, now, &cfg.history, &window);
        info!(
            "Restored {} weights, {} histories (last query {}, last scoring {})",
            state.weights.len(),
            state.history.participants().len(),
            state.cursor.last_query,
            state.cursor.last_scoring
        );

        Ok(Self {
            scheduler: EpochScheduler::new(calendar, window),
            engine: ScoringEngine::from_config(&cfg.scoring),
            smoother: WeightSmoother::from_config(&cfg.scoring),
            retry: RetryPolicy::from_config(&cfg.retry),
            io,
            state: Mutex::new(state),
        })
    }

    /// One epoch tick: query and/or score if a boundary is due.
    pub async fn run_epoch_tick(&self, now: DateTime<Utc>) -> Result<EpochDecision> {
        let mut state = self.state.lock().await;
        if state.eligible.is_empty() {
            info!("No eligible participants; nothing to do at {}", now);
            return Ok(EpochDecision::default());
        }

        let decision = self.scheduler.decide(now, &mut state.cursor);
        if decision.is_idle() {
            debug!("Idle tick at {}", now);
            return Ok(decision);
        }

        if let Some(boundary) = decision.query {
            self.query(&mut state, boundary).await;
        }
        let scored = match decision.scoring {
            Some(boundary) => self.score(&mut state, now, boundary).await,
            None => Ok(()),
        };

        if let Err(e) = self.io.store.save(&state.to_persisted()).await {
            warn!("Failed to persist state: {}", e);
        }
        scored.map(|_| decision)
    }

    async fn query(&self, state: &mut ValidatorState, boundary: DateTime<Utc>) {
        let submissions = self.io.forecasts.solicit(&state.eligible, boundary).await;
        let eligible: HashSet<ParticipantId> = state.eligible.iter().map(|p| p.id).collect();

        let mut accepted = Vec::with_capacity(submissions.len());
        for submission in submissions {
            if !eligible.contains(&submission.participant) {
                debug!("Ignoring forecast from unknown participant {}", submission.participant);
                continue;
            }
            state
                .history
                .add(submission.participant, boundary, submission.forecast);
            accepted.push(submission);
        }

        info!(
            "QUERY {}: {}/{} participants answered",
            boundary,
            accepted.len(),
            state.eligible.len()
        );
        self.io
            .telemetry
            .record(EpochReport {
                action: EpochAction::Query,
                boundary,
                participants: eligible_ids(state),
                responses: accepted,
                scores: WeightMap::new(),
                weights: state.weights.clone(),
            })
            .await;
    }

    async fn score(
        &self,
        state: &mut ValidatorState,
        now: DateTime<Utc>,
        boundary: DateTime<Utc>,
    ) -> Result<()> {
        let reference = self.scheduler.reference_time(boundary);
        let matured: Vec<(ParticipantId, Forecast)> = state
            .eligible
            .iter()
            .map(|p| (p.id, state.history.get(p.id, reference)))
            .collect();

        let truth = match self
            .retry
            .run("ground truth", || self.io.ground_truth.fetch(now, reference))
            .await
        {
            Ok(truth) => truth,
            Err(e) => {
                warn!("SCORING {} skipped: {}", boundary, e);
                return Err(e);
            }
        };

        let outcome = self.engine.score(&truth, &matured);
        state.weights = match &outcome {
            EpochOutcome::Shares(shares) => self.smoother.update(shares, &state.weights),
            EpochOutcome::Rewards(rewards) => rewards.clone(),
        };

        let answered = matured.iter().filter(|(_, f)| !f.is_empty()).count();
        info!(
            "SCORING {} (reference {}): price {:.2} -> {:.2}, {}/{} matured forecasts, {} scored",
            boundary,
            reference,
            truth.price_at_reference,
            truth.price_now,
            answered,
            matured.len(),
            outcome.scores().len()
        );
        for (id, weight) in &state.weights {
            debug!(
                "participant {}: score={:.6} weight={:.6}",
                id,
                outcome.scores().get(id).copied().unwrap_or(0.0),
                weight
            );
        }

        let responses = matured
            .into_iter()
            .filter(|(_, f)| !f.is_empty())
            .map(|(participant, forecast)| ForecastSubmission {
                participant,
                forecast,
            })
            .collect();
        self.io
            .telemetry
            .record(EpochReport {
                action: EpochAction::Scoring,
                boundary,
                participants: eligible_ids(state),
                responses,
                scores: outcome.scores().clone(),
                weights: state.weights.clone(),
            })
            .await;
        Ok(())
    }

    /// Pull the eligible set and reconcile weights and histories with it.
    pub async fn resync_membership(&self) -> Result<MembershipChange> {
        let participants = self
            .retry
            .run("membership", || self.io.membership.eligible())
            .await?;

        let mut state = self.state.lock().await;
        let change = state.apply_membership(participants);
        if change.is_empty() {
            debug!("Membership unchanged ({} eligible)", state.eligible.len());
        } else {
            info!(
                "Membership: {} eligible, added {:?}, replaced {:?}, removed {:?}",
                state.eligible.len(),
                change.added,
                change.replaced,
                change.removed
            );
        }
        Ok(change)
    }

    /// Drop history older than the retention window.
    pub async fn evict_history(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.history.evict_older_than(now);
        info!(
            "History eviction: removed {}, {} remain",
            removed,
            state.history.total_entries()
        );
        removed
    }

    /// Push weights to the ledger if its gate is open. Returns whether
    /// anything was emitted.
    pub async fn emit_weights(&self) -> Result<bool> {
        let state = self.state.lock().await;
        let weights = state.emission_weights();
        if weights.is_empty() {
            debug!("No eligible participants; nothing to emit");
            return Ok(false);
        }
        if !self.io.ledger.ready().await? {
            debug!("Ledger gate closed");
            return Ok(false);
        }
        if !state.weights.values().any(|w| *w > 0.0) {
            warn!(
                "No positive weights; emitting a uniform split over {} participants",
                weights.len()
            );
        }
        self.io.ledger.emit(&weights).await?;
        Ok(true)
    }

    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.state.lock().await.to_persisted();
        self.io.store.save(&snapshot).await
    }

    pub async fn weights(&self) -> WeightMap {
        self.state.lock().await.weights.clone()
    }
}

fn eligible_ids(state: &ValidatorState) -> Vec<ParticipantId> {
    state.eligible.iter().map(|p| p.id).collect()
}
