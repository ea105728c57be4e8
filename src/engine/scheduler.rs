//! Cycle scheduler — runs cycles one at a time on a fixed interval.
//!
//! Two phases, `Idle` and `Running`. A tick that arrives while a cycle is
//! running is dropped, not queued. The recurring loop fires immediately on
//! start, awaits each cycle to completion, and re-arms the interval only
//! afterwards.
//!
//! `CycleState` lives behind a `StatusHandle` and is written only at cycle
//! boundaries. Readers (the status server) get the last completed snapshot
//! and never wait on an in-flight cycle.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::analysis::Analyzer;
use super::cycle::{log_cycle_result, run_cycle};
use crate::marketplace::ListingSource;
use crate::types::{CycleOutcome, CycleState, SearchQuery};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Read access to the scheduler's `CycleState`.
#[derive(Clone, Default)]
pub struct StatusHandle {
    state: Arc<RwLock<CycleState>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state instead of a fresh one.
    pub fn with_state(state: CycleState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of the state as of the last completed cycle.
    pub async fn snapshot(&self) -> CycleState {
        self.state.read().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(CycleOutcome),
    /// A cycle was already running.
    Skipped,
}

/// Resets the phase to `Idle` however the cycle ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CycleScheduler {
    source: Arc<dyn ListingSource>,
    analyzer: Arc<dyn Analyzer>,
    query: SearchQuery,
    interval: Duration,
    running: AtomicBool,
    status: StatusHandle,
}

impl CycleScheduler {
    pub fn new(
        source: Arc<dyn ListingSource>,
        analyzer: Arc<dyn Analyzer>,
        query: SearchQuery,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            analyzer,
            query,
            interval,
            running: AtomicBool::new(false),
            status: StatusHandle::new(),
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn phase(&self) -> Phase {
        if self.running.load(Ordering::Acquire) {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    /// `Idle -> Running`, or `None` if already running.
    fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    /// Run one cycle unless one is already in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("Cycle still running; tick skipped");
            return TickOutcome::Skipped;
        };

        let cycle = self.status.state.read().await.cycles_run + 1;
        info!(cycle, analyzer = self.analyzer.name(), "Starting cycle");

        let result = run_cycle(&*self.source, &*self.analyzer, &self.query).await;

        let (outcome, consecutive_failures) = {
            let mut state = self.status.state.write().await;
            let now = Utc::now();
            let outcome = match &result {
                Ok(summary) => state.record_success(summary, now),
                Err(e) => state.record_failure(e, now),
            };
            (outcome, state.consecutive_failures)
        };

        log_cycle_result(cycle, &result, consecutive_failures);
        TickOutcome::Completed(outcome)
    }

    /// Run cycles until `shutdown` resolves. The first cycle starts
    /// immediately; an in-flight cycle always finishes before returning.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested; scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                    interval.reset();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
