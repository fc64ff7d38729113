//! Match lifecycle coordinator.
//!
//! Drives one match attempt through `idle → starting → polling →
//! {completed | failed}`. Observable state is published on a
//! [`tokio::sync::watch`] channel; each poll run is owned by the
//! [`PollHandle`] returned from [`MatchCoordinator::poll_status`] or
//! [`MatchCoordinator::poll_with`], and dropping that handle stops it.
//!
//! # Example
//!
//! ```ignore
//! let mut coordinator = MatchCoordinator::new(api);
//! let match_id = coordinator.start(&session_id, university, &interests, &file_ids).await?;
//! let handle = coordinator.poll_status(&match_id, &session_id)?;
//! match handle.wait().await {
//!     PollOutcome::Completed(results) => render(results),
//!     PollOutcome::Failed(message) => show_error(message),
//!     PollOutcome::Cancelled => {}
//! }
//! ```

use crate::core::source::{RemoteStatusSource, StatusSource, Tick, DEFAULT_POLL_INTERVAL};
use crate::models::MatchResultsResponse;
use crate::services::{ApiError, Handoff, MatchApi};
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Step label shown before the first status arrives
pub const INITIAL_STEP: &str = "Initializing...";

/// Shortest interval a poll run will tick at
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Reported when a poll run dies without reaching a terminal state
pub const POLL_ABORTED_MESSAGE: &str = "Polling stopped unexpectedly. Please try again.";

/// Lifecycle phase of a match attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Polling,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Polling => "polling",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything a view can observe about the current attempt
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchSnapshot {
    pub phase: Phase,
    pub match_id: Option<String>,
    pub progress: u8,
    pub current_step: String,
    pub results: Option<MatchResultsResponse>,
    pub error: Option<String>,
    /// Bumped whenever a run is superseded; stale runs must not publish
    epoch: u64,
}

/// Errors from driving the coordinator out of order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("match already {0}; call start or reset before polling again")]
    AlreadyTerminal(Phase),
}

/// How a poll run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(MatchResultsResponse),
    Failed(String),
    Cancelled,
}

/// Disposer for one poll run
///
/// Cancelling or dropping the handle stops the timer. A view that goes away
/// must drop its handle so no orphaned run keeps ticking.
#[must_use = "dropping a PollHandle cancels the poll"]
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the run to reach a terminal state or be cancelled
    ///
    /// A run that panicked is reported as failed, never as cancelled.
    pub async fn wait(mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Cancelled;
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PollOutcome::Cancelled,
            Err(e) => {
                tracing::error!("Poll task failed: {}", e);
                PollOutcome::Failed(POLL_ABORTED_MESSAGE.to_string())
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns the lifecycle state machine for one match attempt at a time
pub struct MatchCoordinator {
    api: Arc<dyn MatchApi>,
    state: Arc<watch::Sender<MatchSnapshot>>,
    active: Option<CancellationToken>,
    poll_interval: Duration,
    handoff: Option<Handoff>,
}

impl MatchCoordinator {
    pub fn new(api: Arc<dyn MatchApi>) -> Self {
        let (state, _) = watch::channel(MatchSnapshot::default());
        Self {
            api,
            state: Arc::new(state),
            active: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handoff: None,
        }
    }

    /// Interval between remote status fetches, at least [`MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Persist terminal results of remote polls to this handoff
    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<MatchSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// Create the remote match job
    ///
    /// Clears any previous attempt. On failure the coordinator is left in
    /// `failed` and never enters `polling`.
    pub async fn start(
        &mut self,
        session_id: &str,
        university: &str,
        research_interests: &[String],
        file_ids: &[String],
    ) -> Result<String, ApiError> {
        let epoch = self.supersede(|s| {
            s.phase = Phase::Starting;
            s.current_step = INITIAL_STEP.to_string();
        });
        tracing::info!("Starting match for session {}", session_id);

        match self
            .api
            .start_match(session_id, university, research_interests, file_ids)
            .await
        {
            Ok(job) => {
                publish(&self.state, epoch, |s| s.match_id = Some(job.match_id.clone()));
                Ok(job.match_id)
            }
            Err(e) => {
                tracing::error!("Failed to start match: {}", e);
                publish(&self.state, epoch, |s| {
                    s.phase = Phase::Failed;
                    s.error = Some(e.message());
                });
                Err(e)
            }
        }
    }

    /// Poll the matching service for `match_id` until it finishes
    pub fn poll_status(&mut self, match_id: &str, session_id: &str) -> Result<PollHandle, CoordinatorError> {
        let mut source = RemoteStatusSource::new(Arc::clone(&self.api), match_id, session_id)
            .with_interval(self.poll_interval);
        if let Some(handoff) = &self.handoff {
            source = source.with_handoff(handoff.clone());
        }

        self.spawn_poll(Box::new(source), Some(match_id.to_string()))
    }

    /// Drive any status source through the polling phase
    ///
    /// Ticks at the source's interval, starting at once when the source
    /// asks for an immediate tick. Any run already in progress is cancelled
    /// first.
    pub fn poll_with(&mut self, source: Box<dyn StatusSource>) -> Result<PollHandle, CoordinatorError> {
        self.spawn_poll(source, None)
    }

    fn spawn_poll(
        &mut self,
        mut source: Box<dyn StatusSource>,
        match_id: Option<String>,
    ) -> Result<PollHandle, CoordinatorError> {
        let phase = self.phase();
        if phase.is_terminal() {
            return Err(CoordinatorError::AlreadyTerminal(phase));
        }

        let match_id = match_id.or_else(|| self.state.borrow().match_id.clone());
        let epoch = self.supersede(|s| {
            s.phase = Phase::Polling;
            s.match_id = match_id;
            s.current_step = INITIAL_STEP.to_string();
        });

        let token = CancellationToken::new();
        self.active = Some(token.clone());

        let state = Arc::clone(&self.state);
        let run_token = token.clone();
        tracing::info!(
            "Polling {} source every {}ms",
            source.name(),
            source.interval().as_millis()
        );

        let task = tokio::spawn(async move {
            let name = source.name();
            let run = AssertUnwindSafe(run_poll(source.as_mut(), &state, epoch, &run_token));
            let result = run.catch_unwind().await;
            match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!("{} source panicked while polling", name);
                    publish(&state, epoch, |s| {
                        s.phase = Phase::Failed;
                        s.error = Some(POLL_ABORTED_MESSAGE.to_string());
                    });
                    PollOutcome::Failed(POLL_ABORTED_MESSAGE.to_string())
                }
            }
        });

        Ok(PollHandle {
            cancel: token,
            task: Some(task),
        })
    }

    /// Cancel the active poll run
    ///
    /// An unfinished attempt drops back to `idle`; progress observed so far
    /// and any terminal outcome stay visible.
    pub fn stop_polling(&mut self) {
        self.cancel_active();
        self.state.send_modify(|s| {
            s.epoch += 1;
            if !s.phase.is_terminal() {
                s.phase = Phase::Idle;
            }
        });
    }

    /// Cancel everything and return to `idle` with a cleared snapshot
    pub fn reset(&mut self) {
        self.supersede(|_| {});
        tracing::debug!("Coordinator reset");
    }

    fn cancel_active(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
            tracing::debug!("Polling stopped");
        }
    }

    /// Cancel the active run and replace the snapshot, returning the new epoch
    fn supersede(&mut self, init: impl FnOnce(&mut MatchSnapshot)) -> u64 {
        self.cancel_active();
        let mut epoch = 0;
        self.state.send_modify(|s| {
            epoch = s.epoch + 1;
            *s = MatchSnapshot {
                epoch,
                ..MatchSnapshot::default()
            };
            init(s);
        });
        epoch
    }
}

impl Drop for MatchCoordinator {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

/// Apply `update` only if no newer run has taken over the snapshot
fn publish(state: &watch::Sender<MatchSnapshot>, epoch: u64, update: impl FnOnce(&mut MatchSnapshot)) -> bool {
    state.send_if_modified(|s| {
        if s.epoch != epoch {
            return false;
        }
        update(s);
        true
    })
}

async fn run_poll(
    source: &mut dyn StatusSource,
    state: &watch::Sender<MatchSnapshot>,
    epoch: u64,
    cancel: &CancellationToken,
) -> PollOutcome {
    let period = source.interval().max(MIN_POLL_INTERVAL);
    let first = if source.tick_immediately() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = tokio::time::interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = interval.tick() => {}
        }

        // The next tick is not awaited until this one resolves
        let tick = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            tick = source.tick() => tick,
        };

        match tick {
            Tick::Progress { progress, current_step } => {
                publish(state, epoch, |s| {
                    s.progress = progress;
                    s.current_step = current_step;
                });
            }
            Tick::Completed { results, settle } => {
                publish(state, epoch, |s| s.progress = 100);

                if !settle.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return PollOutcome::Cancelled,
                        _ = tokio::time::sleep(settle) => {}
                    }
                }

                tracing::info!("Match completed with {} results", results.matches.len());
                publish(state, epoch, |s| {
                    s.phase = Phase::Completed;
                    s.results = Some(results.clone());
                });
                return PollOutcome::Completed(results);
            }
            Tick::Failed { message } => {
                tracing::warn!("Match failed: {}", message);
                publish(state, epoch, |s| {
                    s.phase = Phase::Failed;
                    s.error = Some(message.clone());
                });
                return PollOutcome::Failed(message);
            }
        }
    }
}
