use crate::models::{JobStatus, MatchResultsResponse};
use crate::services::{Handoff, MatchApi};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between remote status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Message shown when the server reports failure without saying why
pub const FALLBACK_FAILURE_MESSAGE: &str = "Matching failed. Please try again.";

/// What one tick of a status source observed
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Still running
    Progress { progress: u8, current_step: String },

    /// Finished. `settle` is how long to hold at 100% before signalling completion.
    Completed {
        results: MatchResultsResponse,
        settle: Duration,
    },

    /// Finished unsuccessfully, or the fetch itself failed
    Failed { message: String },
}

/// Something the coordinator can poll for match progress
///
/// The coordinator owns scheduling and cancellation: it calls `tick` once
/// per `interval`, never overlapping two ticks, and stops after the first
/// terminal outcome. Sources that tick immediately get their first call at
/// once rather than after one interval.
#[async_trait]
pub trait StatusSource: Send {
    /// Fixed delay between ticks
    fn interval(&self) -> Duration;

    /// Whether the first tick runs as soon as polling starts
    fn tick_immediately(&self) -> bool {
        true
    }

    /// Short label for logs
    fn name(&self) -> &'static str;

    async fn tick(&mut self) -> Tick;
}

/// Polls the matching service for a real match job
pub struct RemoteStatusSource {
    api: Arc<dyn MatchApi>,
    match_id: String,
    session_id: String,
    interval: Duration,
    handoff: Option<Handoff>,
}

impl RemoteStatusSource {
    pub fn new(api: Arc<dyn MatchApi>, match_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            api,
            match_id: match_id.into(),
            session_id: session_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
            handoff: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Persist the terminal result set here once it has been fetched
    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoff = Some(handoff);
        self
    }

    async fn fetch_results(&self) -> Tick {
        let results = match self.api.get_match_results(&self.match_id, &self.session_id).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Failed to fetch results for match {}: {}", self.match_id, e);
                return Tick::Failed { message: e.message() };
            }
        };

        if let Some(handoff) = &self.handoff {
            if let Err(e) = handoff.write_results(&results).await {
                tracing::warn!("Failed to persist results for match {}: {}", self.match_id, e);
            }
        }

        Tick::Completed {
            results,
            settle: Duration::ZERO,
        }
    }
}

#[async_trait]
impl StatusSource for RemoteStatusSource {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &'static str {
        "remote"
    }

    async fn tick(&mut self) -> Tick {
        let status = match self.api.get_match_status(&self.match_id, &self.session_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(
                    "Status fetch failed for match {} (code {}): {}",
                    self.match_id,
                    e.code(),
                    e
                );
                return Tick::Failed { message: e.message() };
            }
        };

        tracing::debug!(
            "Match {} is {:?} at {}%: {}",
            self.match_id,
            status.status,
            status.progress,
            status.current_step
        );

        match status.status {
            JobStatus::Completed => self.fetch_results().await,
            JobStatus::Failed => Tick::Failed {
                message: status
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| FALLBACK_FAILURE_MESSAGE.to_string()),
            },
            JobStatus::Pending | JobStatus::Processing => Tick::Progress {
                progress: status.progress.min(100),
                current_step: status.current_step,
            },
        }
    }
}
