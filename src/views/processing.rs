use crate::core::{CoordinatorError, MatchCoordinator, MatchSnapshot, MockProgressSource, Phase, PollOutcome};
use crate::models::MatchResultsResponse;
use crate::views::{AppState, Route};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the processing view leaves the user
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// Nothing to process; go back to the named view
    Redirect(Route),

    /// Results are in the handoff; show the results view
    Completed(MatchResultsResponse),

    /// Show `message` with a retry action leading to `retry`
    Failed { message: String, retry: Route },

    /// The view was torn down before the match finished
    Abandoned,
}

impl ProcessingOutcome {
    /// The view to show next, if any
    pub fn next_route(&self) -> Option<Route> {
        match self {
            ProcessingOutcome::Redirect(route) => Some(*route),
            ProcessingOutcome::Completed(_) => Some(Route::Results),
            ProcessingOutcome::Failed { .. } | ProcessingOutcome::Abandoned => None,
        }
    }
}

/// Run the processing view until the match finishes or `teardown` fires
///
/// `on_update` is called with every snapshot the coordinator publishes.
/// Cancelling `teardown` stops polling at once; no further status fetches
/// or mock ticks happen after this function returns.
pub async fn run<F>(
    state: &AppState,
    teardown: CancellationToken,
    mut on_update: F,
) -> Result<ProcessingOutcome, CoordinatorError>
where
    F: FnMut(&MatchSnapshot),
{
    let record = match state.handoff.read_submission().await {
        Some(record) => record,
        None => {
            tracing::info!("No submission found, redirecting to {}", Route::Submit);
            return Ok(ProcessingOutcome::Redirect(Route::Submit));
        }
    };

    let polling = &state.settings.polling;
    let mut coordinator = MatchCoordinator::new(Arc::clone(&state.api))
        .with_poll_interval(polling.interval())
        .with_handoff(state.handoff.clone());
    let mut updates = coordinator.subscribe();

    let handle = if state.use_mock() {
        let source = MockProgressSource::new()
            .with_interval(polling.mock_tick())
            .with_completion_delay(polling.mock_completion_delay())
            .with_handoff(state.handoff.clone());
        coordinator.poll_with(Box::new(source))?
    } else {
        coordinator.poll_status(&record.match_id, &record.session_id)?
    };

    tracing::info!("Processing match {} for {}", record.match_id, record.university);

    loop {
        let phase = {
            let snapshot = updates.borrow_and_update();
            on_update(&*snapshot);
            snapshot.phase
        };

        if phase.is_terminal() || phase == Phase::Idle {
            break;
        }

        tokio::select! {
            biased;
            _ = teardown.cancelled() => {
                tracing::info!("Processing view closed, stopping poll");
                coordinator.stop_polling();
                return Ok(ProcessingOutcome::Abandoned);
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    let outcome = match handle.wait().await {
        PollOutcome::Completed(results) => ProcessingOutcome::Completed(results),
        PollOutcome::Failed(message) => ProcessingOutcome::Failed {
            message,
            retry: Route::Submit,
        },
        PollOutcome::Cancelled => ProcessingOutcome::Abandoned,
    };
    Ok(outcome)
}
