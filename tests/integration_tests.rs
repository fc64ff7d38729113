// Integration tests for ProfMatch

use async_trait::async_trait;
use prof_match::config::Settings;
use prof_match::core::mock::canned_results;
use prof_match::core::coordinator::POLL_ABORTED_MESSAGE;
use prof_match::core::{CoordinatorError, MatchCoordinator, MockProgressSource, Phase, PollOutcome, StatusSource, Tick};
use prof_match::models::{
    HealthResponse, JobStatus, MatchJob, MatchResultsResponse, MatchStatus, ProfessorProfile, Session,
    UploadResponse, UploadStatus, UploadedFile,
};
use prof_match::services::{ApiError, Handoff, MatchApi, MemoryStore, ProgressCallback};
use prof_match::views::processing::{self, ProcessingOutcome};
use prof_match::views::results::{self, ResultsView};
use prof_match::views::submission::{self, Submission, SubmissionError};
use prof_match::views::{AppState, Route};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

const POLL: Duration = Duration::from_millis(2000);

/// Scripted matching service; the last status repeats once the script runs out
#[derive(Default)]
struct FakeApi {
    statuses: Mutex<Vec<Result<MatchStatus, ApiError>>>,
    start_error: Option<ApiError>,
    status_calls: AtomicUsize,
    results_calls: AtomicUsize,
    sessions: AtomicUsize,
    uploads: AtomicUsize,
    started_with: Mutex<Option<Vec<String>>>,
    status_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApi {
    fn with_statuses(statuses: Vec<Result<MatchStatus, ApiError>>) -> Self {
        Self {
            statuses: Mutex::new(statuses),
            ..Default::default()
        }
    }

    fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn results_calls(&self) -> usize {
        self.results_calls.load(Ordering::SeqCst)
    }
}

fn status(status: JobStatus, progress: u8, step: &str) -> Result<MatchStatus, ApiError> {
    Ok(MatchStatus {
        status,
        progress,
        current_step: step.to_string(),
        error: None,
    })
}

fn failed(error: Option<&str>) -> Result<MatchStatus, ApiError> {
    Ok(MatchStatus {
        status: JobStatus::Failed,
        progress: 40,
        current_step: String::new(),
        error: error.map(str::to_string),
    })
}

#[async_trait]
impl MatchApi for FakeApi {
    async fn health(&self) -> Result<HealthResponse, ApiError> {
        Ok(HealthResponse {
            status: "healthy".to_string(),
        })
    }

    async fn create_session(&self) -> Result<Session, ApiError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Session {
            session_id: format!("session-{}", n + 1),
            created_at: chrono::Utc::now(),
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, ApiError> {
        Ok(Session {
            session_id: session_id.to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    async fn delete_session(&self, _session_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn upload_file(
        &self,
        _session_id: &str,
        file: &UploadedFile,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse, ApiError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = on_progress {
            callback(100);
        }
        Ok(UploadResponse {
            file_id: format!("file-{}", n + 1),
            filename: file.filename.clone(),
            status: UploadStatus::Uploaded,
        })
    }

    async fn start_match(
        &self,
        _session_id: &str,
        _university: &str,
        _research_interests: &[String],
        file_ids: &[String],
    ) -> Result<MatchJob, ApiError> {
        if let Some(e) = &self.start_error {
            return Err(e.clone());
        }
        *self.started_with.lock().unwrap() = Some(file_ids.to_vec());
        Ok(MatchJob {
            match_id: "match-1".to_string(),
        })
    }

    async fn get_match_status(&self, _match_id: &str, _session_id: &str) -> Result<MatchStatus, ApiError> {
        let n = self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.status_delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let statuses = self.statuses.lock().unwrap();
        let index = n.min(statuses.len().saturating_sub(1));
        statuses
            .get(index)
            .cloned()
            .unwrap_or_else(|| status(JobStatus::Pending, 0, "Queued"))
    }

    async fn get_match_results(&self, _match_id: &str, session_id: &str) -> Result<MatchResultsResponse, ApiError> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        let mut results = canned_results(12.5);
        results.session_id = session_id.to_string();
        Ok(results)
    }

    async fn get_professor(&self, professor_id: &str) -> Result<ProfessorProfile, ApiError> {
        Err(ApiError::Application {
            status: 404,
            message: format!("Professor {} not found", professor_id),
        })
    }
}

fn memory_handoff() -> Handoff {
    Handoff::new(Arc::new(MemoryStore::default()), "test")
}

fn app_state(api: Arc<FakeApi>, use_mock: bool) -> AppState {
    let mut settings = Settings::default();
    settings.mode.use_mock = use_mock;
    AppState::new(api, memory_handoff(), settings)
}

fn resume() -> UploadedFile {
    UploadedFile::new("cv.pdf", "application/pdf", b"%PDF-1.4".to_vec())
}

#[tokio::test(start_paused = true)]
async fn test_completed_match_fetches_results_once() {
    let api = Arc::new(FakeApi::with_statuses(vec![
        status(JobStatus::Processing, 30, "Retrieving faculty listings..."),
        status(JobStatus::Processing, 60, "Computing research alignment..."),
        status(JobStatus::Completed, 100, "Done"),
    ]));
    let handoff = memory_handoff();
    let mut coordinator = MatchCoordinator::new(api.clone()).with_handoff(handoff.clone());

    let started = Instant::now();
    let handle = coordinator.poll_status("match-1", "session-1").unwrap();
    let outcome = handle.wait().await;

    let PollOutcome::Completed(results) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(results.matches.len(), 3);
    assert_eq!(api.status_calls(), 3);
    assert_eq!(api.results_calls(), 1);
    assert!(started.elapsed() >= POLL * 2);

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.phase, Phase::Completed);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.match_id.as_deref(), Some("match-1"));
    assert_eq!(handoff.read_results().await, Some(results));

    // No further fetches once terminal
    sleep(POLL * 5).await;
    assert_eq!(api.status_calls(), 3);
    assert_eq!(api.results_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_match_stops_polling() {
    let api = Arc::new(FakeApi::with_statuses(vec![
        status(JobStatus::Processing, 20, "Analyzing professor publications..."),
        failed(Some("quota exceeded")),
    ]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let outcome = coordinator.poll_status("match-1", "session-1").unwrap().wait().await;
    assert_eq!(outcome, PollOutcome::Failed("quota exceeded".to_string()));

    sleep(POLL * 5).await;
    assert_eq!(api.status_calls(), 2);
    assert_eq!(api.results_calls(), 0);

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.phase, Phase::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("quota exceeded"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_without_reason_uses_fallback_message() {
    let api = Arc::new(FakeApi::with_statuses(vec![failed(None)]));
    let mut coordinator = MatchCoordinator::new(api);

    let outcome = coordinator.poll_status("match-1", "session-1").unwrap().wait().await;
    assert_eq!(outcome, PollOutcome::Failed("Matching failed. Please try again.".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_status_fetch_error_fails_the_match() {
    let api = Arc::new(FakeApi::with_statuses(vec![Err(ApiError::Transport {
        message: "Network error: connection refused".to_string(),
    })]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let outcome = coordinator.poll_status("match-1", "session-1").unwrap().wait().await;
    assert_eq!(outcome, PollOutcome::Failed("Network error: connection refused".to_string()));
    assert_eq!(api.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_published_between_polls() {
    let api = Arc::new(FakeApi::with_statuses(vec![
        status(JobStatus::Pending, 0, "Queued"),
        status(JobStatus::Processing, 45, "Parsing your research profile..."),
    ]));
    let mut coordinator = MatchCoordinator::new(api.clone());
    let updates = coordinator.subscribe();

    let _handle = coordinator.poll_status("match-1", "session-1").unwrap();
    sleep(POLL + Duration::from_millis(100)).await;

    let snapshot = updates.borrow().clone();
    assert_eq!(snapshot.phase, Phase::Polling);
    assert_eq!(snapshot.progress, 45);
    assert_eq!(snapshot.current_step, "Parsing your research profile...");
    assert_eq!(api.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetches_never_overlap() {
    let api = Arc::new(FakeApi {
        statuses: Mutex::new(vec![
            status(JobStatus::Processing, 10, "Working"),
            status(JobStatus::Processing, 20, "Working"),
            status(JobStatus::Processing, 30, "Working"),
            status(JobStatus::Completed, 100, "Done"),
        ]),
        status_delay: Some(Duration::from_millis(3500)),
        ..Default::default()
    });
    let mut coordinator = MatchCoordinator::new(api.clone());

    let outcome = coordinator.poll_status("match-1", "session-1").unwrap().wait().await;

    assert!(matches!(outcome, PollOutcome::Completed(_)));
    assert_eq!(api.status_calls(), 4);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_polling_cancels_timer() {
    let api = Arc::new(FakeApi::with_statuses(vec![status(JobStatus::Processing, 10, "Working")]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let handle = coordinator.poll_status("match-1", "session-1").unwrap();
    sleep(Duration::from_millis(5000)).await;
    assert_eq!(api.status_calls(), 3);

    coordinator.stop_polling();
    sleep(POLL * 5).await;

    assert_eq!(api.status_calls(), 3);
    assert_eq!(coordinator.phase(), Phase::Idle);
    assert_eq!(coordinator.snapshot().progress, 10);
    assert_eq!(handle.wait().await, PollOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_timer() {
    let api = Arc::new(FakeApi::with_statuses(vec![status(JobStatus::Processing, 10, "Working")]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let handle = coordinator.poll_status("match-1", "session-1").unwrap();
    sleep(Duration::from_millis(100)).await;
    drop(handle);

    sleep(POLL * 5).await;
    assert_eq!(api.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_state_and_timers() {
    let api = Arc::new(FakeApi::with_statuses(vec![status(JobStatus::Processing, 55, "Working")]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let _handle = coordinator.poll_status("match-1", "session-1").unwrap();
    sleep(Duration::from_millis(100)).await;
    coordinator.reset();

    sleep(POLL * 5).await;
    assert_eq!(api.status_calls(), 1);

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.match_id.is_none());
    assert!(snapshot.results.is_none());
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_new_poll_supersedes_previous_run() {
    let api = Arc::new(FakeApi::with_statuses(vec![status(JobStatus::Processing, 10, "Working")]));
    let mut coordinator = MatchCoordinator::new(api.clone());

    let first = coordinator.poll_status("match-1", "session-1").unwrap();
    sleep(Duration::from_millis(100)).await;
    let _second = coordinator.poll_status("match-2", "session-1").unwrap();

    assert_eq!(first.wait().await, PollOutcome::Cancelled);
    assert_eq!(coordinator.snapshot().match_id.as_deref(), Some("match-2"));
}

#[tokio::test]
async fn test_start_failure_leaves_coordinator_failed() {
    let api = Arc::new(FakeApi {
        start_error: Some(ApiError::Application {
            status: 500,
            message: "Internal Server Error".to_string(),
        }),
        ..Default::default()
    });
    let mut coordinator = MatchCoordinator::new(api.clone());

    let err = coordinator
        .start("session-1", "https://www.mit.edu", &["ml".to_string()], &["file-1".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code(), 500);
    assert_eq!(coordinator.phase(), Phase::Failed);
    assert_eq!(coordinator.snapshot().error.as_deref(), Some("Internal Server Error"));

    let poll = coordinator.poll_status("match-1", "session-1");
    assert!(matches!(poll, Err(CoordinatorError::AlreadyTerminal(Phase::Failed))));
    assert_eq!(api.status_calls(), 0);
}

#[tokio::test]
async fn test_start_records_match_id() {
    let api = Arc::new(FakeApi::default());
    let mut coordinator = MatchCoordinator::new(api);

    let match_id = coordinator
        .start("session-1", "https://www.mit.edu", &["ml".to_string()], &["file-1".to_string()])
        .await
        .unwrap();
    assert_eq!(match_id, "match-1");

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.phase, Phase::Starting);
    assert_eq!(snapshot.match_id.as_deref(), Some("match-1"));
}

#[tokio::test(start_paused = true)]
async fn test_mock_source_completes_with_canned_results() {
    let handoff = memory_handoff();
    let mut coordinator = MatchCoordinator::new(Arc::new(FakeApi::default()));
    let source = MockProgressSource::seeded(7).with_handoff(handoff.clone());

    let mut updates = coordinator.subscribe();
    let started = Instant::now();
    let handle = coordinator.poll_with(Box::new(source)).unwrap();

    // No increment before the first 800ms tick
    while updates.borrow_and_update().progress == 0 {
        updates.changed().await.unwrap();
    }
    assert_eq!(started.elapsed(), Duration::from_millis(800));

    let outcome = handle.wait().await;
    let elapsed = started.elapsed();

    let PollOutcome::Completed(results) = outcome else {
        panic!("expected completion");
    };
    let scores: Vec<f64> = results.matches.iter().map(|m| m.match_score).collect();
    assert_eq!(scores, vec![92.0, 85.0, 78.0]);

    // Increments are below 20%, so reaching 100 takes at least 6 ticks
    assert!(elapsed >= Duration::from_millis(800 * 6 + 500));
    assert!(elapsed <= Duration::from_millis(800 * 20 + 500));
    assert_eq!(coordinator.snapshot().progress, 100);
    assert_eq!(handoff.read_results().await, Some(results));
}

/// Source whose first tick panics
struct PanickingSource;

#[async_trait]
impl StatusSource for PanickingSource {
    fn interval(&self) -> Duration {
        POLL
    }

    fn name(&self) -> &'static str {
        "panicking"
    }

    async fn tick(&mut self) -> Tick {
        panic!("source blew up");
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_source_fails_instead_of_cancelling() {
    let mut coordinator = MatchCoordinator::new(Arc::new(FakeApi::default()));

    let outcome = coordinator.poll_with(Box::new(PanickingSource)).unwrap().wait().await;
    assert_eq!(outcome, PollOutcome::Failed(POLL_ABORTED_MESSAGE.to_string()));

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.phase, Phase::Failed);
    assert_eq!(snapshot.error.as_deref(), Some(POLL_ABORTED_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_is_clamped() {
    let api = Arc::new(FakeApi::with_statuses(vec![
        status(JobStatus::Processing, 30, "Working"),
        status(JobStatus::Completed, 100, "Done"),
    ]));
    let mut coordinator = MatchCoordinator::new(api.clone()).with_poll_interval(Duration::ZERO);

    let outcome = coordinator.poll_status("match-1", "session-1").unwrap().wait().await;
    assert!(matches!(outcome, PollOutcome::Completed(_)));
    assert_eq!(api.status_calls(), 2);
    assert_eq!(api.results_calls(), 1);
}

#[tokio::test]
async fn test_missing_submission_redirects() {
    let state = app_state(Arc::new(FakeApi::default()), false);

    let outcome = processing::run(&state, CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(outcome, ProcessingOutcome::Redirect(Route::Submit));
    assert_eq!(results::load(&state.handoff).await, ResultsView::Redirect(Route::Submit));
}

#[tokio::test]
async fn test_empty_results_view() {
    let state = app_state(Arc::new(FakeApi::default()), false);
    let mut empty = canned_results(1.0);
    empty.matches.clear();
    state.handoff.write_results(&empty).await.unwrap();

    assert_eq!(results::load(&state.handoff).await, ResultsView::Empty);
}

#[tokio::test]
async fn test_invalid_submission_makes_no_requests() {
    let api = Arc::new(FakeApi::default());
    let state = app_state(api.clone(), false);
    let submission = Submission {
        university: "not a url".to_string(),
        research_interests: "ml".to_string(),
        files: vec![resume()],
    };

    let err = submission::submit(&state, &submission, None).await.unwrap_err();
    let SubmissionError::Invalid(fields) = err else {
        panic!("expected validation error");
    };
    assert!(fields.get("university").is_some());
    assert_eq!(api.sessions.load(Ordering::SeqCst), 0);
    assert!(state.handoff.read_submission().await.is_none());
}

#[tokio::test]
async fn test_real_submission_uploads_then_starts() {
    let api = Arc::new(FakeApi::default());
    let state = app_state(api.clone(), false);
    let submission = Submission {
        university: "https://www.mit.edu".to_string(),
        research_interests: "machine learning, robotics".to_string(),
        files: vec![resume(), UploadedFile::new("notes.txt", "text/plain", b"notes".to_vec())],
    };

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let observer: submission::UploadObserver = Arc::new(move |name: &str, pct: u8| {
        sink.lock().unwrap().push((name.to_string(), pct));
    });

    let record = submission::submit(&state, &submission, Some(observer)).await.unwrap();
    assert_eq!(record.session_id, "session-1");
    assert_eq!(record.match_id, "match-1");
    assert_eq!(record.research_interests, vec!["machine learning", "robotics"]);

    let started_with = api.started_with.lock().unwrap().clone();
    assert_eq!(started_with, Some(vec!["file-1".to_string(), "file-2".to_string()]));
    assert_eq!(
        *progress.lock().unwrap(),
        vec![("cv.pdf".to_string(), 100), ("notes.txt".to_string(), 100)]
    );
    assert_eq!(state.handoff.read_submission().await, Some(record));
}

#[tokio::test(start_paused = true)]
async fn test_mock_flow_end_to_end() {
    let api = Arc::new(FakeApi::default());
    let state = app_state(api.clone(), true);
    let submission = Submission {
        university: "https://www.mit.edu".to_string(),
        research_interests: "computer vision".to_string(),
        files: vec![resume()],
    };

    let record = submission::submit(&state, &submission, None).await.unwrap();
    assert_eq!(record.session_id, "mock-session");
    assert_eq!(record.match_id, "mock-match");
    assert_eq!(api.sessions.load(Ordering::SeqCst), 0);

    let mut last_progress = 0;
    let outcome = processing::run(&state, CancellationToken::new(), |snapshot| {
        assert!(snapshot.progress >= last_progress);
        last_progress = snapshot.progress;
    })
    .await
    .unwrap();

    assert_eq!(outcome.next_route(), Some(Route::Results));
    let ResultsView::Matches(results) = results::load(&state.handoff).await else {
        panic!("expected results");
    };
    assert_eq!(results.matches.len(), 3);
    assert_eq!(results.matches[0].professor.name, "Dr. Sarah Chen");
    assert_eq!(api.status_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_flow_end_to_end() {
    let api = Arc::new(FakeApi::with_statuses(vec![
        status(JobStatus::Processing, 50, "Computing research alignment..."),
        status(JobStatus::Completed, 100, "Done"),
    ]));
    let state = app_state(api.clone(), false);
    let submission = Submission {
        university: "https://www.mit.edu".to_string(),
        research_interests: "computer vision".to_string(),
        files: vec![resume()],
    };

    submission::submit(&state, &submission, None).await.unwrap();
    let outcome = processing::run(&state, CancellationToken::new(), |_| {}).await.unwrap();

    let ProcessingOutcome::Completed(results) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(results.session_id, "session-1");
    assert_eq!(api.results_calls(), 1);
    assert_eq!(state.handoff.read_results().await, Some(results));
}

#[tokio::test(start_paused = true)]
async fn test_processing_teardown_stops_polling() {
    let api = Arc::new(FakeApi::with_statuses(vec![status(JobStatus::Processing, 10, "Working")]));
    let state = app_state(api.clone(), false);
    state
        .handoff
        .write_submission(&prof_match::SubmissionRecord {
            session_id: "session-1".to_string(),
            match_id: "match-1".to_string(),
            university: "https://www.mit.edu".to_string(),
            research_interests: vec!["ml".to_string()],
        })
        .await
        .unwrap();

    let teardown = CancellationToken::new();
    let closer = teardown.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(3000)).await;
        closer.cancel();
    });

    let outcome = processing::run(&state, teardown, |_| {}).await.unwrap();
    assert_eq!(outcome, ProcessingOutcome::Abandoned);
    assert_eq!(api.status_calls(), 2);

    sleep(POLL * 5).await;
    assert_eq!(api.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_processing_offers_retry() {
    let api = Arc::new(FakeApi::with_statuses(vec![failed(Some("quota exceeded"))]));
    let state = app_state(api, false);
    state
        .handoff
        .write_submission(&prof_match::SubmissionRecord {
            session_id: "session-1".to_string(),
            match_id: "match-1".to_string(),
            university: "https://www.mit.edu".to_string(),
            research_interests: vec!["ml".to_string()],
        })
        .await
        .unwrap();

    let outcome = processing::run(&state, CancellationToken::new(), |_| {}).await.unwrap();
    assert_eq!(
        outcome,
        ProcessingOutcome::Failed {
            message: "quota exceeded".to_string(),
            retry: Route::Submit,
        }
    );
}
