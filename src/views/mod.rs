//! Client views: submission, processing and results.
//!
//! Views never hold references to each other. The submission view writes a
//! [`SubmissionRecord`](crate::models::SubmissionRecord) to the handoff, the
//! processing view reads it and eventually writes the result set, and the
//! results view reads that. A view that finds its input missing redirects.

pub mod processing;
pub mod results;
pub mod submission;

use crate::config::Settings;
use crate::services::{open_store, ApiError, Handoff, HandoffError, MatchApi, RemoteClient};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The three client views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Submit,
    Processing,
    Results,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Submit => "/",
            Route::Processing => "/processing",
            Route::Results => "/results",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to create API client: {0}")]
    Client(#[from] ApiError),

    #[error("Failed to open handoff store: {0}")]
    Handoff(#[from] HandoffError),
}

/// Shared state for every view
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn MatchApi>,
    pub handoff: Handoff,
    pub settings: Settings,
}

impl AppState {
    pub fn new(api: Arc<dyn MatchApi>, handoff: Handoff, settings: Settings) -> Self {
        Self { api, handoff, settings }
    }

    /// Build the remote client and handoff store described by `settings`
    pub async fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        let api = RemoteClient::new(&settings.api.base_url, settings.api.timeout())?;
        let store = open_store(&settings.handoff).await?;
        let handoff = Handoff::new(store, settings.handoff.scope.clone());

        tracing::info!(
            "Using {} (mock mode: {}, scope: {})",
            api.base_url(),
            settings.mode.use_mock,
            handoff.scope()
        );

        Ok(Self::new(Arc::new(api), handoff, settings))
    }

    pub fn use_mock(&self) -> bool {
        self.settings.mode.use_mock
    }
}
