//! ProfMatch - client for the research supervisor matching service
//!
//! Submits a student's target university, research interests and résumé to
//! the matching service, follows the match while it is processed and renders
//! the ranked professors. A simulated mode runs the whole flow without a
//! backend.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;
pub mod views;

// Re-export commonly used types
pub use crate::config::Settings;
pub use crate::core::{ExportFormat, MatchCoordinator, MatchSnapshot, MockProgressSource, Phase, PollOutcome};
pub use crate::models::{MatchResult, MatchResultsResponse, ProfessorProfile, SubmissionRecord};
pub use crate::services::{ApiError, Handoff, MatchApi, RemoteClient};
pub use crate::views::{AppState, Route};
