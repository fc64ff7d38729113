// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{CitationMetrics, MatchResult, ProfessorProfile, Publication, SubmissionRecord, UploadedFile};
pub use requests::{StartMatchRequest, SubmissionForm};
pub use responses::{ErrorResponse, HealthResponse, JobStatus, MatchJob, MatchResultsResponse, MatchStatus, Session, UploadResponse, UploadStatus};
