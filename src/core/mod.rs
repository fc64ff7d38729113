// Core lifecycle exports
pub mod coordinator;
pub mod export;
pub mod format;
pub mod mock;
pub mod source;

pub use coordinator::{CoordinatorError, MatchCoordinator, MatchSnapshot, Phase, PollHandle, PollOutcome};
pub use export::{export_to_csv, export_to_json, ExportFormat};
pub use format::{format_citation_count, format_file_size, format_match_score, truncate_text};
pub use mock::{step_index, MockProgressSource, PROCESSING_STEPS};
pub use source::{RemoteStatusSource, StatusSource, Tick};
