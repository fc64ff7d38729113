use crate::core::format::{validate_file_size, validate_file_type};
use crate::core::mock::{MOCK_MATCH_ID, MOCK_SESSION_ID};
use crate::core::MatchCoordinator;
use crate::models::{SubmissionForm, SubmissionRecord, UploadedFile};
use crate::services::{ApiError, HandoffError, ProgressCallback};
use crate::views::AppState;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

/// Observes per-file upload progress as `(filename, percent)`
pub type UploadObserver = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Per-field validation messages, keyed by form field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keep the first message reported for a field
    fn insert(&mut self, field: &str, message: String) {
        self.0.entry(field.to_string()).or_insert(message);
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        f.write_str(&joined.join("; "))
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::default();
        for (field, errs) in errors.field_errors() {
            if let Some(err) = errs.first() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                fields.insert(&field, message);
            }
        }
        fields
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid submission: {0}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to save submission: {0}")]
    Handoff(#[from] HandoffError),
}

/// What the user filled in on the submission form
#[derive(Debug, Clone)]
pub struct Submission {
    pub university: String,
    pub research_interests: String,
    pub files: Vec<UploadedFile>,
}

impl Submission {
    /// Check the form and return the parsed interest list
    pub fn validate(&self, max_file_size_mb: u64) -> Result<Vec<String>, FieldErrors> {
        let form = SubmissionForm {
            university: self.university.clone(),
            research_interests: self.research_interests.clone(),
            files: self.files.iter().map(|f| f.filename.clone()).collect(),
        };

        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::default(),
            Err(e) => FieldErrors::from(e),
        };

        for file in &self.files {
            if !validate_file_type(&file.content_type) {
                errors.insert("files", format!("{}: Please upload a PDF, DOCX, or TXT file", file.filename));
            } else if !validate_file_size(file.size(), max_file_size_mb) {
                errors.insert(
                    "files",
                    format!("{}: File size must be less than {}MB", file.filename, max_file_size_mb),
                );
            }
        }

        if errors.is_empty() {
            Ok(form.interests())
        } else {
            Err(errors)
        }
    }
}

/// Validate, upload and start a match, then hand the identifiers to the processing view
///
/// Nothing is sent when validation fails. Files upload one at a time; the
/// first failure aborts the submission. In mock mode no request is made and
/// fixed identifiers are recorded instead.
pub async fn submit(
    state: &AppState,
    submission: &Submission,
    on_upload: Option<UploadObserver>,
) -> Result<SubmissionRecord, SubmissionError> {
    let research_interests = submission
        .validate(state.settings.upload.max_file_size_mb)
        .map_err(SubmissionError::Invalid)?;

    let record = if state.use_mock() {
        tracing::info!("Mock mode: skipping upload of {} file(s)", submission.files.len());
        SubmissionRecord {
            session_id: MOCK_SESSION_ID.to_string(),
            match_id: MOCK_MATCH_ID.to_string(),
            university: submission.university.clone(),
            research_interests,
        }
    } else {
        let session = state.api.create_session().await?;
        tracing::info!("Created session {}", session.session_id);

        let mut file_ids = Vec::with_capacity(submission.files.len());
        for file in &submission.files {
            let callback = on_upload.as_ref().map(|observer| {
                let observer = Arc::clone(observer);
                let name = file.filename.clone();
                Arc::new(move |pct: u8| observer(&name, pct)) as ProgressCallback
            });

            let uploaded = state.api.upload_file(&session.session_id, file, callback).await?;
            tracing::info!("Uploaded {} as {}", file.filename, uploaded.file_id);
            file_ids.push(uploaded.file_id);
        }

        let mut coordinator = MatchCoordinator::new(Arc::clone(&state.api));
        let match_id = coordinator
            .start(&session.session_id, &submission.university, &research_interests, &file_ids)
            .await?;

        SubmissionRecord {
            session_id: session.session_id,
            match_id,
            university: submission.university.clone(),
            research_interests,
        }
    };

    // A fresh submission invalidates any earlier result set
    state.handoff.clear().await?;
    state.handoff.write_submission(&record).await?;
    Ok(record)
}
