use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A published paper attached to a professor profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: u16,
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,
    #[serde(default)]
    pub citation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Citation metrics for a professor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationMetrics {
    pub h_index: u32,
    pub total_citations: u64,
}

/// Professor profile with research and publication data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfessorProfile {
    pub id: String,
    pub name: String,
    pub title: String,
    pub department: String,
    pub university: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scholar_id: Option<String>,
    #[serde(default)]
    pub research_areas: Vec<String>,
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_metrics: Option<CitationMetrics>,
    #[serde(default)]
    pub last_updated: String,
}

impl ProfessorProfile {
    /// Helper to get the h-index, if metrics are known
    pub fn h_index(&self) -> Option<u32> {
        self.citation_metrics.map(|m| m.h_index)
    }

    /// Helper to get total citations, if metrics are known
    pub fn total_citations(&self) -> Option<u64> {
        self.citation_metrics.map(|m| m.total_citations)
    }
}

/// A single ranked professor recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub professor: ProfessorProfile,
    pub match_score: f64,
    #[serde(default)]
    pub alignment_reasons: Vec<String>,
    #[serde(default)]
    pub relevant_publications: Vec<Publication>,
    #[serde(default)]
    pub shared_keywords: Vec<String>,
    pub recommendation_text: String,
}

/// A résumé held in memory before upload
///
/// `id` is a client-side key only. The server assigns its own `file_id`
/// on upload and that is the one sent with the match request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Wrap in-memory content, assigning a fresh client-side id
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a résumé from disk, inferring the content type from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume".to_string());

        Ok(Self::new(filename, content_type_for(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Map a file extension to the MIME type the upload form accepts
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Identifiers written by the submission view and read by the processing view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub session_id: String,
    pub match_id: String,
    pub university: String,
    pub research_interests: Vec<String>,
}

