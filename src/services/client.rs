use crate::models::{
    HealthResponse, MatchJob, MatchResultsResponse, MatchStatus, ProfessorProfile, Session,
    StartMatchRequest, UploadResponse, UploadedFile,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use reqwest::{multipart, Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Size of the slices an upload body is streamed in; progress is reported per slice
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Errors surfaced by the matching service client
///
/// Callers only ever see a status code and a message. Transport failures use
/// code 0; everything the server rejects keeps its HTTP status.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("{message}")]
    Transport { message: String },

    #[error("{message}")]
    Application { status: u16, message: String },

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),
}

/// Coarse error classification, for callers that only branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Application,
    Parse,
    Validation,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Application { .. } => ErrorKind::Application,
            ApiError::Parse(_) => ErrorKind::Parse,
            ApiError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// HTTP-like status code; 0 when no response was received
    pub fn code(&self) -> u16 {
        match self {
            ApiError::Application { status, .. } => *status,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    fn network(err: reqwest::Error) -> Self {
        ApiError::Transport {
            message: format!("Network error: {}", err),
        }
    }
}

/// Upload progress callback, invoked with a percentage in 0..=100
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// The matching service's capabilities, one operation per endpoint
#[async_trait]
pub trait MatchApi: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, ApiError>;

    async fn create_session(&self) -> Result<Session, ApiError>;

    async fn get_session(&self, session_id: &str) -> Result<Session, ApiError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError>;

    async fn upload_file(
        &self,
        session_id: &str,
        file: &UploadedFile,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse, ApiError>;

    async fn start_match(
        &self,
        session_id: &str,
        university: &str,
        research_interests: &[String],
        file_ids: &[String],
    ) -> Result<MatchJob, ApiError>;

    async fn get_match_status(&self, match_id: &str, session_id: &str) -> Result<MatchStatus, ApiError>;

    async fn get_match_results(
        &self,
        match_id: &str,
        session_id: &str,
    ) -> Result<MatchResultsResponse, ApiError>;

    async fn get_professor(&self, professor_id: &str) -> Result<ProfessorProfile, ApiError>;
}

/// HTTP client for the remote matching service
///
/// All endpoints are resolved relative to `base_url`.
#[derive(Clone)]
pub struct RemoteClient {
    base_url: String,
    client: Client,
}

impl RemoteClient {
    /// Create a new client with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::network)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    /// Send a request and turn any non-2xx response into an `ApiError`
    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await.map_err(ApiError::network)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Matching service returned {}: {}", status, body);
        Err(ApiError::Application {
            status: status.as_u16(),
            message: error_message(status, body),
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response.bytes().await.map_err(ApiError::network)?;

        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Parse(format!("Invalid response format: {}", e)))
    }
}

fn error_message(status: StatusCode, body: String) -> String {
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        body
    }
}

/// Tracks bytes handed to the transport and reports whole-percent increases only
struct UploadProgress {
    total: usize,
    sent: usize,
    last: u8,
    callback: ProgressCallback,
}

impl UploadProgress {
    fn advance(&mut self, bytes: usize) {
        self.sent += bytes;
        let pct = if self.total == 0 {
            100
        } else {
            ((self.sent as f64 / self.total as f64) * 100.0).round().min(100.0) as u8
        };

        if pct > self.last {
            self.last = pct;
            (self.callback)(pct);
        }
    }
}

fn upload_part(file: &UploadedFile, on_progress: Option<ProgressCallback>) -> Result<multipart::Part, ApiError> {
    let len = file.bytes.len();

    let part = match on_progress {
        Some(callback) => {
            let mut progress = UploadProgress {
                total: len,
                sent: 0,
                last: 0,
                callback,
            };
            let chunks: Vec<Bytes> = (0..len)
                .step_by(UPLOAD_CHUNK_SIZE)
                .map(|start| file.bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(len)))
                .collect();
            let body = stream::iter(chunks.into_iter().map(move |chunk| {
                progress.advance(chunk.len());
                Ok::<Bytes, std::io::Error>(chunk)
            }));
            multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), len as u64)
        }
        None => multipart::Part::stream_with_length(file.bytes.clone(), len as u64),
    };

    part.file_name(file.filename.clone())
        .mime_str(&file.content_type)
        .map_err(|e| ApiError::Validation(format!("Invalid content type {}: {}", file.content_type, e)))
}

#[async_trait]
impl MatchApi for RemoteClient {
    async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.fetch_json(self.request(Method::GET, "/health")).await
    }

    async fn create_session(&self) -> Result<Session, ApiError> {
        let session: Session = self.fetch_json(self.request(Method::POST, "/api/session")).await?;
        tracing::info!("Created session {}", session.session_id);
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, ApiError> {
        let endpoint = format!("/api/session/{}", urlencoding::encode(session_id));
        self.fetch_json(self.request(Method::GET, &endpoint)).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let endpoint = format!("/api/session/{}", urlencoding::encode(session_id));
        self.send(self.request(Method::DELETE, &endpoint)).await?;
        tracing::info!("Deleted session {}", session_id);
        Ok(())
    }

    async fn upload_file(
        &self,
        session_id: &str,
        file: &UploadedFile,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse, ApiError> {
        let form = multipart::Form::new()
            .part("file", upload_part(file, on_progress)?)
            .text("session_id", session_id.to_string());

        let response: UploadResponse = self
            .fetch_json(self.request(Method::POST, "/api/upload").multipart(form))
            .await?;

        tracing::info!(
            "Uploaded {} ({} bytes) as {}",
            file.filename,
            file.size(),
            response.file_id
        );
        Ok(response)
    }

    async fn start_match(
        &self,
        session_id: &str,
        university: &str,
        research_interests: &[String],
        file_ids: &[String],
    ) -> Result<MatchJob, ApiError> {
        let body = StartMatchRequest {
            session_id: session_id.to_string(),
            university: university.to_string(),
            research_interests: research_interests.to_vec(),
            file_ids: file_ids.to_vec(),
        };

        let job: MatchJob = self
            .fetch_json(self.request(Method::POST, "/api/match").json(&body))
            .await?;
        tracing::info!("Started match {} for session {}", job.match_id, session_id);
        Ok(job)
    }

    async fn get_match_status(&self, match_id: &str, session_id: &str) -> Result<MatchStatus, ApiError> {
        let endpoint = format!(
            "/api/match/{}/status?session_id={}",
            urlencoding::encode(match_id),
            urlencoding::encode(session_id)
        );
        self.fetch_json(self.request(Method::GET, &endpoint)).await
    }

    async fn get_match_results(
        &self,
        match_id: &str,
        session_id: &str,
    ) -> Result<MatchResultsResponse, ApiError> {
        let endpoint = format!(
            "/api/match/{}/results?session_id={}",
            urlencoding::encode(match_id),
            urlencoding::encode(session_id)
        );
        self.fetch_json(self.request(Method::GET, &endpoint)).await
    }

    async fn get_professor(&self, professor_id: &str) -> Result<ProfessorProfile, ApiError> {
        let endpoint = format!("/api/professor/{}", urlencoding::encode(professor_id));
        self.fetch_json(self.request(Method::GET, &endpoint)).await
    }
}
