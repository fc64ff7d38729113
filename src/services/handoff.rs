use crate::config::{HandoffBackend, HandoffSettings};
use crate::models::{MatchResultsResponse, SubmissionRecord};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Open the backend selected in configuration
pub async fn open_store(settings: &HandoffSettings) -> Result<Arc<dyn HandoffStore>, HandoffError> {
    let ttl = Duration::from_secs(settings.ttl_secs);

    let store: Arc<dyn HandoffStore> = match settings.backend {
        HandoffBackend::Memory => Arc::new(MemoryStore::new(Some(ttl))),
        HandoffBackend::File => Arc::new(FileStore::new(&settings.dir)),
        HandoffBackend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or(HandoffError::MissingRedisUrl)?;
            Arc::new(RedisStore::new(url, settings.ttl_secs).await?)
        }
    };

    tracing::debug!("Handoff store: {:?}", settings.backend);
    Ok(store)
}

/// Errors that can occur with handoff store operations
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("handoff.redis_url must be set for the redis backend")]
    MissingRedisUrl,
}

/// Raw key/value storage behind the handoff between views
///
/// Values are JSON documents. A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, HandoffError>;

    async fn set(&self, key: &str, value: String) -> Result<(), HandoffError>;

    async fn remove(&self, key: &str) -> Result<(), HandoffError>;
}

/// Handoff key builder
pub struct HandoffKey;

impl HandoffKey {
    /// Submission identifiers, written by the submission view
    pub const MATCH_DATA: &'static str = "matchData";

    /// Terminal result set, written when a match completes
    pub const MATCH_RESULTS: &'static str = "matchResults";

    /// Build a key namespaced by scope
    pub fn scoped(scope: &str, key: &str) -> String {
        format!("profmatch:{}:{}", scope, key)
    }
}

/// Typed view over a store for one scope
///
/// Reads are lenient: a missing, unparsable or unreachable entry reads as
/// `None` so views can redirect instead of failing.
#[derive(Clone)]
pub struct Handoff {
    store: Arc<dyn HandoffStore>,
    scope: String,
}

impl Handoff {
    pub fn new(store: Arc<dyn HandoffStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub async fn write_submission(&self, record: &SubmissionRecord) -> Result<(), HandoffError> {
        self.write(HandoffKey::MATCH_DATA, record).await
    }

    pub async fn read_submission(&self) -> Option<SubmissionRecord> {
        self.read(HandoffKey::MATCH_DATA).await
    }

    pub async fn write_results(&self, results: &MatchResultsResponse) -> Result<(), HandoffError> {
        self.write(HandoffKey::MATCH_RESULTS, results).await
    }

    pub async fn read_results(&self) -> Option<MatchResultsResponse> {
        self.read(HandoffKey::MATCH_RESULTS).await
    }

    /// Drop both entries for this scope
    pub async fn clear(&self) -> Result<(), HandoffError> {
        for key in [HandoffKey::MATCH_DATA, HandoffKey::MATCH_RESULTS] {
            self.store.remove(&HandoffKey::scoped(&self.scope, key)).await?;
        }
        tracing::debug!("Cleared handoff scope {}", self.scope);
        Ok(())
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), HandoffError> {
        let json = serde_json::to_string(value)?;
        self.store.set(&HandoffKey::scoped(&self.scope, key), json).await?;
        tracing::debug!("Handoff write: {}/{}", self.scope, key);
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(&HandoffKey::scoped(&self.scope, key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("Handoff miss: {}/{}", self.scope, key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Handoff read failed for {}/{}: {}", self.scope, key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Handoff entry {}/{} is unreadable: {}", self.scope, key, e);
                None
            }
        }
    }
}

/// In-memory store, lives as long as the process
pub struct MemoryStore {
    entries: moka::future::Cache<String, String>,
}

impl MemoryStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        let mut builder = moka::future::CacheBuilder::new(64);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            entries: builder.build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl HandoffStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HandoffError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), HandoffError> {
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HandoffError> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}

/// File-backed store, one JSON document per key under a state directory
///
/// Survives across process invocations, which is what lets `submit`,
/// `process` and `results` run as separate commands.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encoded so distinct keys never share a file
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl HandoffStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HandoffError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), HandoffError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        // Readers only ever see a complete document
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HandoffError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Redis-backed store for handoff shared across machines
pub struct RedisStore {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    ttl_secs: u64,
}

impl RedisStore {
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, HandoffError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            ttl_secs,
        })
    }
}

#[async_trait]
impl HandoffStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HandoffError> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), HandoffError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(self.ttl_secs)
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HandoffError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}
