use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub mode: ModeSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub handoff: HandoffSettings,
    #[serde(default)]
    pub offline: OfflineSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_timeout_secs() -> u64 { 30 }

/// Selects the simulated status source instead of the real backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeSettings {
    #[serde(default)]
    pub use_mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_mock_tick_ms")]
    pub mock_tick_ms: u64,
    #[serde(default = "default_mock_completion_delay_ms")]
    pub mock_completion_delay_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            mock_tick_ms: default_mock_tick_ms(),
            mock_completion_delay_ms: default_mock_completion_delay_ms(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn mock_tick(&self) -> Duration {
        Duration::from_millis(self.mock_tick_ms)
    }

    pub fn mock_completion_delay(&self) -> Duration {
        Duration::from_millis(self.mock_completion_delay_ms)
    }
}

fn default_interval_ms() -> u64 { 2000 }
fn default_mock_tick_ms() -> u64 { 800 }
fn default_mock_completion_delay_ms() -> u64 { 500 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_max_file_size_mb() -> u64 { 10 }

/// Where views hand state to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffBackend {
    Memory,
    #[default]
    File,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffSettings {
    #[serde(default)]
    pub backend: HandoffBackend,
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(default = "default_handoff_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            backend: HandoffBackend::default(),
            dir: default_state_dir(),
            scope: default_scope(),
            redis_url: None,
            ttl_secs: default_handoff_ttl_secs(),
        }
    }
}

fn default_state_dir() -> PathBuf { PathBuf::from(".profmatch") }
fn default_scope() -> String { "default".to_string() }
fn default_handoff_ttl_secs() -> u64 { 86_400 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSettings {
    #[serde(default = "default_offline_host")]
    pub host: String,
    #[serde(default = "default_offline_port")]
    pub port: u16,
    #[serde(default = "default_offline_cache_size")]
    pub cache_size: u64,
    #[serde(default = "default_offline_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            host: default_offline_host(),
            port: default_offline_port(),
            cache_size: default_offline_cache_size(),
            cache_ttl_secs: default_offline_cache_ttl_secs(),
            workers: None,
        }
    }
}

fn default_offline_host() -> String { "127.0.0.1".to_string() }
fn default_offline_port() -> u16 { 3000 }
fn default_offline_cache_size() -> u64 { 500 }
fn default_offline_cache_ttl_secs() -> u64 { 3600 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with PROFMATCH__)
    /// 5. PROFMATCH_API_URL and PROFMATCH_USE_MOCK
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., PROFMATCH__POLLING__INTERVAL_MS -> polling.interval_ms
            .add_source(
                Environment::with_prefix("PROFMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_env_overrides(settings)?.try_deserialize::<Self>()?.checked()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("PROFMATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        apply_env_overrides(settings)?.try_deserialize::<Self>()?.checked()
    }

    /// Reject values that would make polling impossible
    fn checked(self) -> Result<Self, ConfigError> {
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Message("polling.interval_ms must be greater than 0".to_string()));
        }
        if self.polling.mock_tick_ms == 0 {
            return Err(ConfigError::Message("polling.mock_tick_ms must be greater than 0".to_string()));
        }
        Ok(self)
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Short-form environment overrides for the two settings changed most often
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(url) = env::var("PROFMATCH_API_URL") {
        builder = builder.set_override("api.base_url", url)?;
    }
    if let Ok(flag) = env::var("PROFMATCH_USE_MOCK") {
        builder = builder.set_override("mode.use_mock", flag.eq_ignore_ascii_case("true"))?;
    }

    builder.build()
}
