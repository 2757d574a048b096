//! Engine configuration types.
//!
//! `EngineConfig` is the single configuration object the core reads:
//! database connection, vector-store location, LLM gateway settings, and the
//! scheduler's operational profile. Loaded from `config.toml` by
//! mnemon-infra with graceful fallback to defaults.

use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::time::Duration;

/// Embedding dimension the store and gateway must agree on.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Top-level configuration for the memory engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite connection URL for stories, messages, and the memory outbox.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory holding the LanceDB vector tables.
    #[serde(default = "default_vector_dir")]
    pub vector_dir: PathBuf,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub scheduler: SchedulerProfile,
}

fn default_database_url() -> String {
    "sqlite://mnemon.db?mode=rwc".to_string()
}

fn default_vector_dir() -> PathBuf {
    PathBuf::from("mnemon-vectors")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            vector_dir: default_vector_dir(),
            llm: LlmConfig::default(),
            scheduler: SchedulerProfile::default(),
        }
    }
}

/// LLM gateway settings.
///
/// The API key is read from the environment variable named by
/// `api_key_env`, never from the config file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Must match the vector store's column width.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            completion_model: default_completion_model(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

/// Operational profile for the extraction scheduler.
///
/// Durations are stored as milliseconds so the profile round-trips through
/// TOML without custom (de)serializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerProfile {
    /// Debounce window: successive schedules within this window coalesce.
    pub debounce_ms: u64,
    /// Ceiling on how long a job may stay pending before forced execution.
    pub max_wait_ms: u64,
    /// Worker pool size.
    pub workers: usize,
    /// Extraction attempts per job before it is recorded as failed.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_ms: u64,
    /// Token bucket capacity for global extraction starts.
    pub rate_limit_max: u32,
    /// Token bucket refill window.
    pub rate_limit_window_ms: u64,
    /// How long failed jobs stay observable before being pruned.
    pub failed_ttl_ms: u64,
}

impl SchedulerProfile {
    /// Production profile: 30 s debounce, 5 min max wait, 10 extractions/s.
    pub fn production() -> Self {
        Self {
            debounce_ms: 30_000,
            max_wait_ms: 300_000,
            workers: 5,
            max_attempts: 3,
            retry_base_ms: 2_000,
            rate_limit_max: 10,
            rate_limit_window_ms: 1_000,
            failed_ttl_ms: 3_600_000,
        }
    }

    /// Fast profile for tests: 100 ms debounce, 500 ms max wait.
    pub fn test_profile() -> Self {
        Self {
            debounce_ms: 100,
            max_wait_ms: 500,
            workers: 2,
            max_attempts: 3,
            retry_base_ms: 20,
            rate_limit_max: 100,
            rate_limit_window_ms: 1_000,
            failed_ttl_ms: 5_000,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn failed_ttl(&self) -> Duration {
        Duration::from_millis(self.failed_ttl_ms)
    }
}

impl Default for SchedulerProfile {
    fn default() -> Self {
        Self::production()
    }
}
