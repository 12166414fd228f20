use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
///
/// Business logic never reads the environment directly; the plan builder and
/// worker receive the relevant values from this struct at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,

    /// Whether the external-LLM company-discovery plan step is enabled by
    /// default even without a pre-existing llm_json source.
    pub external_llm_enabled: bool,

    /// Per-request timeout for URL source fetches.
    pub fetch_timeout_secs: u64,

    /// Idle sleep between worker queue polls.
    pub worker_poll_secs: u64,

    /// Base delay for job retry backoff.
    pub job_base_backoff_secs: i64,

    /// Multiplier applied per failed attempt.
    pub job_backoff_multiplier: f64,

    /// A running job whose lock is older than this is treated as crashed and
    /// becomes claimable again.
    pub job_stale_lock_secs: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            external_llm_enabled: bool_env("EXTERNAL_LLM_ENABLED", false),
            fetch_timeout_secs: int_env("FETCH_TIMEOUT_SECS", 30),
            worker_poll_secs: int_env("WORKER_POLL_SECS", 2),
            job_base_backoff_secs: int_env("JOB_BASE_BACKOFF_SECS", 30),
            job_backoff_multiplier: float_env("JOB_BACKOFF_MULTIPLIER", 2.0),
            job_stale_lock_secs: int_env("JOB_STALE_LOCK_SECS", 600),
        }
    }

    /// Log the effective configuration without leaking credentials.
    pub fn log_redacted(&self) {
        info!(
            external_llm_enabled = self.external_llm_enabled,
            fetch_timeout_secs = self.fetch_timeout_secs,
            worker_poll_secs = self.worker_poll_secs,
            job_base_backoff_secs = self.job_base_backoff_secs,
            job_stale_lock_secs = self.job_stale_lock_secs,
            "Configuration loaded (database url redacted)"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn int_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn float_env(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
