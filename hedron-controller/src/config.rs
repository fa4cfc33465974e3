//! Controller configuration
//!
//! Defines the tunables of the controller process: where it listens, which
//! store it uses, and the timings of the reconcile loop.

use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
///
/// All intervals are configurable so the loop can be tightened for local
/// development and relaxed for busy deployments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// PostgreSQL connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Number of concurrent reconcile workers
    pub workers: usize,

    /// How long a Project waits before its source is resolved again
    pub poll_interval: Duration,

    /// How often every object is re-enqueued regardless of events
    pub resync_interval: Duration,

    /// Upper bound on a single reconcile pass
    pub reconcile_timeout: Duration,

    /// First retry delay after a transient failure
    pub backoff_base: Duration,

    /// Retry delays never grow past this
    pub backoff_max: Duration,

    /// Parent directory for source-resolution workspaces (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - HEDRON_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL (default: unset, in-memory store)
    /// - HEDRON_WORKERS (default: 4)
    /// - HEDRON_POLL_INTERVAL (seconds, default: 60)
    /// - HEDRON_RESYNC_INTERVAL (seconds, default: 300)
    /// - HEDRON_RECONCILE_TIMEOUT (seconds, default: 120)
    /// - HEDRON_BACKOFF_BASE_MS (default: 500)
    /// - HEDRON_BACKOFF_MAX_MS (default: 300000)
    /// - HEDRON_SCRATCH_DIR (default: system temp dir)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| anyhow::anyhow!("{} must be a number of seconds, got {:?}", key, raw)),
                None => Ok(default),
            }
        };

        let millis = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| {
                        anyhow::anyhow!("{} must be a number of milliseconds, got {:?}", key, raw)
                    }),
                None => Ok(default),
            }
        };

        let workers = match lookup("HEDRON_WORKERS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("HEDRON_WORKERS must be a number, got {:?}", raw))?,
            None => defaults.workers,
        };

        let config = Self {
            bind_addr: lookup("HEDRON_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            workers,
            poll_interval: secs("HEDRON_POLL_INTERVAL", defaults.poll_interval)?,
            resync_interval: secs("HEDRON_RESYNC_INTERVAL", defaults.resync_interval)?,
            reconcile_timeout: secs("HEDRON_RECONCILE_TIMEOUT", defaults.reconcile_timeout)?,
            backoff_base: millis("HEDRON_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: millis("HEDRON_BACKOFF_MAX_MS", defaults.backoff_max)?,
            scratch_dir: lookup("HEDRON_SCRATCH_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.resync_interval.is_zero() {
            anyhow::bail!("resync_interval must be greater than 0");
        }

        if self.reconcile_timeout.is_zero() {
            anyhow::bail!("reconcile_timeout must be greater than 0");
        }

        if self.backoff_base.is_zero() {
            anyhow::bail!("backoff_base must be greater than 0");
        }

        if self.backoff_max < self.backoff_base {
            anyhow::bail!("backoff_max must not be smaller than backoff_base");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            workers: 4,
            poll_interval: Duration::from_secs(60),
            resync_interval: Duration::from_secs(300),
            reconcile_timeout: Duration::from_secs(120),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(300),
            scratch_dir: None,
        }
    }
}
