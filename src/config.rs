//! Runtime configuration.
//!
//! Read from an optional `KEY=VALUE` file plus the `MEDIA_ROOT` and
//! `REDIS_URL` environment overrides the deployment already uses. The two
//! timing invariants the engine depends on are checked here, at startup:
//! the lock TTL must outlive the job timeout (otherwise a second job could
//! start while the first is still legitimately running), and the job
//! timeout must strictly exceed the two tool invocations it encloses.

use crate::error::{CacheError, Result};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/avcache-env";
pub const DEFAULT_MEDIA_ROOT: &str = "/data";
pub const DEFAULT_REDIS_URL: &str = "redis://redis:6379/0";
pub const DEFAULT_QUEUE_KEY: &str = "yt:queue";
/// 65 minutes, equal to the job timeout per the lock invariant.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3_900;
/// 65 minutes, strictly more than two 30-minute tool invocations.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3_900;
/// 30 minutes per tool invocation.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 1_800;
pub const DEFAULT_LAST_JOB_TTL_SECS: u64 = 3_600;

/// Raw values found in the config file; everything optional.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub media_root: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub queue_key: Option<String>,
    pub lock_ttl_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub last_job_ttl_secs: Option<u64>,
}

/// Fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub media_root: PathBuf,
    pub redis_url: String,
    pub queue_key: String,
    pub lock_ttl: Duration,
    pub job_timeout: Duration,
    pub tool_timeout: Duration,
    pub last_job_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            last_job_ttl: Duration::from_secs(DEFAULT_LAST_JOB_TTL_SECS),
        }
    }
}

fn parse_secs(key: &str, value: &str, path: &Path) -> Result<u64> {
    value.parse().map_err(|_| {
        CacheError::InvalidConfig(format!(
            "{key} in {} is not a number of seconds: {value:?}",
            path.display()
        ))
    })
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            match key {
                "MEDIA_ROOT" => cfg.media_root = Some(PathBuf::from(value)),
                "REDIS_URL" => cfg.redis_url = Some(value.to_string()),
                "QUEUE_KEY" => cfg.queue_key = Some(value.to_string()),
                "LOCK_TTL_SECS" => cfg.lock_ttl_secs = Some(parse_secs(key, value, path)?),
                "JOB_TIMEOUT_SECS" => cfg.job_timeout_secs = Some(parse_secs(key, value, path)?),
                "TOOL_TIMEOUT_SECS" => cfg.tool_timeout_secs = Some(parse_secs(key, value, path)?),
                "LAST_JOB_TTL_SECS" => cfg.last_job_ttl_secs = Some(parse_secs(key, value, path)?),
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let file = read_env_config(path.as_ref())?;
        Self::from_sources(file, env::var("MEDIA_ROOT").ok(), env::var("REDIS_URL").ok())
    }

    /// Resolution order for the two deployment-level settings: environment
    /// variable, then config file, then default. Everything else comes from
    /// the file or the default.
    fn from_sources(
        file: Option<EnvConfig>,
        media_root_env: Option<String>,
        redis_url_env: Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let config = Self {
            media_root: media_root_env
                .map(PathBuf::from)
                .or(file.media_root)
                .unwrap_or(defaults.media_root),
            redis_url: redis_url_env.or(file.redis_url).unwrap_or(defaults.redis_url),
            queue_key: file.queue_key.unwrap_or(defaults.queue_key),
            lock_ttl: file
                .lock_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            job_timeout: file
                .job_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            tool_timeout: file
                .tool_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.tool_timeout),
            last_job_ttl: file
                .last_job_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.last_job_ttl),
        };
        config.validate()?;
        Ok(config)
    }

    /// The timing invariants the engine relies on, enforced at load time.
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl < self.job_timeout {
            return Err(CacheError::InvalidConfig(format!(
                "LOCK_TTL_SECS ({}) must be at least JOB_TIMEOUT_SECS ({}), \
                 or a second job could start while the first is still running",
                self.lock_ttl.as_secs(),
                self.job_timeout.as_secs()
            )));
        }
        if self.job_timeout <= self.tool_timeout * 2 {
            return Err(CacheError::InvalidConfig(format!(
                "JOB_TIMEOUT_SECS ({}) must exceed two tool invocations of \
                 TOOL_TIMEOUT_SECS ({}) each",
                self.job_timeout.as_secs(),
                self.tool_timeout.as_secs()
            )));
        }
        Ok(())
    }
}
