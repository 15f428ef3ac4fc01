use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::LiveSyncError;

/// Longest channel name handed to the pub/sub transport before hashing.
pub const DEFAULT_MAX_CHANNEL_NAME_LENGTH: usize = 1024;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string for the lock backend. `None` keeps locking in-process.
    pub database_url: Option<String>,
    pub lock: LockConfig,
    pub pubsub: PubSubConfig,
}

/// Timing knobs for the distributed mutation lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// How long a lease lives without renewal.
    pub ttl: Duration,
    /// How often a held lease is renewed. Must be comfortably below `ttl`.
    pub renew_interval: Duration,
    /// Acquisition attempts after the first one before giving up.
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        let ttl = Duration::from_millis(30_000);
        Self {
            ttl,
            renew_interval: ttl / 3,
            retry_count: 50,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    pub max_channel_name_length: usize,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            max_channel_name_length: DEFAULT_MAX_CHANNEL_NAME_LENGTH,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, LiveSyncError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LiveSyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LockConfig::default();

        let ttl = parse_millis(&lookup, "LOCK_TTL_MS")?.unwrap_or(defaults.ttl);
        let renew_interval = parse_millis(&lookup, "LOCK_RENEW_INTERVAL_MS")?.unwrap_or(ttl / 3);
        if renew_interval.is_zero() {
            return Err(LiveSyncError::Config(
                "LOCK_RENEW_INTERVAL_MS must be positive".to_string(),
            ));
        }
        if renew_interval >= ttl {
            return Err(LiveSyncError::Config(format!(
                "LOCK_RENEW_INTERVAL_MS ({}ms) must be below LOCK_TTL_MS ({}ms)",
                renew_interval.as_millis(),
                ttl.as_millis()
            )));
        }

        let lock = LockConfig {
            ttl,
            renew_interval,
            retry_count: parse(&lookup, "LOCK_RETRY_COUNT")?.unwrap_or(defaults.retry_count),
            retry_delay: parse_millis(&lookup, "LOCK_RETRY_DELAY_MS")?
                .unwrap_or(defaults.retry_delay),
        };

        let pubsub = PubSubConfig {
            max_channel_name_length: parse(&lookup, "PUBSUB_MAX_CHANNEL_NAME_LENGTH")?
                .unwrap_or(DEFAULT_MAX_CHANNEL_NAME_LENGTH),
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        debug!(
            has_database = database_url.is_some(),
            ttl_ms = lock.ttl.as_millis() as u64,
            "Loaded configuration"
        );

        Ok(Self {
            database_url,
            lock,
            pubsub,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>, LiveSyncError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LiveSyncError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>, LiveSyncError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<F, u64>(lookup, key)?.map(Duration::from_millis))
}
