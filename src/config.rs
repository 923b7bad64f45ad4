use std::{net::SocketAddr, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("CACHE_TTL_SECS must be greater than zero")]
    ZeroTtl,
    #[error("CACHE_OP_TIMEOUT_MS must be greater than zero")]
    ZeroTimeout,
}

// Which cache backend fronts the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Redis,
    Memory,
    None,
}

impl FromStr for CacheKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheKind::Redis),
            "memory" => Ok(CacheKind::Memory),
            "none" | "off" => Ok(CacheKind::None),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub redis: RedisConfig,
    pub ttl_secs: u64,
    pub op_timeout: Duration,
    // `None` keeps a disabled cache disabled until restart.
    pub recovery_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_file: String,
    pub bind_addr: SocketAddr,
    pub cache: CacheConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    // Separated from `from_env` so tests don't have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_file = lookup("DATABASE_FILE").unwrap_or_else(|| "messageboard.db".to_string());
        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let kind = match lookup("CACHE_BACKEND") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "CACHE_BACKEND",
                value,
            })?,
            None => CacheKind::Redis,
        };

        let redis = RedisConfig {
            host: lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "REDIS_PORT", 6379)?,
            db: parse_or(&lookup, "REDIS_DB", 0)?,
        };

        let ttl_secs: u64 = parse_or(&lookup, "CACHE_TTL_SECS", 60)?;
        if ttl_secs == 0 {
            return Err(ConfigError::ZeroTtl);
        }

        let op_timeout_ms: u64 = parse_or(&lookup, "CACHE_OP_TIMEOUT_MS", 500)?;
        if op_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let op_timeout = Duration::from_millis(op_timeout_ms);
        let recovery_secs: u64 = parse_or(&lookup, "CACHE_RECOVERY_INTERVAL_SECS", 0)?;

        Ok(Self {
            database_file,
            bind_addr,
            cache: CacheConfig {
                kind,
                redis,
                ttl_secs,
                op_timeout,
                recovery_interval: (recovery_secs > 0).then(|| Duration::from_secs(recovery_secs)),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
