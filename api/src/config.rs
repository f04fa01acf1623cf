use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default lower bound for requested year windows.
const DEFAULT_MIN_YEAR: i32 = 1800;
/// Default upper bound for requested year windows.
const DEFAULT_MAX_YEAR: i32 = 2025;
/// Default timeout for fetching a remote `.dly` file.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Root directory holding the GHCN-Daily files.
    pub data_dir: PathBuf,
    /// Station catalog (`ghcnd-stations.txt`).
    pub stations_file: PathBuf,
    /// Element inventory (`ghcnd-inventory.txt`).
    pub inventory_file: PathBuf,
    /// Directory of per-station `<ID>.dly` files.
    pub records_dir: PathBuf,
    /// Remote directory to fetch missing `.dly` files from, if any.
    pub records_base_url: Option<String>,
    pub records_fetch_timeout: Duration,
    /// How long a parsed station stays cached. `None` keeps it for the process lifetime.
    pub record_cache_ttl: Option<Duration>,
    pub min_year: i32,
    pub max_year: i32,
    /// `*` or a comma-separated list of allowed origins.
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env_or("DATA_DIR", "./data"));
        let stations_file = std::env::var("STATIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("ghcnd-stations.txt"));
        let inventory_file = std::env::var("INVENTORY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("ghcnd-inventory.txt"));
        let records_dir = std::env::var("RECORDS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("ghcnd_all"));

        Self {
            port: parse_env("PORT", 8080),
            data_dir,
            stations_file,
            inventory_file,
            records_dir,
            records_base_url: std::env::var("RECORDS_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            records_fetch_timeout: Duration::from_secs(parse_env(
                "RECORDS_FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            record_cache_ttl: parse_ttl(std::env::var("RECORD_CACHE_TTL_SECS").ok()),
            min_year: parse_env("MIN_YEAR", DEFAULT_MIN_YEAR),
            max_year: parse_env("MAX_YEAR", DEFAULT_MAX_YEAR),
            cors_origin: env_or("CORS_ORIGIN", "*"),
        }
    }

    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_year > self.max_year {
            return Err(ConfigError::InvertedYearBounds {
                min: self.min_year,
                max: self.max_year,
            });
        }
        Ok(())
    }

    /// Allowed CORS origins, or `None` when any origin is accepted.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let value = self.cors_origin.trim();
        if value.is_empty() || value == "*" {
            return None;
        }
        Some(
            value
                .split(',')
                .map(|entry| entry.trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect(),
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MIN_YEAR ({min}) is greater than MAX_YEAR ({max})")]
    InvertedYearBounds { min: i32, max: i32 },
}

/// Unset, empty or `0` disables expiry. Anything unparsable warns and disables it too.
fn parse_ttl(raw: Option<String>) -> Option<Duration> {
    let raw = raw?;
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<u64>() {
        Ok(0) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::warn!(
                "RECORD_CACHE_TTL_SECS has invalid value '{}', caching for the process lifetime",
                raw
            );
            None
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
