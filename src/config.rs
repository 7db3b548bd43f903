use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::application::sync_engine::RetryPolicy;
use crate::domain::order::StationIdentity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable '{0}'")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the station reads from its environment (or `.env`).
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub db_path: String,
    pub inventory_url: String,
    pub sync_url: String,
    pub identity: StationIdentity,
    pub host: String,
    pub port: u16,
    pub catalog_refresh: Duration,
    pub http_timeout: Duration,
    /// Zero turns the periodic retry sweep off.
    pub sync_retry: Duration,
    pub sync_retry_max: Duration,
    pub sync_max_in_flight: usize,
    pub shutdown_grace: Duration,
    pub receipt_spool_dir: PathBuf,
}

impl StationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let or_default = |name: &'static str, default: &str| {
            lookup(name).unwrap_or_else(|| default.to_string())
        };

        let secs =
            |name: &'static str, default: &str| seconds(name, &or_default(name, default));
        let positive_secs = |name: &'static str, default: &str| {
            let value = secs(name, default)?;
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(value)
        };

        Ok(Self {
            db_path: required("DB_PATH")?,
            inventory_url: required("INVENTORY_URL")?,
            sync_url: required("SYNC_URL")?,
            identity: StationIdentity {
                device_id: required("DEVICE_ID")?,
                conference_id: required("CONFERENCE_ID")?,
                passcode: required("PASSCODE")?,
                station: station_name(required("STATION")?)?,
            },
            host: or_default("HOST", "127.0.0.1"),
            port: parse("PORT", &or_default("PORT", "8080"))?,
            catalog_refresh: positive_secs("CATALOG_REFRESH_SECS", "60")?,
            http_timeout: positive_secs("HTTP_TIMEOUT_SECS", "10")?,
            sync_retry: secs("SYNC_RETRY_SECS", "30")?,
            sync_retry_max: secs("SYNC_RETRY_MAX_SECS", "600")?,
            sync_max_in_flight: parse(
                "SYNC_MAX_IN_FLIGHT",
                &or_default("SYNC_MAX_IN_FLIGHT", "4"),
            )?,
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS", "5")?,
            receipt_spool_dir: PathBuf::from(or_default("RECEIPT_SPOOL_DIR", "receipts")),
        })
    }

    pub fn identity(&self) -> StationIdentity {
        self.identity.clone()
    }

    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        if self.sync_retry.is_zero() {
            return None;
        }
        Some(RetryPolicy {
            base: self.sync_retry,
            max: self.sync_retry_max.max(self.sync_retry),
        })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn seconds(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(name, raw).map(Duration::from_secs)
}

/// The station id ends up in receipt file names, so it must stay a single
/// path component.
fn station_name(station: String) -> Result<String, ConfigError> {
    if station.contains(['/', '\\', '\0']) || station == "." || station == ".." {
        return Err(ConfigError::Invalid {
            name: "STATION",
            reason: format!("'{station}' is not usable in a file name"),
        });
    }
    Ok(station)
}
