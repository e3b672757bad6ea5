//! Service configuration read from the environment (after `.env` is loaded).

use rust_decimal::Decimal;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use crate::services::EngineSettings;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_CURRENCY: &str = "KES";
const DEFAULT_TAX_RATE_PERCENT: &str = "16";
const DEFAULT_FALLBACK_SHIPPING: &str = "500";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REFERENCE_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?} ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Absent: run on the in-memory store.
    pub database_url: Option<String>,
    /// JSON reference data loaded into the in-memory store; ignored with a database.
    pub seed_file: Option<PathBuf>,
    pub port: u16,
    pub nats_url: Option<String>,
    pub currency: String,
    pub tax_rate_percent: Decimal,
    pub fallback_shipping: Decimal,
    /// Absent: verify-now calls fail as gateway-unavailable.
    pub gateway_url: Option<String>,
    pub gateway_timeout: Duration,
    pub reference_cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let currency = get("CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()).to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("CURRENCY", &currency, "expected a 3-letter ISO code"));
        }

        let tax_rate_percent: Decimal = parse(&get, "TAX_RATE_PERCENT", DEFAULT_TAX_RATE_PERCENT)?;
        if tax_rate_percent < Decimal::ZERO || tax_rate_percent > Decimal::ONE_HUNDRED {
            return Err(invalid("TAX_RATE_PERCENT", &tax_rate_percent.to_string(), "must be between 0 and 100"));
        }
        let fallback_shipping: Decimal = parse(&get, "FALLBACK_SHIPPING", DEFAULT_FALLBACK_SHIPPING)?;
        if fallback_shipping < Decimal::ZERO {
            return Err(invalid("FALLBACK_SHIPPING", &fallback_shipping.to_string(), "must not be negative"));
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            seed_file: get("SEED_FILE").map(PathBuf::from),
            port: parse(&get, "PORT", &DEFAULT_PORT.to_string())?,
            nats_url: get("NATS_URL"),
            currency,
            tax_rate_percent,
            fallback_shipping,
            gateway_url: get("GATEWAY_URL"),
            gateway_timeout: secs(&get, "GATEWAY_TIMEOUT_SECS", DEFAULT_GATEWAY_TIMEOUT_SECS)?,
            reference_cache_ttl: secs(&get, "REFERENCE_CACHE_TTL_SECS", DEFAULT_REFERENCE_CACHE_TTL_SECS)?,
            request_timeout: secs(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            currency: self.currency.clone(),
            tax_rate_percent: self.tax_rate_percent,
            fallback_shipping: self.fallback_shipping,
            gateway_timeout: self.gateway_timeout,
            reference_cache_ttl: self.reference_cache_ttl,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, value: value.to_string(), reason: reason.into() }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = get(key).unwrap_or_else(|| default.to_string());
    raw.parse().map_err(|e: T::Err| invalid(key, &raw, e.to_string()))
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let value: u64 = parse(get, key, &default.to_string())?;
    if value == 0 {
        return Err(invalid(key, "0", "must be at least one second"));
    }
    Ok(Duration::from_secs(value))
}
