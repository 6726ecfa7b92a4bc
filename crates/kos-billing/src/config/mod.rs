use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{FixedOffset, Offset, Utc};

use crate::billing::calendar::TierPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub billing: BillingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            billing: BillingConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for due-date evaluation and reminder delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    /// Whole-hour offset of the civil zone "today" is evaluated in.
    pub utc_offset_hours: i32,
    pub country_prefix: String,
    pub tier_policy: TierPolicy,
    pub broadcast_limit: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 7,
            country_prefix: "+62".to_string(),
            tier_policy: TierPolicy::ExactDay,
            broadcast_limit: 200,
        }
    }
}

impl BillingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let utc_offset_hours = match env::var("BILLING_UTC_OFFSET_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|hours| (-12..=14).contains(hours))
                .ok_or(ConfigError::InvalidUtcOffset(raw))?,
            Err(_) => defaults.utc_offset_hours,
        };

        let country_prefix = match env::var("BILLING_COUNTRY_PREFIX") {
            Ok(raw) => {
                let prefix = raw.trim();
                let digits = prefix.strip_prefix('+').unwrap_or_default();
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ConfigError::InvalidCountryPrefix(raw));
                }
                prefix.to_string()
            }
            Err(_) => defaults.country_prefix,
        };

        let tier_policy = match env::var("BILLING_TIER_POLICY") {
            Ok(raw) => TierPolicy::parse(&raw).ok_or(ConfigError::InvalidTierPolicy(raw))?,
            Err(_) => defaults.tier_policy,
        };

        let broadcast_limit = match env::var("BILLING_BROADCAST_LIMIT") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidBroadcastLimit(raw))?,
            Err(_) => defaults.broadcast_limit,
        };

        Ok(Self {
            utc_offset_hours,
            country_prefix,
            tier_policy,
            broadcast_limit,
        })
    }

    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUtcOffset(String),
    InvalidCountryPrefix(String),
    InvalidTierPolicy(String),
    InvalidBroadcastLimit(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUtcOffset(value) => write!(
                f,
                "BILLING_UTC_OFFSET_HOURS must be a whole number between -12 and 14, got '{value}'"
            ),
            ConfigError::InvalidCountryPrefix(value) => write!(
                f,
                "BILLING_COUNTRY_PREFIX must look like '+62', got '{value}'"
            ),
            ConfigError::InvalidTierPolicy(value) => write!(
                f,
                "BILLING_TIER_POLICY must be 'exact' or 'catch_up', got '{value}'"
            ),
            ConfigError::InvalidBroadcastLimit(value) => write!(
                f,
                "BILLING_BROADCAST_LIMIT must be a positive integer, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
