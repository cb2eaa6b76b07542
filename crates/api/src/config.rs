//! # API Configuration Module
//!
//! This module handles loading configuration for the open-house API server
//! from environment variables, with defaults where appropriate.
//!
//! ## Environment Variables
//!
//! - `API_HOST`: The host address to bind the server to (default: "0.0.0.0")
//! - `API_PORT`: The port to listen on (default: 3000)
//! - `STORE_BACKEND`: `postgres` (default) or `memory`
//! - `DATABASE_URL`: PostgreSQL connection string (required for `postgres`)
//! - `LOG_LEVEL`: Logging level (default: "info")
//! - `API_CORS_ORIGINS`: Comma-separated list of allowed CORS origins
//! - `API_REQUEST_TIMEOUT_SECONDS`: Request timeout (default: 30)
//! - `APPOINTMENT_DATES`: Comma-separated `YYYY-MM-DD` dates open for booking
//! - `APPOINTMENT_DAY_START` / `APPOINTMENT_DAY_END`: Daily window (default: 10:00 / 16:00)
//! - `APPOINTMENT_SLOT_MINUTES`: Slot step in minutes (default: 5)
//! - `APPOINTMENT_BREAK`: Break window as `HH:MM-HH:MM`, or `none` (default: 12:00-12:20)
//! - `STORE_RETRY_ATTEMPTS`: Attempts per store call on transient errors (default: 3)
//! - `STORE_RETRY_BASE_DELAY_MS`: First retry delay, doubled per attempt (default: 50)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use eyre::{Result, WrapErr, eyre};
use openhouse_core::allocator::RetryPolicy;
use openhouse_core::models::slot::TimeOfDay;
use openhouse_core::policy::{BreakWindow, SlotPolicy};
use tracing::Level;

/// Where applications are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local; everything is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(eyre!("Unknown STORE_BACKEND '{}'", other)),
        }
    }
}

/// Configuration for the open-house API server
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host address for the API server (e.g., "127.0.0.1", "0.0.0.0")
    pub host: String,

    /// Port for the API server to listen on
    pub port: u16,

    pub store_backend: StoreBackend,

    /// PostgreSQL database connection string
    pub database_url: Option<String>,

    /// Log level for the application
    pub log_level: Level,

    /// CORS allowed origins (optional)
    pub cors_origins: Option<Vec<String>>,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Dates, daily window and slot step offered for booking
    pub slot_policy: SlotPolicy,

    /// Backoff applied to transient store failures
    pub retry: RetryPolicy,
}

impl ApiConfig {
    /// Creates a new ApiConfig from environment variables
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - `STORE_BACKEND` is `postgres` and `DATABASE_URL` is not set
    /// - `API_PORT` cannot be parsed as a u16
    /// - any appointment setting is malformed or describes an empty window
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // Network settings
        let host = var("API_HOST", "0.0.0.0");
        let port = var("API_PORT", "3000")
            .parse()
            .wrap_err("Invalid API_PORT value")?;

        // Storage settings
        let store_backend: StoreBackend = var("STORE_BACKEND", "postgres").parse()?;
        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(eyre!("DATABASE_URL environment variable must be set"));
        }

        // Logging settings
        let log_level = match var("LOG_LEVEL", "info").as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        // CORS settings
        let cors_origins = lookup("API_CORS_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Performance settings
        let request_timeout = var("API_REQUEST_TIMEOUT_SECONDS", "30")
            .parse()
            .unwrap_or(30);

        let slot_policy = slot_policy_from(&lookup)?;

        let attempts = var("STORE_RETRY_ATTEMPTS", "3")
            .parse()
            .wrap_err("Invalid STORE_RETRY_ATTEMPTS value")?;
        let base_delay = var("STORE_RETRY_BASE_DELAY_MS", "50")
            .parse()
            .map(Duration::from_millis)
            .wrap_err("Invalid STORE_RETRY_BASE_DELAY_MS value")?;

        Ok(Self {
            host,
            port,
            store_backend,
            database_url,
            log_level,
            cors_origins,
            request_timeout,
            slot_policy,
            retry: RetryPolicy::new(attempts, base_delay),
        })
    }

    /// Returns the server address as a string (e.g., "127.0.0.1:8080")
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn slot_policy_from(lookup: &impl Fn(&str) -> Option<String>) -> Result<SlotPolicy> {
    let defaults = SlotPolicy::open_house();

    let dates = match lookup("APPOINTMENT_DATES") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<NaiveDate>())
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("Invalid APPOINTMENT_DATES value")?,
        None => defaults.allowed_dates().collect(),
    };

    let day_start = match lookup("APPOINTMENT_DAY_START") {
        Some(raw) => raw
            .parse::<TimeOfDay>()
            .wrap_err("Invalid APPOINTMENT_DAY_START value")?,
        None => defaults.day_start(),
    };

    let day_end = match lookup("APPOINTMENT_DAY_END") {
        Some(raw) => raw
            .parse::<TimeOfDay>()
            .wrap_err("Invalid APPOINTMENT_DAY_END value")?,
        None => defaults.day_end(),
    };

    let granularity = match lookup("APPOINTMENT_SLOT_MINUTES") {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .wrap_err("Invalid APPOINTMENT_SLOT_MINUTES value")?,
        None => defaults.granularity_minutes(),
    };

    let break_window = match lookup("APPOINTMENT_BREAK") {
        Some(raw) => parse_break(&raw).wrap_err("Invalid APPOINTMENT_BREAK value")?,
        None => defaults.break_window(),
    };

    SlotPolicy::new(dates, day_start, day_end, granularity, break_window)
        .wrap_err("Invalid appointment window")
}

fn parse_break(raw: &str) -> Result<Option<BreakWindow>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| eyre!("expected HH:MM-HH:MM, got '{}'", raw))?;

    let window = BreakWindow::new(start.parse()?, end.parse()?)?;
    Ok(Some(window))
}
