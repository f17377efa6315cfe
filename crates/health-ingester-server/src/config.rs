// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use health_ingester::{BackoffConfig, IngesterConfig};

use crate::error::ServerError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 50 * 1024 * 1024;
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Server configuration, read from `HAE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Socket the HTTP server listens on
    pub listen_addr: SocketAddr,
    /// Bearer token required on every request, if set
    pub auth_token: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Whether to register the local file destination
    pub enable_local_file: bool,
    /// Output directory of the local file destination
    pub local_file_metrics_path: Option<PathBuf>,
    /// Whether to register the stdout destination
    pub enable_stdout: bool,
    /// Largest accepted request body
    pub max_request_bytes: usize,
    /// How long shutdown may spend draining queues
    pub shutdown_timeout: Duration,
    /// Delay after the first failed write of an item
    pub retry_base_delay: Duration,
    /// Upper bound of the per-item retry delay
    pub retry_max_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            auth_token: None,
            log_level: "info".to_string(),
            enable_local_file: false,
            local_file_metrics_path: None,
            enable_stdout: false,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            shutdown_timeout: Duration::from_secs(30),
            retry_base_delay: backoff.base_delay,
            retry_max_delay: backoff.max_delay,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            listen_addr: parse_or(get("HAE_LISTEN_ADDR"), "HAE_LISTEN_ADDR", defaults.listen_addr)?,
            auth_token: get("HAE_AUTH_TOKEN"),
            log_level: get("HAE_LOG_LEVEL")
                .map(|level| level.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
            enable_local_file: parse_bool(get("HAE_ENABLE_LOCALFILE"), "HAE_ENABLE_LOCALFILE")?,
            local_file_metrics_path: get("HAE_LOCALFILE_METRICS_PATH").map(PathBuf::from),
            enable_stdout: parse_bool(get("HAE_ENABLE_STDOUT"), "HAE_ENABLE_STDOUT")?,
            max_request_bytes: parse_or(
                get("HAE_MAX_REQUEST_BYTES"),
                "HAE_MAX_REQUEST_BYTES",
                defaults.max_request_bytes,
            )?,
            shutdown_timeout: parse_or(get("HAE_SHUTDOWN_TIMEOUT_SECS"), "HAE_SHUTDOWN_TIMEOUT_SECS", 30)
                .map(Duration::from_secs)?,
            retry_base_delay: parse_or(get("HAE_RETRY_BASE_DELAY_MS"), "HAE_RETRY_BASE_DELAY_MS", 5)
                .map(Duration::from_millis)?,
            retry_max_delay: parse_or(get("HAE_RETRY_MAX_DELAY_SECS"), "HAE_RETRY_MAX_DELAY_SECS", 1000)
                .map(Duration::from_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ServerError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if !self.enable_local_file && !self.enable_stdout {
            return Err(ServerError::InvalidConfig(
                "at least one destination must be enabled (HAE_ENABLE_LOCALFILE, HAE_ENABLE_STDOUT)"
                    .to_string(),
            ));
        }

        if self.enable_local_file && self.local_file_metrics_path.is_none() {
            return Err(ServerError::InvalidConfig(
                "HAE_LOCALFILE_METRICS_PATH is required when the local file destination is enabled"
                    .to_string(),
            ));
        }

        if self.retry_base_delay.is_zero() {
            return Err(ServerError::InvalidConfig(
                "HAE_RETRY_BASE_DELAY_MS must be greater than 0".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(ServerError::InvalidConfig(format!(
                "retry base delay {:?} exceeds the maximum delay {:?}",
                self.retry_base_delay, self.retry_max_delay
            )));
        }

        Ok(())
    }

    pub fn ingester_config(&self) -> IngesterConfig {
        IngesterConfig {
            backoff: BackoffConfig {
                base_delay: self.retry_base_delay,
                max_delay: self.retry_max_delay,
                ..Default::default()
            },
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ServerError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ServerError::InvalidConfig(format!("{key} has an invalid value '{value}'"))),
    }
}

fn parse_bool(value: Option<String>, key: &str) -> Result<bool, ServerError> {
    match value.as_deref().map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ServerError::InvalidConfig(format!(
            "{key} must be true or false, got '{other}'"
        ))),
    }
}
