//! # Configuration Module
//!
//! Settings of the status client: query parameters for Hytale servers, the result
//! cache, logging, and values carried for a serving layer (listen address, security,
//! monitoring).
//!
//! ## Features
//! - **Layered Loading**: YAML file, then `.env` and process environment variables, then defaults.
//! - **Serde Integration**: Serialization to and from YAML with `serde_yaml`.
//! - **Partial Configuration**: Missing fields fall back to defaults.
//! - **Durations**: `"10s"`, `"500ms"`, `"2m"`, `"1h"` or a bare number of seconds.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::exceptions::ConfigError;
use crate::protocol::consts::{DEFAULT_PORT, MAX_PACKET_SIZE};
use crate::query::MAX_ATTEMPT_BUDGET;

/// Upper bound for cache durations
pub const MAX_CACHE_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// --- Default Value Providers ---

fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_port() -> u16 {
    8080
}
fn d_hytale_port() -> u16 {
    DEFAULT_PORT
}
fn d_timeout() -> Duration {
    Duration::from_secs(10)
}
fn d_max_conn() -> usize {
    100
}
fn d_user_agent() -> String {
    "HytaleStatusDaemon/1.0".to_string()
}
fn d_max_packet() -> u32 {
    4 * 1024 * 1024
}
fn d_cache_ttl() -> Duration {
    Duration::from_secs(30)
}
fn d_cache_max() -> usize {
    1000
}
fn d_cleanup() -> Duration {
    Duration::from_secs(60)
}
fn d_log_level() -> String {
    "info".to_string()
}
fn d_log_format() -> String {
    "json".to_string()
}
fn d_log_output() -> String {
    "stderr".to_string()
}
fn d_rate_lim() -> u32 {
    100
}
fn d_cors() -> Vec<String> {
    vec!["*".to_string()]
}
fn d_true() -> bool {
    true
}
fn d_metrics_port() -> u16 {
    9090
}

/// Parses `"10s"`, `"250ms"`, `"2m"`, `"1h"` or a bare number of seconds
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, per_second) = if let Some(n) = value.strip_suffix("ms") {
        (n, 1000.0)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 1.0 / 60.0)
    } else if let Some(n) = value.strip_suffix('h') {
        (n, 1.0 / 3600.0)
    } else {
        (value, 1.0)
    };

    let number: f64 = number.trim().parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(number / per_second).ok()
}

fn format_duration(duration: &Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Serde adapter for duration fields
mod duration_serde {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| serde::de::Error::custom(format!("invalid duration: {secs}"))),
            Raw::Text(text) => parse_duration(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {text}"))),
        }
    }
}

/// Listen address of a serving layer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

/// Parameters of status queries against Hytale servers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HytaleConfig {
    /// Port used when an address has none.
    #[serde(default = "d_hytale_port")]
    pub default_port: u16,
    /// Bound of one whole query attempt, also the QUIC idle timeout.
    #[serde(default = "d_timeout", with = "duration_serde")]
    pub timeout: Duration,
    /// Maximum number of queries in flight.
    #[serde(default = "d_max_conn")]
    pub max_connections: usize,
    /// Username announced in the Connect packet.
    #[serde(default = "d_user_agent")]
    pub user_agent: String,
    /// Largest accepted response frame, capped by the protocol ceiling.
    #[serde(default = "d_max_packet")]
    pub max_packet_size: u32,
}

impl Default for HytaleConfig {
    fn default() -> Self {
        Self {
            default_port: d_hytale_port(),
            timeout: d_timeout(),
            max_connections: d_max_conn(),
            user_agent: d_user_agent(),
            max_packet_size: d_max_packet(),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "d_cache_ttl", with = "duration_serde")]
    pub ttl: Duration,
    #[serde(default = "d_cache_max")]
    pub max_entries: usize,
    #[serde(default = "d_cleanup", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: d_cache_ttl(),
            max_entries: d_cache_max(),
            cleanup_interval: d_cleanup(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive ("debug", "info", "hytale_status=trace").
    #[serde(default = "d_log_level")]
    pub level: String,
    /// "json" or "text".
    #[serde(default = "d_log_format")]
    pub format: String,
    /// "stdout", "stderr" or a file path.
    #[serde(default = "d_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_log_level(),
            format: d_log_format(),
            output: d_log_output(),
        }
    }
}

/// Security settings of a serving layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SecurityConfig {
    /// Requests per minute allowed from one client.
    #[serde(default = "d_rate_lim")]
    pub rate_limit: u32,
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "d_cors")]
    pub cors_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit: d_rate_lim(),
            trusted_proxies: Vec::new(),
            cors_origins: d_cors(),
        }
    }
}

/// Monitoring settings of a serving layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitoringConfig {
    #[serde(default = "d_true")]
    pub enable_metrics: bool,
    #[serde(default = "d_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "d_true")]
    pub health_check: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: d_metrics_port(),
            health_check: true,
        }
    }
}

/// The master configuration object.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hytale: HytaleConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
}

fn parse_env_duration(key: &str, value: String) -> Result<Duration, ConfigError> {
    parse_duration(&value).ok_or(ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

fn parse_env_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Loads the configuration from a YAML file and environment variables.
    ///
    /// `.env` is loaded first, then the YAML file is read if it exists, then
    /// process environment variables override file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment variable holds a value of the wrong type.
    pub fn from_file(config_path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    /// Parses YAML; an empty document yields the defaults
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let mut config: Config = serde_yaml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Applies overrides from `lookup`, keyed by environment variable name
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_env("PORT", v)?;
        }
        if let Some(v) = lookup("HYTALE_PORT") {
            self.hytale.default_port = parse_env("HYTALE_PORT", v)?;
        }
        if let Some(v) = lookup("TIMEOUT") {
            self.hytale.timeout = parse_env_duration("TIMEOUT", v)?;
        }
        if let Some(v) = lookup("MAX_CONNECTIONS") {
            self.hytale.max_connections = parse_env("MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("USER_AGENT") {
            self.hytale.user_agent = v;
        }
        if let Some(v) = lookup("MAX_PACKET_SIZE") {
            self.hytale.max_packet_size = parse_env("MAX_PACKET_SIZE", v)?;
        }
        if let Some(v) = lookup("CACHE_TTL") {
            self.cache.ttl = parse_env_duration("CACHE_TTL", v)?;
        }
        if let Some(v) = lookup("CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("CACHE_MAX_ENTRIES", v)?;
        }
        if let Some(v) = lookup("CACHE_CLEANUP_INTERVAL") {
            self.cache.cleanup_interval = parse_env_duration("CACHE_CLEANUP_INTERVAL", v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Some(v) = lookup("LOG_OUTPUT") {
            self.logging.output = v;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            self.security.rate_limit = parse_env("RATE_LIMIT", v)?;
        }
        if let Some(v) = lookup("TRUSTED_PROXIES") {
            self.security.trusted_proxies = parse_env_list(&v);
        }
        if let Some(v) = lookup("CORS_ORIGINS") {
            self.security.cors_origins = parse_env_list(&v);
        }
        if let Some(v) = lookup("ENABLE_METRICS") {
            self.monitoring.enable_metrics = parse_env("ENABLE_METRICS", v)?;
        }
        if let Some(v) = lookup("METRICS_PORT") {
            self.monitoring.metrics_port = parse_env("METRICS_PORT", v)?;
        }
        if let Some(v) = lookup("HEALTH_CHECK") {
            self.monitoring.health_check = parse_env("HEALTH_CHECK", v)?;
        }
        Ok(())
    }

    /// Replaces zero durations with defaults, clamps the timeout and the packet bound
    fn normalize(&mut self) {
        if self.hytale.timeout.is_zero() {
            self.hytale.timeout = d_timeout();
        }
        self.hytale.timeout = self.hytale.timeout.min(MAX_ATTEMPT_BUDGET);
        if self.cache.ttl.is_zero() {
            self.cache.ttl = d_cache_ttl();
        }
        if self.cache.cleanup_interval.is_zero() {
            self.cache.cleanup_interval = d_cleanup();
        }
        self.cache.ttl = self.cache.ttl.min(MAX_CACHE_DURATION);
        self.cache.cleanup_interval = self.cache.cleanup_interval.min(MAX_CACHE_DURATION);
        self.hytale.max_packet_size = self.hytale.max_packet_size.clamp(8, MAX_PACKET_SIZE);
        self.hytale.max_connections = self.hytale.max_connections.max(1);
    }

    /// Persists the current configuration state to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails or if the file cannot be written.
    pub fn to_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_content = serde_yaml::to_string(self)?;
        fs::write(config_path, yaml_content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempdir::TempDir;

    #[test]
    fn defaults_match_daemon_settings() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.hytale.default_port, 5520);
        assert_eq!(config.hytale.timeout, Duration::from_secs(10));
        assert_eq!(config.hytale.user_agent, "HytaleStatusDaemon/1.0");
        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.security.cors_origins, vec!["*".to_string()]);
        assert!(config.monitoring.enable_metrics);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "hytale:\n  timeout: 5s\n  user_agent: probe\ncache:\n  ttl: 1500ms\n",
        )
        .unwrap();

        assert_eq!(config.hytale.timeout, Duration::from_secs(5));
        assert_eq!(config.hytale.user_agent, "probe");
        assert_eq!(config.hytale.default_port, 5520);
        assert_eq!(config.cache.ttl, Duration::from_millis(1500));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(60));
    }

    #[test]
    fn numeric_durations_are_seconds_and_zero_falls_back() {
        let config = Config::from_yaml("hytale:\n  timeout: 0\ncache:\n  ttl: 2.5\n").unwrap();
        assert_eq!(config.hytale.timeout, Duration::from_secs(10));
        assert_eq!(config.cache.ttl, Duration::from_millis(2500));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            Config::from_yaml("hytale: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
        assert!(Config::from_yaml("hytale:\n  timeout: soon\n").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [
            ("TIMEOUT", "3s"),
            ("HYTALE_PORT", "6000"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("ENABLE_METRICS", "false"),
            ("LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::from_yaml("hytale:\n  timeout: 20s\n").unwrap();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.hytale.timeout, Duration::from_secs(3));
        assert_eq!(config.hytale.default_port, 6000);
        assert_eq!(config.security.cors_origins.len(), 2);
        assert!(!config.monitoring.enable_metrics);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "MAX_CONNECTIONS").then(|| "many".to_string()));

        match result {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "MAX_CONNECTIONS");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        assert_eq!(parse_duration("1e300s"), None);
        assert_eq!(parse_duration("1e300"), None);
        assert!(Config::from_yaml("hytale:\n  timeout: 1e300\n").is_err());

        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "TIMEOUT").then(|| "1e300s".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "TIMEOUT"
        ));
    }

    #[test]
    fn huge_durations_are_capped() {
        let config =
            Config::from_yaml("hytale:\n  timeout: 1e19\ncache:\n  ttl: 1e15\n  cleanup_interval: 1e15\n")
                .unwrap();
        assert_eq!(config.hytale.timeout, MAX_ATTEMPT_BUDGET);
        assert_eq!(config.cache.ttl, MAX_CACHE_DURATION);
        assert_eq!(config.cache.cleanup_interval, MAX_CACHE_DURATION);
    }

    #[test]
    fn max_packet_size_is_clamped() {
        let config = Config::from_yaml("hytale:\n  max_packet_size: 4294967295\n").unwrap();
        assert_eq!(config.hytale.max_packet_size, MAX_PACKET_SIZE);
    }

    #[test]
    fn file_roundtrip() {
        let dir = TempDir::new("hytale-status-config").unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.hytale.timeout = Duration::from_millis(2500);
        config.cache.max_entries = 5;
        config.to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(Config::from_yaml(&content).unwrap(), config);
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration("later"), None);
    }
}
