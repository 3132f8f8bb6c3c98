// src/config.rs

use std::{env, net::IpAddr, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub city_column: String,
    pub cleanup_delay: Duration,
    pub wkhtmltopdf: PathBuf,
    pub max_upload_bytes: u64,
    pub session_capacity: u64,
    pub session_idle: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            log_level: "info".to_string(),
            data_dir: PathBuf::from("data"),
            city_column: "CONTACTCITY".to_string(),
            cleanup_delay: Duration::from_secs(5),
            wkhtmltopdf: PathBuf::from("wkhtmltopdf"),
            max_upload_bytes: 20 * 1024 * 1024,
            session_capacity: 10_000,
            session_idle: Duration::from_secs(60 * 60),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("HOST") {
            cfg.host = parse("HOST", &v)?;
        }
        if let Some(v) = get("PORT") {
            cfg.port = parse("PORT", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            cfg.log_level = v.trim().to_string();
        }
        if let Some(v) = get("DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CITY_COLUMN") {
            cfg.city_column = v.trim().to_string();
        }
        if let Some(v) = get("CLEANUP_DELAY_SECS") {
            cfg.cleanup_delay = Duration::from_secs(parse("CLEANUP_DELAY_SECS", &v)?);
        }
        if let Some(v) = get("WKHTMLTOPDF") {
            cfg.wkhtmltopdf = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = parse("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("SESSION_CAPACITY") {
            cfg.session_capacity = parse("SESSION_CAPACITY", &v)?;
        }
        if let Some(v) = get("SESSION_IDLE_SECS") {
            cfg.session_idle = Duration::from_secs(parse("SESSION_IDLE_SECS", &v)?);
        }
        Ok(cfg)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.city_column, "CONTACTCITY");
        assert_eq!(cfg.cleanup_delay, Duration::from_secs(5));
        assert_eq!(cfg.session_capacity, 10_000);
        assert_eq!(cfg.session_idle, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("CITY_COLUMN", " CITY "),
            ("CLEANUP_DELAY_SECS", "30"),
            ("DATA_DIR", "/var/lib/cityreports"),
            ("LOG_LEVEL", ""),
            ("SESSION_IDLE_SECS", "120"),
        ]))
        .unwrap();
        assert_eq!(cfg.host, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.city_column, "CITY");
        assert_eq!(cfg.cleanup_delay, Duration::from_secs(30));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/cityreports"));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.session_idle, Duration::from_secs(120));
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
