use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineConfig;

/// Process configuration, read once from `HOTELD_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| lookup(key).and_then(|s| parse_flag(&s)).unwrap_or(default);

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            lock_timeout: parsed("HOTELD_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            commit_retries: parse_or(lookup("HOTELD_COMMIT_RETRIES"), defaults.commit_retries),
            allow_past_check_in: flag("HOTELD_ALLOW_PAST_CHECK_IN", defaults.allow_past_check_in),
            pending_bookings: flag("HOTELD_PENDING_BOOKINGS", defaults.pending_bookings),
            cancel_cutoff: flag("HOTELD_CANCEL_CUTOFF", defaults.cancel_cutoff),
            ..defaults
        };

        Self {
            bind: lookup("HOTELD_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(lookup("HOTELD_PORT"), 8080),
            data_dir: PathBuf::from(lookup("HOTELD_DATA_DIR").unwrap_or_else(|| "./data".into())),
            jwt_secret: lookup("HOTELD_JWT_SECRET").unwrap_or_else(|| "hoteld-dev-secret".into()),
            metrics_port: lookup("HOTELD_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            compact_threshold: parse_or(lookup("HOTELD_COMPACT_THRESHOLD"), 1000),
            engine,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("hoteld.wal")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]);
        assert_eq!(c.port, 8080);
        assert_eq!(c.bind, "0.0.0.0");
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.metrics_port, None);
        assert!(c.engine.cancel_cutoff);
        assert!(!c.engine.pending_bookings);
        assert_eq!(c.wal_path(), PathBuf::from("./data/hoteld.wal"));
    }

    #[test]
    fn overrides_parsed() {
        let c = config(&[
            ("HOTELD_PORT", "9000"),
            ("HOTELD_LOCK_TIMEOUT_MS", "150"),
            ("HOTELD_COMMIT_RETRIES", "5"),
            ("HOTELD_PENDING_BOOKINGS", "yes"),
            ("HOTELD_CANCEL_CUTOFF", "off"),
            ("HOTELD_METRICS_PORT", "9464"),
        ]);
        assert_eq!(c.port, 9000);
        assert_eq!(c.engine.lock_timeout, Duration::from_millis(150));
        assert_eq!(c.engine.commit_retries, 5);
        assert!(c.engine.pending_bookings);
        assert!(!c.engine.cancel_cutoff);
        assert_eq!(c.metrics_port, Some(9464));
    }

    #[test]
    fn garbage_falls_back() {
        let c = config(&[("HOTELD_PORT", "eighty"), ("HOTELD_PENDING_BOOKINGS", "maybe")]);
        assert_eq!(c.port, 8080);
        assert!(!c.engine.pending_bookings);
    }

    #[test]
    fn out_of_range_retries_fall_back() {
        let c = config(&[("HOTELD_COMMIT_RETRIES", "4294967297")]);
        assert_eq!(c.engine.commit_retries, EngineConfig::default().commit_retries);
        let c = config(&[("HOTELD_PORT", "70000")]);
        assert_eq!(c.port, 8080);
    }
}
