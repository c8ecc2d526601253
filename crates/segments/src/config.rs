//! Runtime configuration read from the environment.

use std::{env, str::FromStr, time::Duration};

/// Tolerance used when a request does not specify one.
pub const DEFAULT_TOLERANCE_METERS: f64 = 15.0;

/// How long a segment's match list stays fresh after a full matcher pass.
pub const DEFAULT_MATCH_LIST_TTL: Duration = Duration::from_secs(60 * 60);

/// Settings the matching engine needs. The engine never reads the environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub default_tolerance_m: f64,
    pub match_list_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_tolerance_m: DEFAULT_TOLERANCE_METERS,
            match_list_ttl: DEFAULT_MATCH_LIST_TTL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "postgres://docker:pg@0.0.0.0".to_string());

        let ttl_secs = parse_or(&lookup, "MATCH_LIST_TTL_SECS", DEFAULT_MATCH_LIST_TTL.as_secs());
        let default_tolerance_m = parse_or(
            &lookup,
            "DEFAULT_TOLERANCE_METERS",
            DEFAULT_TOLERANCE_METERS,
        );

        Self {
            database_url,
            port: parse_or(&lookup, "PORT", 3001),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10),
            engine: EngineConfig {
                default_tolerance_m: if default_tolerance_m.is_finite() && default_tolerance_m >= 0.0
                {
                    default_tolerance_m
                } else {
                    DEFAULT_TOLERANCE_METERS
                },
                match_list_ttl: Duration::from_secs(ttl_secs),
            },
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {key}={raw:?}");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.engine.match_list_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DB_MAX_CONNECTIONS", "32"),
            ("DEFAULT_TOLERANCE_METERS", "25.5"),
            ("MATCH_LIST_TTL_SECS", "60"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_max_connections, 32);
        assert_eq!(config.engine.default_tolerance_m, 25.5);
        assert_eq!(config.engine.match_list_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_garbage_falls_back() {
        let config = config_from(&[("PORT", "eighty"), ("DEFAULT_TOLERANCE_METERS", "-4")]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.engine.default_tolerance_m, DEFAULT_TOLERANCE_METERS);
    }
}
