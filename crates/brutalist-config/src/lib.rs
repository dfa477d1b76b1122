//! Environment-driven configuration (spec §6 "Environment variables").
//!
//! Unlike the teacher's `sven-config`, which layers YAML files found on
//! disk, this server has no config file: the layers are built-in defaults
//! overridden by environment variables, with CLI flags (see `src/cli.rs` at
//! the workspace root) applied last by the caller.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recursion guard marker set by the CLI Invoker on every spawned child
/// (spec §4.1, §4.10 step 1).
pub const SUBPROCESS_MARKER_VAR: &str = "BRUTALIST_SUBPROCESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub http_transport: bool,
    pub http_port: u16,
    pub debug: bool,
    pub log_level: String,
    pub max_cpu_time_sec: u64,
    pub cors_origins: Vec<String>,
    pub allow_cors_wildcard: bool,
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_transport: false,
            http_port: 3000,
            debug: false,
            log_level: "info".to_string(),
            // Exceeds the default 25 min wall-clock timeout; see
            // `brutalist_cli::DEFAULT_WALL_CLOCK_TIMEOUT`.
            max_cpu_time_sec: 30 * 60,
            cors_origins: default_cors_origins(),
            allow_cors_wildcard: false,
            production: false,
        }
    }
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Config {
    /// Load defaults overridden by environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(&EnvReader::process_env())
    }

    fn load_from(env: &EnvReader) -> Result<Self> {
        let mut cfg = Config::default();

        if let Some(v) = env.bool_var("HTTP_TRANSPORT") {
            cfg.http_transport = v;
        }
        if let Some(v) = env.get("HTTP_PORT") {
            cfg.http_port = v
                .parse()
                .with_context(|| format!("HTTP_PORT={v:?} is not a valid port"))?;
        }
        if let Some(v) = env.bool_var("DEBUG") {
            cfg.debug = v;
        }
        if let Some(v) = env.get("LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Some(v) = env.get("MAX_CPU_TIME_SEC") {
            cfg.max_cpu_time_sec = v
                .parse()
                .with_context(|| format!("MAX_CPU_TIME_SEC={v:?} is not a valid integer"))?;
        }
        if let Some(v) = env.get("CORS_ORIGINS") {
            cfg.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = env.bool_var("ALLOW_CORS_WILDCARD") {
            cfg.allow_cors_wildcard = v;
        }
        cfg.production = env
            .get("NODE_ENV")
            .or_else(|| env.get("BRUTALIST_ENV"))
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        cfg.validate()?;
        debug!(?cfg, "configuration loaded");
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.allow_cors_wildcard && self.production {
            bail!("ALLOW_CORS_WILDCARD cannot be set while running in production");
        }
        Ok(())
    }

    pub fn max_cpu_time(&self) -> Duration {
        Duration::from_secs(self.max_cpu_time_sec)
    }

    /// True when the allow-list (or wildcard) lets `origin` through (spec
    /// §6 CORS policy).
    pub fn origin_allowed(&self, origin: &str) -> bool {
        if self.allow_cors_wildcard && !self.production {
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }

    /// Is this process itself running as a subprocess spawned by the
    /// invoker? (spec §4.10 step 1, recursion guard.)
    pub fn is_subprocess() -> bool {
        std::env::var(SUBPROCESS_MARKER_VAR)
            .map(|v| v == "1")
            .unwrap_or(false)
    }
}

/// Thin indirection over `std::env::var` so loading can be unit-tested
/// without mutating the real process environment.
struct EnvReader(HashMap<String, String>);

impl EnvReader {
    fn process_env() -> Self {
        EnvReader(std::env::vars().collect())
    }

    #[cfg(test)]
    fn from_map(map: HashMap<String, String>) -> Self {
        EnvReader(map)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn bool_var(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvReader {
        EnvReader::from_map(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn defaults_when_no_env_set() {
        let cfg = Config::load_from(&env(&[])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn http_port_overridden_from_env() {
        let cfg = Config::load_from(&env(&[("HTTP_PORT", "8080")])).unwrap();
        assert_eq!(cfg.http_port, 8080);
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(Config::load_from(&env(&[("HTTP_PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn cors_origins_split_on_comma_and_trimmed() {
        let cfg = Config::load_from(&env(&[("CORS_ORIGINS", "http://a, http://b")])).unwrap();
        assert_eq!(cfg.cors_origins, vec!["http://a", "http://b"]);
    }

    #[test]
    fn wildcard_rejected_in_production() {
        let result = Config::load_from(&env(&[
            ("ALLOW_CORS_WILDCARD", "true"),
            ("NODE_ENV", "production"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn origin_allowed_checks_allow_list() {
        let cfg = Config::load_from(&env(&[("CORS_ORIGINS", "http://trusted")])).unwrap();
        assert!(cfg.origin_allowed("http://trusted"));
        assert!(!cfg.origin_allowed("http://evil"));
    }

    #[test]
    fn origin_allowed_wildcard_outside_production() {
        let cfg = Config::load_from(&env(&[("ALLOW_CORS_WILDCARD", "true")])).unwrap();
        assert!(cfg.origin_allowed("http://anything"));
    }

    #[test]
    fn max_cpu_time_exceeds_default_wall_clock_timeout() {
        let cfg = Config::default();
        assert!(cfg.max_cpu_time().as_secs() > 25 * 60);
    }
}
