use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use access_core::constants::DEFAULT_RESULT_TTL_DAYS;
use access_core::orchestrator::OrchestratorConfig;

use crate::errors::ApiError;

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    /// Local state (the SQLite ledger) lives here.
    pub data_dir: PathBuf,
    pub api_key: String,
    /// Allow admission on the local Merkle proof when the root registry is unreachable.
    pub demo_mode: bool,
    pub chain_timeout: Duration,
    pub result_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("data"),
            // In production, this should be a strong secret from environment.
            api_key: "dev-secret-key".to_string(),
            demo_mode: false,
            chain_timeout: Duration::from_millis(5000),
            result_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_DAYS * 86_400),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Config(format!("{name} has an invalid value: {raw:?}")))
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let mut cfg = Config::default();

        if let Some(addr) = lookup("BACKEND_ADDR") {
            cfg.addr = addr;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("API_KEY") {
            if key.is_empty() {
                return Err(ApiError::Config("API_KEY must not be empty".to_string()));
            }
            cfg.api_key = key;
        }
        if let Some(raw) = lookup("DEMO_MODE") {
            cfg.demo_mode = parse_var("DEMO_MODE", &raw)?;
        }
        if let Some(raw) = lookup("CHAIN_TIMEOUT_MS") {
            cfg.chain_timeout = Duration::from_millis(parse_var("CHAIN_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("RESULT_TTL_DAYS") {
            let days: u64 = parse_var("RESULT_TTL_DAYS", &raw)?;
            if days == 0 {
                return Err(ApiError::Config("RESULT_TTL_DAYS must be at least 1".to_string()));
            }
            cfg.result_ttl = Duration::from_secs(days * 86_400);
        }

        Ok(cfg)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig { allow_local_only: self.demo_mode, chain_timeout: self.chain_timeout }
    }
}
