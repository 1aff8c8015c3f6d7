//! Configuration management for the SolDocs agent.
//!
//! Unlike the teacher's `config.yaml` search, this crate's configuration
//! contract (spec §6) is environment-variable based. `load_from_env()`
//! mirrors the teacher's resilience posture: optional numerics that fail to
//! parse fall back to their default rather than aborting startup, while the
//! two required variables (`SOLANA_RPC_URL`, `ANTHROPIC_API_KEY`) produce a
//! clear `ConfigError` the caller can report before exiting.
//!
//! `apply_file_overrides` covers the `--config <path>` CLI flag: an optional
//! `.env`-style `KEY=VALUE` file consulted before `load_from_env()` runs,
//! the same "CLI override > env > file > default" precedence the teacher's
//! `config::load_config` gives `data_dir`.

use std::env;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    pub solana_rpc_url: String,
    pub anthropic_api_key: String,
    pub api_port: u16,
    pub agent_discovery_interval_ms: u64,
    pub agent_concurrency: usize,
    pub webhook_url: Option<String>,
    pub data_dir: String,
}

const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 300_000;
const DEFAULT_CONCURRENCY: usize = 1;
const DEFAULT_DATA_DIR: &str = "./data";

impl Config {
    /// Load configuration from the process environment (spec §6).
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let solana_rpc_url = env::var("SOLANA_RPC_URL")
            .map_err(|_| ConfigError::MissingVar("SOLANA_RPC_URL".to_string()))?;
        let anthropic_api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingVar("ANTHROPIC_API_KEY".to_string()))?;

        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_API_PORT);

        let agent_discovery_interval_ms = env::var("AGENT_DISCOVERY_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DISCOVERY_INTERVAL_MS);

        let agent_concurrency = env::var("AGENT_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1);

        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());

        Ok(Config {
            solana_rpc_url,
            anthropic_api_key,
            api_port,
            agent_discovery_interval_ms,
            agent_concurrency,
            webhook_url,
            data_dir,
        })
    }

    /// True iff the Anthropic key looks like a real key (spec §5: warn, don't fail).
    pub fn looks_like_anthropic_key(&self) -> bool {
        self.anthropic_api_key.starts_with("sk-ant-")
    }
}

/// Applies an optional `.env`-style override file: blank lines and
/// `#`-prefixed comments are skipped, and each `KEY=VALUE` line sets the
/// process environment variable only if it isn't already set, so a real
/// environment variable always wins over the file.
pub fn apply_file_overrides(path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::OverrideFile(path.display().to_string(), e.to_string()))?;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        if env::var(key).is_err() {
            env::set_var(key, value);
        }
    }

    Ok(())
}
