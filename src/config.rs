//! TOML configuration.
//!
//! Every section has defaults so a minimal file (or no file at all) yields a
//! working setup. A handful of environment variables override the parsed
//! values for container deployments:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `QURAN_DB_PATH` | `db.path` |
//! | `QURAN_BIND` | `server.bind` |
//! | `QURAN_RATE_PER_MIN` | `rate_limit.requests_per_minute` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/quran.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub fetch_annotation: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            timeout_secs: default_timeout_secs(),
            fetch_annotation: true,
        }
    }
}

fn default_base_url() -> String {
    "https://raw.githubusercontent.com/semarketir/quranjson/master/source".to_string()
}
fn default_language() -> String {
    "id".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: u32,
    #[serde(default = "default_highlight_start")]
    pub highlight_start: String,
    #[serde(default = "default_highlight_end")]
    pub highlight_end: String,
    #[serde(default = "default_ellipsis")]
    pub ellipsis: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            max_query_chars: default_max_query_chars(),
            snippet_tokens: default_snippet_tokens(),
            highlight_start: default_highlight_start(),
            highlight_end: default_highlight_end(),
            ellipsis: default_ellipsis(),
        }
    }
}

fn default_limit() -> u32 {
    20
}
fn default_max_limit() -> u32 {
    50
}
fn default_max_query_chars() -> usize {
    100
}
fn default_snippet_tokens() -> u32 {
    10
}
fn default_highlight_start() -> String {
    "<b>".to_string()
}
fn default_highlight_end() -> String {
    "</b>".to_string()
}
fn default_ellipsis() -> String {
    "…".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Burst size per client; one more request is allowed every `60 / requests_per_minute` seconds.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Upper bound on tracked client identities.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_requests_per_minute(),
            max_entries: default_max_entries(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            trust_forwarded_headers: true,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    120
}
fn default_max_entries() -> usize {
    100_000
}
fn default_idle_ttl_secs() -> u64 {
    600
}
fn default_sweep_interval_secs() -> u64 {
    60
}

/// Read, parse, override and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but falls back to defaults when `path` does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    tracing::warn!(path = %path.display(), "config file not found, using defaults");
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(path) = non_empty_env("QURAN_DB_PATH") {
        config.db.path = PathBuf::from(path);
    }
    if let Some(bind) = non_empty_env("QURAN_BIND") {
        config.server.bind = bind;
    }
    if let Some(rate) = non_empty_env("QURAN_RATE_PER_MIN") {
        config.rate_limit.requests_per_minute = rate
            .parse()
            .with_context(|| format!("QURAN_RATE_PER_MIN is not a number: '{}'", rate))?;
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.max_limit < 1 {
            bail!("retrieval.max_limit must be >= 1");
        }
        if r.default_limit < 1 || r.default_limit > r.max_limit {
            bail!(
                "retrieval.default_limit must be in [1, {}] (retrieval.max_limit)",
                r.max_limit
            );
        }
        if r.max_query_chars < 1 {
            bail!("retrieval.max_query_chars must be >= 1");
        }
        // FTS5 caps snippet() at 64 tokens.
        if !(1..=64).contains(&r.snippet_tokens) {
            bail!("retrieval.snippet_tokens must be in [1, 64]");
        }

        if self.source.base_url.trim().is_empty() {
            bail!("source.base_url must not be empty");
        }
        if self.source.language.trim().is_empty() {
            bail!("source.language must not be empty");
        }
        if self.source.timeout_secs < 1 {
            bail!("source.timeout_secs must be >= 1");
        }

        let rl = &self.rate_limit;
        if rl.requests_per_minute < 1 {
            bail!("rate_limit.requests_per_minute must be >= 1");
        }
        if rl.max_entries < 1 {
            bail!("rate_limit.max_entries must be >= 1");
        }
        if rl.idle_ttl_secs < 60 {
            bail!("rate_limit.idle_ttl_secs must be >= 60 (one full refill window)");
        }
        if rl.sweep_interval_secs < 1 {
            bail!("rate_limit.sweep_interval_secs must be >= 1");
        }

        Ok(())
    }
}
