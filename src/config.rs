//! Runtime settings
//!
//! All settings come from environment variables (loaded from .env by the
//! binary) with hard-coded defaults matching a local AQL service.

use serde::{Deserialize, Serialize};

/// Default row limit appended to queries without a LIMIT clause
pub const DEFAULT_ROW_LIMIT: u64 = 25_000;

/// Default number of repair attempts per session
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// AQL service host (host or host:port)
    pub server: String,

    /// AQL service API endpoint path
    pub endpoint: String,

    /// Basic auth credentials for the AQL service
    pub username: String,
    pub password: String,

    /// LLM provider name: "openai", "claude", "ollama" or "auto"
    pub provider: String,

    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,

    pub claude_api_key: Option<String>,
    pub claude_model: String,
    pub claude_base_url: String,

    pub ollama_model: String,
    pub ollama_base_url: String,

    /// True when Ollama was explicitly configured; auto-selection skips an
    /// unconfigured local daemon.
    pub ollama_configured: bool,

    /// Maximum repair attempts per session
    pub max_attempts: usize,

    /// Row limit injected by the preprocessor
    pub row_limit: u64,

    /// Translation cache TTL in seconds
    pub cache_ttl_secs: u64,

    /// Timeout for validation calls in seconds
    pub validate_timeout_secs: u64,

    /// Timeout for LLM calls in seconds
    pub llm_timeout_secs: u64,
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            server: env_or("AQL_SERVER", "localhost"),
            endpoint: env_or("AQL_ENDPOINT", "/server/api/v3/database/query"),
            username: env_or("AQL_USERNAME", "root"),
            password: env_or("AQL_PASSWORD", "root"),
            provider: env_or("LLM_PROVIDER", "auto"),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: env_or("OPENAI_MODEL", "gpt-4"),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            claude_api_key: std::env::var("CLAUDE_API_KEY").ok(),
            claude_model: env_or("CLAUDE_MODEL", "claude-3-opus-20240229"),
            claude_base_url: env_or("CLAUDE_BASE_URL", "https://api.anthropic.com/v1"),
            ollama_model: env_or("OLLAMA_MODEL", "llama3"),
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_configured: std::env::var("OLLAMA_BASE_URL").is_ok()
                || std::env::var("OLLAMA_MODEL").is_ok(),
            max_attempts: env_parse("AQL_MAX_FIX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            row_limit: env_parse("AQL_ROW_LIMIT", DEFAULT_ROW_LIMIT),
            cache_ttl_secs: env_parse("LLM_CACHE_TTL_SECS", 3600),
            validate_timeout_secs: env_parse("AQL_VALIDATE_TIMEOUT_SECS", 10),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS", 30),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
