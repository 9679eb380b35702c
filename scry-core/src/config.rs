//! Configuration for the Scry server.
//!
//! Uses `figment` for layered configuration: defaults -> TOML file ->
//! environment. Environment variables are prefixed with `SCRY_` and nest
//! with `__` (e.g. `SCRY_SERVER__PORT=9000`, `SCRY_RANKING__MAX_SOURCES=3`).
//!
//! API keys are never stored in configuration; config holds the *name* of
//! the environment variable to read the key from, and each collaborator
//! resolves it at construction time.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScryConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub ranking: RankingConfig,
    pub llm: LlmConfig,
}

/// Bind address and connection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Idle seconds on an open WebSocket before a keep-alive ping is sent.
    /// Applies only while awaiting a new query, never mid-turn.
    pub idle_ping_secs: u64,
    /// Allowed CORS origins. Empty means any origin (development default).
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            idle_ping_secs: 60,
            cors_origins: Vec::new(),
        }
    }
}

/// Web search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Environment variable holding the search provider API key.
    pub api_key_env: String,
    /// Search API endpoint.
    pub base_url: String,
    /// Maximum results to request from the provider.
    pub max_results: usize,
    /// Whether to fetch each result URL and extract its page text,
    /// replacing the provider's snippet when extraction succeeds.
    pub fetch_page_content: bool,
    /// Request timeout in seconds (search call and per-page fetches).
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: "https://api.tavily.com/search".to_string(),
            max_results: 10,
            fetch_page_content: true,
            timeout_secs: 15,
        }
    }
}

/// Relevance ranking weights and the presentation cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Score contribution per query word contained in a source title.
    pub title_weight: f64,
    /// Score contribution per query word contained in a source content.
    pub content_weight: f64,
    /// Maximum ranked sources sent to the client. This is a presentation
    /// limit applied by the orchestrator; the ranker itself returns the
    /// full re-ordered set.
    pub max_sources: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            title_weight: 3.0,
            content_weight: 1.0,
            max_sources: 5,
        }
    }
}

/// Generative model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier (e.g. "gemini-2.0-flash").
    pub model: String,
    /// Environment variable holding the model provider API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate per answer.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 2048,
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `SCRY_`, nested with `__`)
/// 2. TOML file (`config_file`, or `scry.toml` in the working directory)
/// 3. Built-in defaults
pub fn load_config(config_file: Option<&Path>) -> Result<ScryConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ScryConfig::default()));

    let path = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("scry.toml"));
    if path.exists() {
        figment = figment.merge(Toml::file(&path));
    }

    figment = figment.merge(Env::prefixed("SCRY_").split("__"));

    figment.extract().map_err(Box::new)
}
