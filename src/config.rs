use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Server-side Gemini credential; the stored provider key never overrides it.
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    /// Model used for lead generation and extraction.
    pub gemini_model: String,
    /// Model used for the search-grounded chat.
    pub gemini_chat_model: String,
    pub gemini_live_url: String,
    pub gemini_live_model: String,
    pub cerebras_base_url: String,
    pub cerebras_model: String,
    /// Directory holding the persisted provider selection.
    pub provider_config_dir: PathBuf,
    pub provider_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            gemini_api_key: String::new(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: "gemini-3-pro-preview".to_string(),
            gemini_chat_model: "gemini-3-flash-preview".to_string(),
            gemini_live_url: DEFAULT_GEMINI_LIVE_URL.to_string(),
            gemini_live_model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            cerebras_base_url: DEFAULT_CEREBRAS_BASE_URL.to_string(),
            cerebras_model: "llama-3.3-70b".to_string(),
            provider_config_dir: PathBuf::from("."),
            provider_timeout_secs: 180,
        }
    }
}

fn http_url(var: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(var).unwrap_or_else(|_| default.to_string());
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", var);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", var);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn non_empty(var: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(var).unwrap_or_else(|_| default.to_string());
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", var);
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .map_err(|_| {
                    anyhow::anyhow!("GEMINI_API_KEY or API_KEY environment variable required")
                })
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("GEMINI_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            gemini_base_url: http_url("GEMINI_BASE_URL", &defaults.gemini_base_url)?,
            gemini_model: non_empty("GEMINI_MODEL", &defaults.gemini_model)?,
            gemini_chat_model: non_empty("GEMINI_CHAT_MODEL", &defaults.gemini_chat_model)?,
            gemini_live_url: non_empty("GEMINI_LIVE_URL", &defaults.gemini_live_url).and_then(
                |url| {
                    if !url.starts_with("ws://") && !url.starts_with("wss://") {
                        anyhow::bail!("GEMINI_LIVE_URL must start with ws:// or wss://");
                    }
                    Ok(url)
                },
            )?,
            gemini_live_model: non_empty("GEMINI_LIVE_MODEL", &defaults.gemini_live_model)?,
            cerebras_base_url: http_url("CEREBRAS_BASE_URL", &defaults.cerebras_base_url)?,
            cerebras_model: non_empty("CEREBRAS_MODEL", &defaults.cerebras_model)?,
            provider_config_dir: std::env::var("PROVIDER_CONFIG_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.provider_config_dir),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.provider_timeout_secs.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_TIMEOUT_SECS must be a positive number"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("PROVIDER_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(secs)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Gemini Base URL: {}", config.gemini_base_url);
        tracing::debug!(
            "Gemini models: search={}, chat={}, live={}",
            config.gemini_model,
            config.gemini_chat_model,
            config.gemini_live_model
        );
        tracing::debug!("Cerebras Base URL: {}", config.cerebras_base_url);
        tracing::debug!(
            "Provider config directory: {}",
            config.provider_config_dir.display()
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
