use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CadenceError, Result};

/// Top-level configuration for the Cadence service.
///
/// Loaded from `~/.cadence/config.toml` by default. Secrets may be left out
/// of the file and supplied through the environment instead
/// (see [`CadenceConfig::apply_env_overrides`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CadenceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Fill secrets from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Fill secrets from an arbitrary lookup. Non-empty values win over the file.
    ///
    /// `OPENAI_API_KEY` takes precedence over the legacy `AI` variable.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY").or_else(|| get("AI")) {
            self.llm.api_key = Some(key);
        }
        if let Some(id) = get("SPOTIFY_CLIENT_ID") {
            self.catalog.client_id = Some(id);
        }
        if let Some(secret) = get("SPOTIFY_CLIENT_SECRET") {
            self.catalog.client_secret = Some(secret);
        }
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the HTTP server binds to.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3040,
        }
    }
}

/// Chat-completion endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL; `/v1/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Bearer API key. Absent means every completion falls back.
    pub api_key: Option<String>,
    /// Per-request timeout. Absent means wait indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            api_key: None,
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Music catalog (token + search) settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Accounts host; `/api/token` is appended.
    pub accounts_url: String,
    /// Web API host; `/v1/search` is appended.
    pub api_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Keep a bearer token across lookups until it is about to expire.
    pub reuse_tokens: bool,
    /// Seconds before the reported expiry at which a reused token is refreshed.
    pub token_expiry_margin_secs: u64,
    /// Per-request timeout. Absent means wait indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            accounts_url: "https://accounts.spotify.com".to_string(),
            api_url: "https://api.spotify.com".to_string(),
            client_id: None,
            client_secret: None,
            reuse_tokens: false,
            token_expiry_margin_secs: 30,
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("reuse_tokens", &self.reuse_tokens)
            .field("token_expiry_margin_secs", &self.token_expiry_margin_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Conversation session limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chat turns kept per session (oldest evicted first).
    pub history_capacity: usize,
    /// Resolved tracks kept per session (oldest evicted first).
    pub track_capacity: usize,
    /// Idle minutes after which a session is dropped.
    pub session_timeout_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            track_capacity: 10,
            session_timeout_minutes: 60,
        }
    }
}
