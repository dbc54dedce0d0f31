//! Configuration for the shop assistant.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::assistant::core::errors::{AssistantError, AssistantResult};

/// Default completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Longest accepted session and token lifetime (30 days).
pub const MAX_NONCE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "SHOP_ASSISTANT_";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Completion API settings.
    pub llm: LlmConfig,
    /// Anti-forgery token settings.
    pub nonce: NonceConfig,
}

impl AssistantConfig {
    /// Build a config from defaults overlaid with `SHOP_ASSISTANT_*` variables.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> AssistantResult<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values returned by `lookup` for each known variable name.
    ///
    /// # Errors
    /// Returns an error if a numeric value cannot be parsed.
    pub fn with_overrides<F>(mut self, lookup: F) -> AssistantResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(port) = var("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(dir) = var("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
        }
        if let Some(flag) = var("SECURE_COOKIES") {
            self.server.secure_cookies = parse_flag(&flag);
        }
        if let Some(path) = var("DB_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(flag) = var("EPHEMERAL") {
            self.storage.ephemeral = parse_flag(&flag);
        }
        if let Some(url) = var("API_URL") {
            self.llm.endpoint = url;
        }
        if let Some(model) = var("MODEL") {
            self.llm.model = model;
        }
        if let Some(secs) = var("TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_number("TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("NONCE_TTL_SECS") {
            self.nonce.ttl_seconds = parse_number("NONCE_TTL_SECS", &secs)?;
        }
        if let Some(max) = var("MAX_SESSIONS") {
            self.nonce.max_sessions = parse_number("MAX_SESSIONS", &max)?;
        }

        Ok(self)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> AssistantResult<()> {
        if self.server.port == 0 {
            return Err(AssistantError::InvalidConfig(
                "server.port must be > 0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(AssistantError::InvalidConfig(
                "llm.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.llm.connect_timeout_secs == 0 {
            return Err(AssistantError::InvalidConfig(
                "llm.connect_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(AssistantError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }

        if self.nonce.ttl_seconds == 0 || self.nonce.ttl_seconds > MAX_NONCE_TTL_SECS {
            return Err(AssistantError::InvalidConfig(format!(
                "nonce.ttl_seconds must be between 1 and {MAX_NONCE_TTL_SECS}"
            )));
        }

        if self.nonce.max_sessions == 0 {
            return Err(AssistantError::InvalidConfig(
                "nonce.max_sessions must be > 0".to_string(),
            ));
        }

        for origin in &self.server.allowed_origins {
            let parsed = Url::parse(origin)?;
            if parsed.origin().ascii_serialization() != *origin {
                return Err(AssistantError::InvalidConfig(format!(
                    "server.allowed_origins entry is not a bare origin: {origin}"
                )));
            }
        }

        Url::parse(&self.llm.endpoint)?;

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> AssistantResult<T> {
    value.trim().parse().map_err(|_| {
        AssistantError::InvalidConfig(format!("{ENV_PREFIX}{name} is not a valid number: {value}"))
    })
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Directory holding the chat page assets.
    pub static_dir: PathBuf,
    /// Extra origins, besides the page's own, allowed to call the API.
    pub allowed_origins: Vec<String>,
    /// Mark the session cookie `Secure` (serve over HTTPS).
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("static"),
            allowed_origins: Vec::new(),
            secure_cookies: false,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path for settings and catalog.
    pub sqlite_path: PathBuf,
    /// Keep settings and catalog in process memory instead of `SQLite`.
    pub ephemeral: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("shop_assistant.db"),
            ephemeral: false,
        }
    }
}

/// Completion API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat completions endpoint.
    pub endpoint: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Total request timeout in seconds.
    pub timeout_secs: u64,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl LlmConfig {
    /// Total request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Anti-forgery token settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceConfig {
    /// Session (and token) lifetime in seconds, renewed on activity.
    pub ttl_seconds: u64,
    /// Most sessions kept at once; the one closest to expiry is evicted first.
    pub max_sessions: usize,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 12 * 60 * 60,
            max_sessions: 1024,
        }
    }
}
