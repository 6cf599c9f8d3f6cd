//! Environment-driven configuration for the crosswire gateway.
//!
//! Configuration is read once at process start into an immutable [`Config`]
//! value; request handlers only ever see shared references to it.

mod error;
mod model_map;

use secrecy::SecretString;

pub use error::Error;
pub use model_map::{MatchKind, ModelMap, normalize_model_key};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_UPSTREAM_MODEL: &str = "gpt-4.1";

/// Immutable gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream credential. Absence is surfaced per request as an
    /// `authentication_error`, not at startup.
    pub api_key: Option<SecretString>,
    /// Upstream base URL without a trailing slash.
    pub base_url: String,
    /// Fallback upstream model when the model map misses.
    pub default_model: String,
    /// Client-model → upstream-model mapping.
    pub model_map: ModelMap,
    /// Whether request/response telemetry records are emitted.
    pub log_requests: bool,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        let log_requests = std::env::var("OBS_LOG_ENABLED")
            .map(|raw| env_bool(&raw))
            .unwrap_or(false);

        let mut config = Self::from_values(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("OPENAI_BASE_URL").ok(),
            std::env::var("OPENAI_DEFAULT_MODEL").ok(),
            std::env::var("MODEL_MAP_JSON").ok(),
        )?;

        config.log_requests = log_requests;
        Ok(config)
    }

    /// Build a configuration from raw environment values.
    pub fn from_values(
        api_key: Option<String>,
        base_url: Option<String>,
        default_model: Option<String>,
        model_map_json: Option<String>,
    ) -> Result<Self, Error> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let base_url = base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let default_model = default_model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_MODEL.to_string());

        let model_map = match model_map_json {
            Some(raw) if !raw.trim().is_empty() => ModelMap::parse(&raw)?,
            _ => ModelMap::default(),
        };

        Ok(Self {
            api_key,
            base_url,
            default_model,
            model_map,
            log_requests: false,
        })
    }

    /// Resolve a client-supplied model name to the upstream model name.
    pub fn resolve_model(&self, requested: &str) -> (String, MatchKind) {
        match self.model_map.lookup(requested) {
            (Some(target), kind) => (target.to_string(), kind),
            (None, kind) => (self.default_model.clone(), kind),
        }
    }
}

fn env_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
