// Configuration module for the Claude-to-OpenAI proxy
// Settings are read from the process environment once and never mutated afterwards

pub mod key_mapping;
pub mod streaming;

use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use key_mapping::KeyProfile;
pub use streaming::StreamingMode;

use key_mapping::{load_key_profiles, parse_flag, ProfileDefaults};
use streaming::{load_model_streaming_modes, parse_default_mode};

static CONFIG: OnceCell<Arc<Settings>> = OnceCell::new();

const ARK_DOMAIN: &str = "ark-cn-beijing.bytedance.net";
const INTERNAL_PROVIDER_DOMAIN: &str = "bytedance.net";
const OPENAI_KEY_PREFIX: &str = "sk-";

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_big_model() -> String {
    "gpt-4o".to_string()
}

fn default_small_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No valid API key found. Set either OPENAI_API_KEY or ARK_API_KEY")]
    MissingApiKey,

    #[error("{var}='{value}' is not a valid number")]
    InvalidNumber { var: &'static str, value: String },
}

/// Immutable configuration snapshot built from environment variables.
#[derive(Clone, PartialEq)]
pub struct Settings {
    /// Credential used against the upstream provider
    pub api_key: String,
    pub openai_api_key: Option<String>,
    pub ark_api_key: Option<String>,
    /// Legacy single client secret; None disables that check
    pub anthropic_api_key: Option<String>,
    pub openai_base_url: String,
    pub azure_api_version: Option<String>,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_tokens_limit: u32,
    pub min_tokens_limit: u32,
    /// Seconds
    pub request_timeout: u64,
    pub max_retries: u32,
    pub default_streaming_mode: StreamingMode,
    /// Keys are lowercased model names
    pub model_streaming_modes: HashMap<String, StreamingMode>,
    pub big_model: String,
    pub middle_model: String,
    pub small_model: String,
    /// MODEL_IGNORE_TEMPERATURE, applied to clients without their own profile
    pub default_ignore_temperature: bool,
    pub api_key_model_mapping: HashMap<String, KeyProfile>,
}

fn non_empty<'a>(vars: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(
    vars: &BTreeMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(vars, name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber {
            var: name,
            value: raw.to_string(),
        }),
        None => Ok(default),
    }
}

impl Settings {
    /// Load settings from the current process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    /// Build settings from an explicit set of environment variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();

        let openai_api_key = non_empty(&vars, "OPENAI_API_KEY").map(str::to_string);
        let ark_api_key = non_empty(&vars, "ARK_API_KEY").map(str::to_string);
        let openai_base_url = non_empty(&vars, "OPENAI_BASE_URL")
            .map(str::to_string)
            .unwrap_or_else(default_base_url);

        // ARK endpoints prefer their own key, everything else needs the OpenAI one
        let api_key = match (&ark_api_key, &openai_api_key) {
            (Some(ark), _) if openai_base_url.contains(ARK_DOMAIN) => ark.clone(),
            (_, Some(openai)) => openai.clone(),
            _ => return Err(ConfigError::MissingApiKey),
        };

        let anthropic_api_key = non_empty(&vars, "ANTHROPIC_API_KEY").map(str::to_string);
        if anthropic_api_key.is_none() {
            tracing::warn!(
                "ANTHROPIC_API_KEY not set. Client API key validation relies on key mappings only."
            );
        }

        let default_streaming_mode = parse_default_mode(non_empty(&vars, "DEFAULT_STREAMING_MODE"));
        let model_streaming_modes = load_model_streaming_modes(&vars, default_streaming_mode);

        let big_model = non_empty(&vars, "BIG_MODEL")
            .map(str::to_string)
            .unwrap_or_else(default_big_model);
        let middle_model = non_empty(&vars, "MIDDLE_MODEL")
            .map(str::to_string)
            .unwrap_or_else(|| big_model.clone());
        let small_model = non_empty(&vars, "SMALL_MODEL")
            .map(str::to_string)
            .unwrap_or_else(default_small_model);

        let api_key_model_mapping = load_key_profiles(
            &vars,
            ProfileDefaults {
                big_model: &big_model,
                small_model: &small_model,
            },
        );

        let settings = Self {
            api_key,
            openai_api_key,
            ark_api_key,
            anthropic_api_key,
            openai_base_url,
            azure_api_version: non_empty(&vars, "AZURE_API_VERSION").map(str::to_string),
            host: non_empty(&vars, "HOST")
                .map(str::to_string)
                .unwrap_or_else(default_host),
            port: parse_number(&vars, "PORT", 8082)?,
            log_level: non_empty(&vars, "LOG_LEVEL")
                .map(str::to_string)
                .unwrap_or_else(default_log_level),
            max_tokens_limit: parse_number(&vars, "MAX_TOKENS_LIMIT", 4096)?,
            min_tokens_limit: parse_number(&vars, "MIN_TOKENS_LIMIT", 100)?,
            request_timeout: parse_number(&vars, "REQUEST_TIMEOUT", 90)?,
            max_retries: parse_number(&vars, "MAX_RETRIES", 2)?,
            default_streaming_mode,
            model_streaming_modes,
            big_model,
            middle_model,
            small_model,
            default_ignore_temperature: parse_flag(non_empty(&vars, "MODEL_IGNORE_TEMPERATURE")),
            api_key_model_mapping,
        };

        tracing::info!(
            "Configuration loaded: API_KEY={}, BASE_URL='{}', models big={} middle={} small={}, {} key mapping(s)",
            mask_api_key(Some(&settings.api_key)),
            settings.openai_base_url,
            settings.big_model,
            settings.middle_model,
            settings.small_model,
            settings.api_key_model_mapping.len()
        );

        Ok(settings)
    }

    /// Profile for a client key, or the default profile when the key is not mapped.
    pub fn get_models_for_api_key(&self, api_key: Option<&str>) -> KeyProfile {
        if let Some(profile) = api_key.and_then(|k| self.api_key_model_mapping.get(k)) {
            return profile.clone();
        }

        KeyProfile {
            big_model: self.big_model.clone(),
            middle_model: self.middle_model.clone(),
            small_model: self.small_model.clone(),
            ignore_temperature: self.default_ignore_temperature,
        }
    }

    /// Streaming mode for a model, honouring per-model overrides.
    pub fn get_streaming_mode_for_model(&self, model_name: &str) -> StreamingMode {
        if model_name.is_empty() {
            return self.default_streaming_mode;
        }

        let lowered = model_name.to_lowercase();
        if let Some(mode) = self.model_streaming_modes.get(&lowered) {
            return *mode;
        }

        self.model_streaming_modes
            .get(&lowered.replace('-', "_"))
            .copied()
            .unwrap_or(self.default_streaming_mode)
    }

    /// Basic sanity check of the upstream credential.
    pub fn validate_upstream_key(&self) -> bool {
        if self.api_key.is_empty() {
            tracing::warn!("Upstream API key validation failed: key not set");
            return false;
        }

        // Internal provider keys have no fixed format
        if self.openai_base_url.contains(INTERNAL_PROVIDER_DOMAIN) {
            tracing::debug!("Upstream API key accepted for internal provider");
            return true;
        }

        if !self.api_key.starts_with(OPENAI_KEY_PREFIX) {
            tracing::warn!(
                "Upstream API key validation failed: expected '{}' prefix",
                OPENAI_KEY_PREFIX
            );
            return false;
        }

        true
    }

    /// Whether client-side key validation is configured at all.
    pub fn client_validation_enabled(&self) -> bool {
        self.anthropic_api_key.is_some() || !self.api_key_model_mapping.is_empty()
    }

    /// Check a client-supplied key against the legacy secret and the key mappings.
    pub fn validate_client_key(&self, client_api_key: Option<&str>) -> bool {
        if !self.client_validation_enabled() {
            return true;
        }

        let Some(key) = client_api_key else {
            return false;
        };

        if self.anthropic_api_key.as_deref() == Some(key) {
            return true;
        }

        self.api_key_model_mapping.contains_key(key)
    }

    /// Bound a client-requested max_tokens into the configured limits.
    pub fn clamp_max_tokens(&self, requested: u32) -> u32 {
        let upper = self.max_tokens_limit.max(self.min_tokens_limit);
        requested.clamp(self.min_tokens_limit, upper)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mapped_keys: Vec<String> = self
            .api_key_model_mapping
            .keys()
            .map(|k| mask_api_key(Some(k)))
            .collect();

        f.debug_struct("Settings")
            .field("api_key", &mask_api_key(Some(&self.api_key)))
            .field("anthropic_api_key", &self.anthropic_api_key.as_deref().map(|k| mask_api_key(Some(k))))
            .field("openai_base_url", &self.openai_base_url)
            .field("azure_api_version", &self.azure_api_version)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("max_tokens_limit", &self.max_tokens_limit)
            .field("min_tokens_limit", &self.min_tokens_limit)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("default_streaming_mode", &self.default_streaming_mode)
            .field("model_streaming_modes", &self.model_streaming_modes)
            .field("big_model", &self.big_model)
            .field("middle_model", &self.middle_model)
            .field("small_model", &self.small_model)
            .field("default_ignore_temperature", &self.default_ignore_temperature)
            .field("mapped_keys", &mapped_keys)
            .finish()
    }
}

/// Mask an API key for logs: first 8 and last 4 chars, or `****` for short keys.
pub fn mask_api_key(api_key: Option<&str>) -> String {
    match api_key {
        Some(key) if key.chars().count() > 12 => {
            let head: String = key.chars().take(8).collect();
            let mut tail: Vec<char> = key.chars().rev().take(4).collect();
            tail.reverse();
            format!("{}...{}", head, tail.into_iter().collect::<String>())
        }
        _ => "****".to_string(),
    }
}

/// Load settings from the environment on first call and share them afterwards.
pub fn init_config() -> Result<Arc<Settings>, ConfigError> {
    CONFIG
        .get_or_try_init(|| Settings::from_env().map(Arc::new))
        .cloned()
}

pub fn get_config() -> Option<Arc<Settings>> {
    CONFIG.get().cloned()
}
