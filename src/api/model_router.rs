// Model router - maps Claude model names onto the backend model tiers
// Tier models come from the KeyProfile of the client key in the current request

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::{mask_api_key, Settings, StreamingMode};
use crate::proxy::context;

/// Prefixes of backend-native model ids that are forwarded untouched.
/// OpenAI, then ARK endpoints, Doubao and DeepSeek.
static PASSTHROUGH_PREFIXES: &[&str] = &["gpt-", "o1-", "ep-", "doubao-", "deepseek-"];

/// Tier patterns in match precedence order.
static TIER_PATTERNS: Lazy<Vec<(Regex, ModelTier)>> = Lazy::new(|| {
    [
        ("haiku", ModelTier::Small),
        ("sonnet", ModelTier::Middle),
        ("opus", ModelTier::Big),
    ]
    .into_iter()
    .map(|(pattern, tier)| (Regex::new(&format!("(?i){}", pattern)).unwrap(), tier))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Middle,
    Big,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => f.write_str("SMALL"),
            Self::Middle => f.write_str("MIDDLE"),
            Self::Big => f.write_str("BIG"),
        }
    }
}

/// Outcome of mapping one requested model name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelResolution {
    pub requested: String,
    pub model: String,
    /// None when the requested name was passed through unchanged
    pub tier: Option<ModelTier>,
    /// Set when no tier pattern matched and the big tier was used
    pub defaulted: bool,
    pub ignore_temperature: bool,
    pub streaming_mode: StreamingMode,
}

impl ModelResolution {
    fn tier_label(&self) -> String {
        match (self.tier, self.defaulted) {
            (None, _) => "PASSTHROUGH".to_string(),
            (Some(tier), false) => tier.to_string(),
            (Some(tier), true) => format!("{}(default)", tier),
        }
    }
}

/// Whether a model name already is a backend model id.
pub fn is_passthrough_model(model: &str) -> bool {
    PASSTHROUGH_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Tier for a Claude-style model name; None when no pattern matches.
pub fn match_tier(model: &str) -> Option<ModelTier> {
    TIER_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(model))
        .map(|(_, tier)| *tier)
}

/// Resolves requested model names against the shared settings.
#[derive(Debug, Clone)]
pub struct ModelManager {
    settings: Arc<Settings>,
}

impl ModelManager {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Map a Claude model name using the client key of the current request.
    pub fn map_model(&self, requested: &str) -> String {
        let api_key = context::current_api_key();
        self.map_model_for_key(requested, api_key.as_deref())
    }

    /// Map a Claude model name for an explicitly supplied client key.
    pub fn map_model_for_key(&self, requested: &str, api_key: Option<&str>) -> String {
        self.resolve(requested, api_key).model
    }

    /// Full resolution for the client key of the current request.
    pub fn resolve_current(&self, requested: &str) -> ModelResolution {
        let api_key = context::current_api_key();
        self.resolve(requested, api_key.as_deref())
    }

    /// Resolve the backend model, its tier and per-key request adjustments.
    pub fn resolve(&self, requested: &str, api_key: Option<&str>) -> ModelResolution {
        let profile = self.settings.get_models_for_api_key(api_key);

        let (model, tier, defaulted) = if is_passthrough_model(requested) {
            (requested.to_string(), None, false)
        } else {
            match match_tier(requested) {
                Some(ModelTier::Small) => (profile.small_model, Some(ModelTier::Small), false),
                Some(ModelTier::Middle) => (profile.middle_model, Some(ModelTier::Middle), false),
                Some(ModelTier::Big) => (profile.big_model, Some(ModelTier::Big), false),
                None => (profile.big_model, Some(ModelTier::Big), true),
            }
        };

        let resolution = ModelResolution {
            requested: requested.to_string(),
            streaming_mode: self.settings.get_streaming_mode_for_model(&model),
            model,
            tier,
            defaulted,
            ignore_temperature: profile.ignore_temperature,
        };

        if resolution.tier.is_some() {
            tracing::info!(
                "Model mapping: {} -> {} (type: {}, API: {})",
                resolution.requested,
                resolution.model,
                resolution.tier_label(),
                mask_api_key(api_key)
            );
        } else {
            tracing::debug!(
                "Model mapping: {} (type: {}, API: {})",
                resolution.requested,
                resolution.tier_label(),
                mask_api_key(api_key)
            );
        }

        resolution
    }
}
