// Streaming mode settings
// Default mode plus per-model overrides from MODEL_STREAMING_MODES and STREAMING_MODE_*

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

const MODEL_STREAMING_MODES_VAR: &str = "MODEL_STREAMING_MODES";
const STREAMING_MODE_PREFIX: &str = "STREAMING_MODE_";

/// How responses for a model are delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Forward upstream chunks as they arrive
    Stream,
    /// Collect the full upstream response before replying
    Buffered,
}

impl Default for StreamingMode {
    fn default() -> Self {
        Self::Stream
    }
}

impl StreamingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid streaming mode '{0}', expected 'stream' or 'buffered'")]
pub struct InvalidStreamingMode(pub String);

impl FromStr for StreamingMode {
    type Err = InvalidStreamingMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" => Ok(Self::Stream),
            "buffered" => Ok(Self::Buffered),
            _ => Err(InvalidStreamingMode(s.to_string())),
        }
    }
}

/// Parse DEFAULT_STREAMING_MODE, falling back to `stream` on bad input.
pub fn parse_default_mode(raw: Option<&str>) -> StreamingMode {
    let Some(raw) = raw else {
        return StreamingMode::default();
    };

    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(
            "DEFAULT_STREAMING_MODE='{}' is invalid. Falling back to 'stream'.",
            raw.trim()
        );
        StreamingMode::default()
    })
}

/// Turn the remainder of a STREAMING_MODE_* variable into a model name.
///
/// `__` becomes `/`, remaining `_` become `-`, and the result is lowercased,
/// so `STREAMING_MODE_OPENAI__GPT_4O` names `openai/gpt-4o`.
pub fn env_token_to_model_name(token: &str) -> String {
    token.trim().replace("__", "/").replace('_', "-").to_lowercase()
}

/// Collect per-model overrides, keyed by lowercased model name.
///
/// JSON entries are read first; STREAMING_MODE_* variables are applied on top.
/// Invalid entries are logged and skipped.
pub fn load_model_streaming_modes(
    vars: &BTreeMap<String, String>,
    default_mode: StreamingMode,
) -> HashMap<String, StreamingMode> {
    let mut overrides = HashMap::new();

    if let Some(raw) = vars.get(MODEL_STREAMING_MODES_VAR).filter(|v| !v.trim().is_empty()) {
        load_json_overrides(raw, &mut overrides);
    }

    for (name, value) in vars {
        let Some(token) = name.strip_prefix(STREAMING_MODE_PREFIX) else {
            continue;
        };

        let model_name = env_token_to_model_name(token);
        if model_name.is_empty() {
            tracing::warn!("Ignoring {}: no model name after prefix", name);
            continue;
        }

        match value.parse::<StreamingMode>() {
            Ok(mode) => {
                overrides.insert(model_name, mode);
            }
            Err(_) => tracing::warn!(
                "Streaming mode override '{}' for env '{}' is invalid. Expected 'stream' or 'buffered'.",
                value,
                name
            ),
        }
    }

    if !overrides.is_empty() {
        let mut listed: Vec<String> = overrides
            .iter()
            .map(|(model, mode)| format!("{}={}", model, mode))
            .collect();
        listed.sort();
        tracing::info!(
            "Streaming mode overrides loaded (default='{}'): {}",
            default_mode,
            listed.join(", ")
        );
    }

    overrides
}

fn load_json_overrides(raw: &str, overrides: &mut HashMap<String, StreamingMode>) {
    let data: Value = match serde_json::from_str(raw) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to parse {} as JSON: {}", MODEL_STREAMING_MODES_VAR, e);
            return;
        }
    };

    let Some(entries) = data.as_object() else {
        tracing::warn!(
            "{} must be a JSON object mapping model names to modes.",
            MODEL_STREAMING_MODES_VAR
        );
        return;
    };

    for (model_name, mode) in entries {
        let raw_mode = match mode {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match raw_mode.parse::<StreamingMode>() {
            Ok(mode) => {
                overrides.insert(model_name.to_lowercase(), mode);
            }
            Err(_) => tracing::warn!(
                "Streaming mode '{}' for model '{}' is invalid. Expected 'stream' or 'buffered'.",
                raw_mode,
                model_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("stream".parse::<StreamingMode>(), Ok(StreamingMode::Stream));
        assert_eq!(" Buffered ".parse::<StreamingMode>(), Ok(StreamingMode::Buffered));
        assert!("chunked".parse::<StreamingMode>().is_err());
    }

    #[test]
    fn test_default_mode_fallback() {
        assert_eq!(parse_default_mode(None), StreamingMode::Stream);
        assert_eq!(parse_default_mode(Some("BUFFERED")), StreamingMode::Buffered);
        assert_eq!(parse_default_mode(Some("sometimes")), StreamingMode::Stream);
    }

    #[test]
    fn test_env_token_to_model_name() {
        assert_eq!(env_token_to_model_name("GPT_4O"), "gpt-4o");
        assert_eq!(env_token_to_model_name("OPENAI__GPT_4O_MINI"), "openai/gpt-4o-mini");
        assert_eq!(env_token_to_model_name("DEEPSEEK_V3"), "deepseek-v3");
    }

    #[test]
    fn test_json_and_env_overrides_merge() {
        let env = vars(&[
            (
                "MODEL_STREAMING_MODES",
                r#"{"GPT-4o": "buffered", "o3": "stream", "bad": "sometimes", "num": 1}"#,
            ),
            ("STREAMING_MODE_DOUBAO_PRO", "buffered"),
            ("STREAMING_MODE_O3", "Buffered"),
            ("STREAMING_MODE_BROKEN", "nope"),
        ]);

        let overrides = load_model_streaming_modes(&env, StreamingMode::Stream);
        assert_eq!(overrides.get("gpt-4o"), Some(&StreamingMode::Buffered));
        assert_eq!(overrides.get("doubao-pro"), Some(&StreamingMode::Buffered));
        // env overrides win over the JSON mapping
        assert_eq!(overrides.get("o3"), Some(&StreamingMode::Buffered));
        assert!(!overrides.contains_key("bad"));
        assert!(!overrides.contains_key("num"));
        assert!(!overrides.contains_key("broken"));
    }

    #[test]
    fn test_invalid_json_is_ignored() {
        let env = vars(&[("MODEL_STREAMING_MODES", "{not json")]);
        assert!(load_model_streaming_modes(&env, StreamingMode::Stream).is_empty());

        let env = vars(&[("MODEL_STREAMING_MODES", r#"["gpt-4o"]"#)]);
        assert!(load_model_streaming_modes(&env, StreamingMode::Stream).is_empty());
    }
}
