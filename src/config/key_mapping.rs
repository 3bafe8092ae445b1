// Per-client-key model profiles
// Parses the API_KEY_MODEL_MAPPING_<ID>_* variable family into a typed map

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::mask_api_key;

const MAPPING_PREFIX: &str = "API_KEY_MODEL_MAPPING_";
const API_KEY_SUFFIX: &str = "_API_KEY";

/// Backend models and temperature handling for one client key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyProfile {
    pub big_model: String,
    pub middle_model: String,
    pub small_model: String,
    pub ignore_temperature: bool,
}

/// Model names a profile falls back to when its own variables are absent.
#[derive(Debug, Clone, Copy)]
pub struct ProfileDefaults<'a> {
    pub big_model: &'a str,
    pub small_model: &'a str,
}

/// `"true"` and `"1"` (any case) are truthy, everything else is not.
pub fn parse_flag(value: Option<&str>) -> bool {
    value
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

/// Build the client key -> profile map from the captured environment.
///
/// Every `API_KEY_MODEL_MAPPING_<ID>_API_KEY` registers a profile under its
/// value. Sibling `_BIG`, `_MIDDLE`, `_SMALL` and `_IGNORE_TEMPERATURE`
/// variables with the same `<ID>` fill in the profile. Entries with an empty
/// id or an empty key are skipped with a warning.
pub fn load_key_profiles(
    vars: &BTreeMap<String, String>,
    defaults: ProfileDefaults<'_>,
) -> HashMap<String, KeyProfile> {
    let mut mapping: HashMap<String, KeyProfile> = HashMap::new();
    let mut owners: HashMap<String, String> = HashMap::new();

    for (name, value) in vars {
        let Some(key_id) = name
            .strip_prefix(MAPPING_PREFIX)
            .and_then(|rest| rest.strip_suffix(API_KEY_SUFFIX))
        else {
            continue;
        };

        if key_id.is_empty() {
            tracing::warn!("Ignoring {}: missing key id between prefix and suffix", name);
            continue;
        }

        let api_key = value.trim();
        if api_key.is_empty() {
            tracing::warn!("Ignoring key mapping '{}': {} is empty", key_id, name);
            continue;
        }

        let sibling = |field: &str| {
            vars.get(&format!("{}{}_{}", MAPPING_PREFIX, key_id, field))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let big_model = sibling("BIG").unwrap_or(defaults.big_model).to_string();
        let middle_model = sibling("MIDDLE")
            .map(str::to_string)
            .unwrap_or_else(|| big_model.clone());
        let small_model = sibling("SMALL").unwrap_or(defaults.small_model).to_string();
        let ignore_temperature = parse_flag(sibling("IGNORE_TEMPERATURE"));

        let profile = KeyProfile {
            big_model,
            middle_model,
            small_model,
            ignore_temperature,
        };

        tracing::debug!(
            "Key mapping '{}' ({}): big={}, middle={}, small={}, ignore_temperature={}",
            key_id,
            mask_api_key(Some(api_key)),
            profile.big_model,
            profile.middle_model,
            profile.small_model,
            profile.ignore_temperature
        );

        if let Some(previous) = owners.insert(api_key.to_string(), key_id.to_string()) {
            tracing::warn!(
                "Key mappings '{}' and '{}' register the same API key, using '{}'",
                previous,
                key_id,
                key_id
            );
        }
        mapping.insert(api_key.to_string(), profile);
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: ProfileDefaults<'static> = ProfileDefaults {
        big_model: "gpt-4o",
        small_model: "gpt-4o-mini",
    };

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some("TRUE")));
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some(" True ")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(Some("yes")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_profile_uses_sibling_variables() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING_BASIC_API_KEY", "basic-user-key"),
            ("API_KEY_MODEL_MAPPING_BASIC_BIG", "gpt-3.5-turbo"),
            ("API_KEY_MODEL_MAPPING_BASIC_MIDDLE", "gpt-3.5-turbo"),
            ("API_KEY_MODEL_MAPPING_BASIC_SMALL", "gpt-3.5-turbo"),
            ("API_KEY_MODEL_MAPPING_BASIC_IGNORE_TEMPERATURE", "true"),
        ]);

        let mapping = load_key_profiles(&env, DEFAULTS);
        let profile = &mapping["basic-user-key"];
        assert_eq!(profile.big_model, "gpt-3.5-turbo");
        assert_eq!(profile.middle_model, "gpt-3.5-turbo");
        assert_eq!(profile.small_model, "gpt-3.5-turbo");
        assert!(profile.ignore_temperature);
    }

    #[test]
    fn test_profile_fallbacks() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING_TEAM_API_KEY", "team-key"),
            ("API_KEY_MODEL_MAPPING_TEAM_BIG", "o3"),
        ]);

        let mapping = load_key_profiles(&env, DEFAULTS);
        let profile = &mapping["team-key"];
        assert_eq!(profile.big_model, "o3");
        // middle follows the profile's own big model
        assert_eq!(profile.middle_model, "o3");
        assert_eq!(profile.small_model, "gpt-4o-mini");
        assert!(!profile.ignore_temperature);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING_TEAM_API_KEY", "team-key"),
            ("API_KEY_MODEL_MAPPING_TEAM_BIG", ""),
            ("API_KEY_MODEL_MAPPING_TEAM_SMALL", "  "),
        ]);

        let mapping = load_key_profiles(&env, DEFAULTS);
        let profile = &mapping["team-key"];
        assert_eq!(profile.big_model, "gpt-4o");
        assert_eq!(profile.middle_model, "gpt-4o");
        assert_eq!(profile.small_model, "gpt-4o-mini");
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING__API_KEY", "no-id-key"),
            ("API_KEY_MODEL_MAPPING_EMPTY_API_KEY", ""),
            ("API_KEY_MODEL_MAPPING_ORPHAN_BIG", "gpt-4o"),
        ]);

        assert!(load_key_profiles(&env, DEFAULTS).is_empty());
    }

    #[test]
    fn test_key_id_containing_api_key_fragment() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING_MY_API_KEY_API_KEY", "nested-key"),
            ("API_KEY_MODEL_MAPPING_MY_API_KEY_SMALL", "gpt-4.1-nano"),
        ]);

        let mapping = load_key_profiles(&env, DEFAULTS);
        assert_eq!(mapping["nested-key"].small_model, "gpt-4.1-nano");
    }

    #[test]
    fn test_duplicate_key_last_id_wins() {
        let env = vars(&[
            ("API_KEY_MODEL_MAPPING_A_API_KEY", "shared"),
            ("API_KEY_MODEL_MAPPING_A_BIG", "model-a"),
            ("API_KEY_MODEL_MAPPING_B_API_KEY", "shared"),
            ("API_KEY_MODEL_MAPPING_B_BIG", "model-b"),
        ]);

        let mapping = load_key_profiles(&env, DEFAULTS);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["shared"].big_model, "model-b");
    }
}
