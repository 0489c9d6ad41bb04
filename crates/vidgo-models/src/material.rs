//! Pre-generated demo material data model.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tool::ToolType;

/// A pre-generated example served to demo-mode users.
///
/// Owned by the external seeding pipeline; read-only from the dispatcher's
/// perspective.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MaterialExample {
    /// Tool this example was generated for.
    pub tool_type: ToolType,

    /// Topic key the example matches (lowercase).
    pub topic: String,

    /// Inputs the seeding pipeline used to produce the example.
    #[serde(default)]
    pub input_params: HashMap<String, serde_json::Value>,

    /// Clean result URL (subscriber-grade, not served in demo mode).
    pub result_url: String,

    /// Watermarked result URL served to demo users.
    pub watermarked_url: String,
}

impl MaterialExample {
    /// Whether this material satisfies a lookup.
    ///
    /// Tool and topic must match exactly (topic case-insensitive); any string
    /// params the material pins (e.g. a specific style_id) must also match
    /// the request.
    pub fn matches(
        &self,
        tool_type: ToolType,
        topic: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> bool {
        if self.tool_type != tool_type || !self.topic.eq_ignore_ascii_case(topic) {
            return false;
        }
        self.input_params.iter().all(|(key, pinned)| {
            match (pinned.as_str(), params.get(key).and_then(|v| v.as_str())) {
                (Some(want), Some(got)) => want.eq_ignore_ascii_case(got),
                // Non-string pins are descriptive only, and requests may omit keys
                _ => true,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn material(pins: &[(&str, &str)]) -> MaterialExample {
        MaterialExample {
            tool_type: ToolType::Effect,
            topic: "anime".to_string(),
            input_params: pins
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect(),
            result_url: "https://cdn.vidgo.app/materials/effect/anime.mp4".to_string(),
            watermarked_url: "https://cdn.vidgo.app/materials/effect/anime_wm.mp4".to_string(),
        }
    }

    #[test]
    fn test_matches_tool_and_topic() {
        let m = material(&[]);
        assert!(m.matches(ToolType::Effect, "ANIME", &HashMap::new()));
        assert!(!m.matches(ToolType::Effect, "cyberpunk", &HashMap::new()));
        assert!(!m.matches(ToolType::Avatar, "anime", &HashMap::new()));
    }

    #[test]
    fn test_pinned_param_must_match_when_present() {
        let m = material(&[("style_id", "anime_v2")]);
        let mut params = HashMap::new();
        params.insert("style_id".to_string(), json!("anime_v2"));
        assert!(m.matches(ToolType::Effect, "anime", &params));

        params.insert("style_id".to_string(), json!("anime_v1"));
        assert!(!m.matches(ToolType::Effect, "anime", &params));
    }

    #[test]
    fn test_missing_request_param_is_not_a_mismatch() {
        let m = material(&[("style_id", "anime_v2")]);
        assert!(m.matches(ToolType::Effect, "anime", &HashMap::new()));
    }
}
