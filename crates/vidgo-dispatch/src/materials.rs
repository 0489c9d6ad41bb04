//! Material lookup seam over the pre-generated demo example pool.
//!
//! Materials are produced by the external seeding pipeline; this side only
//! reads them. Lookups are pure and idempotent and may observe data that is
//! stale relative to the seeder.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use vidgo_models::{MaterialExample, ToolType};

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Failed to read material seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse material seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Material backend error: {0}")]
    Backend(String),
}

/// Read-only access to pre-generated demo examples.
#[async_trait]
pub trait MaterialLookup: Send + Sync {
    /// Find a material matching (tool, topic, params). Pure read.
    async fn find(
        &self,
        tool_type: ToolType,
        topic: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<Option<MaterialExample>, MaterialError>;

    /// All materials available for a tool (demo preset listing).
    async fn list_for_tool(
        &self,
        tool_type: ToolType,
    ) -> Result<Vec<MaterialExample>, MaterialError>;
}

/// In-memory material store seeded from a JSON array.
#[derive(Default)]
pub struct MemoryMaterialStore {
    materials: Vec<MaterialExample>,
}

impl MemoryMaterialStore {
    pub fn new(materials: Vec<MaterialExample>) -> Self {
        Self { materials }
    }

    /// Load from a JSON file produced by the seeding pipeline.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MaterialError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MaterialError> {
        let materials: Vec<MaterialExample> = serde_json::from_str(raw)?;
        Ok(Self { materials })
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[async_trait]
impl MaterialLookup for MemoryMaterialStore {
    async fn find(
        &self,
        tool_type: ToolType,
        topic: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<Option<MaterialExample>, MaterialError> {
        Ok(self
            .materials
            .iter()
            .find(|m| m.matches(tool_type, topic, params))
            .cloned())
    }

    async fn list_for_tool(
        &self,
        tool_type: ToolType,
    ) -> Result<Vec<MaterialExample>, MaterialError> {
        Ok(self
            .materials
            .iter()
            .filter(|m| m.tool_type == tool_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEED: &str = r#"[
        {
            "tool_type": "effect",
            "topic": "anime",
            "result_url": "https://cdn.vidgo.app/m/effect/anime.mp4",
            "watermarked_url": "https://cdn.vidgo.app/m/effect/anime_wm.mp4"
        },
        {
            "tool_type": "room_redesign",
            "topic": "scandinavian",
            "input_params": { "room_type": "living_room" },
            "result_url": "https://cdn.vidgo.app/m/room/scandi.png",
            "watermarked_url": "https://cdn.vidgo.app/m/room/scandi_wm.png"
        }
    ]"#;

    #[tokio::test]
    async fn test_seed_parse_and_find() {
        let store = MemoryMaterialStore::from_json_str(SEED).unwrap();
        assert_eq!(store.len(), 2);

        let found = store
            .find(ToolType::Effect, "anime", &HashMap::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.watermarked_url, "https://cdn.vidgo.app/m/effect/anime_wm.mp4");
    }

    #[tokio::test]
    async fn test_find_is_idempotent() {
        let store = MemoryMaterialStore::from_json_str(SEED).unwrap();
        let params = HashMap::new();
        let first = store
            .find(ToolType::Effect, "anime", &params)
            .await
            .unwrap()
            .unwrap();
        let second = store
            .find(ToolType::Effect, "anime", &params)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.watermarked_url, second.watermarked_url);
        assert_eq!(first.result_url, second.result_url);
    }

    #[tokio::test]
    async fn test_pinned_param_filters() {
        let store = MemoryMaterialStore::from_json_str(SEED).unwrap();
        let mut params = HashMap::new();
        params.insert("room_type".to_string(), json!("bedroom"));
        let found = store
            .find(ToolType::RoomRedesign, "scandinavian", &params)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_for_tool() {
        let store = MemoryMaterialStore::from_json_str(SEED).unwrap();
        let effects = store.list_for_tool(ToolType::Effect).await.unwrap();
        assert_eq!(effects.len(), 1);
        let avatars = store.list_for_tool(ToolType::Avatar).await.unwrap();
        assert!(avatars.is_empty());
    }
}
