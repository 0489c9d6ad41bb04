//! Generation tool definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The eight end-user generation tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// Remove the background from a product or portrait photo
    BackgroundRemoval,
    /// Cut out a product and place it into a generated scene
    ProductScene,
    /// Virtual garment try-on
    TryOn,
    /// Redesign a room photo in a selected interior style
    RoomRedesign,
    /// Short video clip from a text prompt
    ShortVideo,
    /// Talking avatar with lipsync
    Avatar,
    /// Animate a still photo into a short clip
    PhotoToVideo,
    /// Stylized effect applied to a photo or clip
    Effect,
}

impl ToolType {
    /// All tools, in display order.
    pub const ALL: &'static [ToolType] = &[
        ToolType::BackgroundRemoval,
        ToolType::ProductScene,
        ToolType::TryOn,
        ToolType::RoomRedesign,
        ToolType::ShortVideo,
        ToolType::Avatar,
        ToolType::PhotoToVideo,
        ToolType::Effect,
    ];

    /// Returns the tool name as used in URLs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::BackgroundRemoval => "background_removal",
            ToolType::ProductScene => "product_scene",
            ToolType::TryOn => "try_on",
            ToolType::RoomRedesign => "room_redesign",
            ToolType::ShortVideo => "short_video",
            ToolType::Avatar => "avatar",
            ToolType::PhotoToVideo => "photo_to_video",
            ToolType::Effect => "effect",
        }
    }

    /// Credit cost of one invocation of this tool.
    pub fn credit_cost(&self) -> u32 {
        match self {
            ToolType::BackgroundRemoval => 2,
            ToolType::Effect => 8,
            ToolType::ProductScene => 10,
            ToolType::PhotoToVideo => 12,
            ToolType::TryOn => 15,
            ToolType::RoomRedesign => 20,
            ToolType::ShortVideo => 25,
            ToolType::Avatar => 30,
        }
    }

    /// Whether the tool's primary output is a video rather than an image.
    pub fn produces_video(&self) -> bool {
        matches!(
            self,
            ToolType::ShortVideo | ToolType::Avatar | ToolType::PhotoToVideo | ToolType::Effect
        )
    }

    /// Whether user-supplied imagery for this tool passes moderation first.
    pub fn requires_moderation(&self) -> bool {
        matches!(self, ToolType::TryOn | ToolType::Avatar)
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ToolType {
    type Err = ToolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both snake_case and URL-style kebab-case
        match s.to_lowercase().replace('-', "_").as_str() {
            "background_removal" => Ok(ToolType::BackgroundRemoval),
            "product_scene" => Ok(ToolType::ProductScene),
            "try_on" => Ok(ToolType::TryOn),
            "room_redesign" => Ok(ToolType::RoomRedesign),
            "short_video" => Ok(ToolType::ShortVideo),
            "avatar" => Ok(ToolType::Avatar),
            "photo_to_video" => Ok(ToolType::PhotoToVideo),
            "effect" => Ok(ToolType::Effect),
            _ => Err(ToolParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown tool: {0}")]
pub struct ToolParseError(String);
