//! Provider capability definitions.
//!
//! A capability is a category of generation work (e.g. image-to-video) that
//! the provider registry routes to one or more vendor clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of work a provider can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Text-to-image
    TextToImage,
    /// Image-to-video
    ImageToVideo,
    /// Text-to-video
    TextToVideo,
    /// Video-to-video restyling
    VideoToVideo,
    /// Interior redesign
    Interior,
    /// Talking avatar / lipsync
    Avatar,
    /// Background removal / matting
    BackgroundRemoval,
    /// Style transfer and compositing
    StyleTransfer,
    /// Input content moderation
    Moderation,
}

impl Capability {
    /// Short wire name, matching vendor terminology.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TextToImage => "t2i",
            Capability::ImageToVideo => "i2v",
            Capability::TextToVideo => "t2v",
            Capability::VideoToVideo => "v2v",
            Capability::Interior => "interior",
            Capability::Avatar => "avatar",
            Capability::BackgroundRemoval => "background_removal",
            Capability::StyleTransfer => "style_transfer",
            Capability::Moderation => "moderation",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(Capability::TextToImage.as_str(), "t2i");
        assert_eq!(Capability::ImageToVideo.as_str(), "i2v");
        assert_eq!(Capability::Moderation.to_string(), "moderation");
    }
}
