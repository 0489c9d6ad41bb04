//! Tool-to-pipeline planning.
//!
//! Every tool maps to a fixed, ordered list of capability steps. Most tools
//! are a single step; product scene chains background removal, scene
//! generation, and a composite pass. Step timeouts bound one provider attempt,
//! including vendor-side polling.

use std::time::Duration;

use vidgo_models::{Capability, ToolType};

/// One step of a tool pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineStep {
    /// Step name used in attempt records and `PipelineStepFailed` details.
    pub name: &'static str,

    /// Capability routed through the provider registry.
    pub capability: Capability,

    /// Per-attempt timeout; a timeout counts as a provider failure.
    pub timeout: Duration,

    /// Param key the step's primary result URL is stored under for
    /// subsequent steps. `None` for terminal steps.
    pub output_key: Option<&'static str>,

    /// Request-param renames applied before invoking this step's providers,
    /// as (source key, provider key) pairs.
    pub aliases: &'static [(&'static str, &'static str)],
}

impl PipelineStep {
    const fn new(name: &'static str, capability: Capability, timeout_secs: u64) -> Self {
        Self {
            name,
            capability,
            timeout: Duration::from_secs(timeout_secs),
            output_key: None,
            aliases: &[],
        }
    }

    const fn with_output_key(mut self, key: &'static str) -> Self {
        self.output_key = Some(key);
        self
    }

    const fn with_aliases(mut self, aliases: &'static [(&'static str, &'static str)]) -> Self {
        self.aliases = aliases;
        self
    }
}

/// The moderation pre-step for tools that accept user-supplied imagery.
///
/// Not part of [`plan_for`] output; the dispatcher prepends it when
/// moderation is enabled.
pub fn moderation_step() -> PipelineStep {
    PipelineStep::new("moderation", Capability::Moderation, 30)
}

/// The fixed pipeline for a tool, in execution order.
///
/// Timeouts scale with the vendor work involved; avatar lipsync polling can
/// legitimately run minutes.
pub fn plan_for(tool_type: ToolType) -> Vec<PipelineStep> {
    match tool_type {
        ToolType::BackgroundRemoval => vec![PipelineStep::new(
            "background_removal",
            Capability::BackgroundRemoval,
            60,
        )],
        ToolType::ProductScene => vec![
            // Cut the product out, then paint a scene, then composite the
            // cutout over it.
            PipelineStep::new("background_removal", Capability::BackgroundRemoval, 60)
                .with_output_key("overlay_url"),
            PipelineStep::new("scene_generation", Capability::TextToImage, 120)
                .with_output_key("image_url"),
            PipelineStep::new("composite", Capability::StyleTransfer, 120),
        ],
        ToolType::TryOn => vec![PipelineStep::new("try_on", Capability::StyleTransfer, 120)
            .with_aliases(&[("garment_url", "overlay_url")])],
        ToolType::RoomRedesign => {
            vec![PipelineStep::new("room_redesign", Capability::Interior, 120)]
        }
        ToolType::ShortVideo => {
            vec![PipelineStep::new("short_video", Capability::TextToVideo, 180)]
        }
        ToolType::Avatar => vec![PipelineStep::new("avatar", Capability::Avatar, 300)],
        ToolType::PhotoToVideo => vec![PipelineStep::new(
            "photo_to_video",
            Capability::ImageToVideo,
            180,
        )],
        ToolType::Effect => vec![PipelineStep::new("effect", Capability::VideoToVideo, 180)],
    }
}
