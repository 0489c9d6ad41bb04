//! Provider routing registry.
//!
//! A static, side-effect-free mapping from capability to an ordered provider
//! list (primary first), plus last-known provider health updated from attempt
//! outcomes. The registry is an explicit value handed to the dispatcher at
//! construction time, so tests substitute fake provider lists freely.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use vidgo_models::{Capability, ToolType};

use crate::client::ProviderClient;

/// Last-known health of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub up: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Capability → ordered provider list, plus per-provider health.
pub struct ProviderRegistry {
    routes: HashMap<Capability, Vec<Arc<dyn ProviderClient>>>,
    health: RwLock<HashMap<String, ProviderStatus>>,
}

impl ProviderRegistry {
    /// Build a registry from explicit routes. Order within each list is the
    /// failover order: primary first, then backups.
    pub fn new(routes: Vec<(Capability, Vec<Arc<dyn ProviderClient>>)>) -> Self {
        let routes: HashMap<_, _> = routes.into_iter().collect();

        // Seed health as up for every routed provider
        let now = Utc::now();
        let mut health = HashMap::new();
        for providers in routes.values() {
            for provider in providers {
                health
                    .entry(provider.name().to_string())
                    .or_insert_with(|| ProviderStatus {
                        name: provider.name().to_string(),
                        up: true,
                        last_checked: now,
                        last_error: None,
                    });
            }
        }

        Self {
            routes,
            health: RwLock::new(health),
        }
    }

    /// Production routing table.
    ///
    /// Avatar, background removal, style transfer, and moderation are
    /// single-provider capabilities with no failover.
    pub fn with_default_routes(
        piapi: Arc<dyn ProviderClient>,
        pollo: Arc<dyn ProviderClient>,
        a2e: Arc<dyn ProviderClient>,
        goenhance: Arc<dyn ProviderClient>,
        gemini: Arc<dyn ProviderClient>,
    ) -> Self {
        Self::new(vec![
            (
                Capability::TextToImage,
                vec![Arc::clone(&piapi), Arc::clone(&goenhance)],
            ),
            (
                Capability::ImageToVideo,
                vec![Arc::clone(&piapi), Arc::clone(&pollo)],
            ),
            (
                Capability::TextToVideo,
                vec![Arc::clone(&pollo), Arc::clone(&piapi)],
            ),
            (Capability::VideoToVideo, vec![Arc::clone(&goenhance)]),
            (
                Capability::Interior,
                vec![Arc::clone(&piapi), Arc::clone(&goenhance)],
            ),
            (Capability::Avatar, vec![a2e]),
            (Capability::BackgroundRemoval, vec![piapi]),
            (Capability::StyleTransfer, vec![goenhance]),
            (Capability::Moderation, vec![gemini]),
        ])
    }

    /// Ordered provider list for a capability. Empty when unrouted.
    pub fn providers_for(&self, capability: Capability) -> &[Arc<dyn ProviderClient>] {
        self.routes
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Credit cost of one invocation of a tool.
    pub fn cost_of(&self, tool_type: ToolType) -> u32 {
        tool_type.credit_cost()
    }

    /// Record a successful attempt for health reporting.
    pub fn mark_up(&self, provider_name: &str) {
        let mut health = self.health.write().expect("health lock poisoned");
        health.insert(
            provider_name.to_string(),
            ProviderStatus {
                name: provider_name.to_string(),
                up: true,
                last_checked: Utc::now(),
                last_error: None,
            },
        );
    }

    /// Record a failed attempt for health reporting.
    pub fn mark_down(&self, provider_name: &str, error: impl Into<String>) {
        let mut health = self.health.write().expect("health lock poisoned");
        health.insert(
            provider_name.to_string(),
            ProviderStatus {
                name: provider_name.to_string(),
                up: false,
                last_checked: Utc::now(),
                last_error: Some(error.into()),
            },
        );
    }

    /// Snapshot of last-known provider health, sorted by name.
    pub fn health_snapshot(&self) -> Vec<ProviderStatus> {
        let health = self.health.read().expect("health lock poisoned");
        let mut statuses: Vec<_> = health.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}
