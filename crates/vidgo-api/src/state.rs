//! Application state.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use vidgo_dispatch::{
    CreditLedger, Dispatcher, DispatcherConfig, GenerationStore, LedgerError, MaterialLookup,
    MemoryGenerationStore, MemoryLedger, MemoryMaterialStore,
};
use vidgo_models::{CreditBalance, MaterialExample, PlanTier, ToolType};
use vidgo_providers::{
    A2eClient, GeminiClient, GoEnhanceClient, PiApiClient, PolloClient, ProviderClient,
    ProviderRegistry,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<ProviderRegistry>,
    pub ledger: Arc<dyn CreditLedger>,
    pub materials: Arc<dyn MaterialLookup>,
    pub records: Arc<dyn GenerationStore>,
    pub dispatcher: Arc<Dispatcher>,
    // Concrete handle for account provisioning; same instance as `ledger`
    accounts: Arc<MemoryLedger>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let p = &config.providers;
        let piapi = client_arc(match &p.piapi_base_url {
            Some(url) => PiApiClient::with_base_url(&p.piapi_key, url),
            None => PiApiClient::new(&p.piapi_key),
        });
        let pollo = client_arc(match &p.pollo_base_url {
            Some(url) => PolloClient::with_base_url(&p.pollo_key, url),
            None => PolloClient::new(&p.pollo_key),
        });
        let a2e = client_arc(match &p.a2e_base_url {
            Some(url) => A2eClient::with_base_url(&p.a2e_key, url),
            None => A2eClient::new(&p.a2e_key),
        });
        let goenhance = client_arc(match &p.goenhance_base_url {
            Some(url) => GoEnhanceClient::with_base_url(&p.goenhance_key, url),
            None => GoEnhanceClient::new(&p.goenhance_key),
        });
        let gemini = client_arc(match &p.gemini_base_url {
            Some(url) => GeminiClient::with_base_url(&p.gemini_key, url),
            None => GeminiClient::new(&p.gemini_key),
        });

        let registry = Arc::new(ProviderRegistry::with_default_routes(
            piapi, pollo, a2e, goenhance, gemini,
        ));

        let materials = match &config.materials_path {
            Some(path) => {
                let store = MemoryMaterialStore::from_json_file(path)?;
                info!(path = %path, count = store.len(), "Loaded material seed file");
                store
            }
            None => {
                warn!("MATERIALS_PATH not set, using the built-in material set");
                MemoryMaterialStore::new(default_materials())
            }
        };

        let accounts = Arc::new(MemoryLedger::new());
        let ledger: Arc<dyn CreditLedger> = Arc::clone(&accounts) as Arc<dyn CreditLedger>;
        let materials: Arc<dyn MaterialLookup> = Arc::new(materials);
        let records: Arc<dyn GenerationStore> = Arc::new(MemoryGenerationStore::new());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&materials),
            Arc::clone(&records),
            DispatcherConfig {
                moderation_enabled: config.moderation_enabled,
            },
        ));

        Ok(Self {
            config,
            registry,
            ledger,
            materials,
            records,
            dispatcher,
            accounts,
        })
    }

    /// Provision a ledger account on first sight of a subscriber.
    ///
    /// Billing owns real account lifecycle; the in-memory ledger grants the
    /// plan's monthly credits the first time a user shows up.
    pub async fn ensure_account(&self, user_id: &str, plan: PlanTier) {
        if let Err(LedgerError::UnknownUser(_)) = self.ledger.balance(user_id).await {
            info!(user_id = %user_id, plan = %plan, "Provisioning credit account");
            self.accounts
                .seed_user(CreditBalance::subscription(user_id, plan.monthly_credits()))
                .await;
        }
    }
}

fn client_arc<C: ProviderClient + 'static>(client: C) -> Arc<dyn ProviderClient> {
    Arc::new(client)
}

/// Built-in materials so demo mode works out of the box.
fn default_materials() -> Vec<MaterialExample> {
    let cdn = "https://cdn.vidgo.app/materials";
    let entries: &[(ToolType, &str, &str)] = &[
        (ToolType::Effect, "anime", "effect/anime.mp4"),
        (ToolType::Effect, "cyberpunk", "effect/cyberpunk.mp4"),
        (ToolType::RoomRedesign, "scandinavian", "room/scandinavian.png"),
        (ToolType::RoomRedesign, "industrial", "room/industrial.png"),
        (ToolType::ShortVideo, "product_showcase", "video/product_showcase.mp4"),
        (ToolType::ProductScene, "studio_light", "scene/studio_light.png"),
    ];

    entries
        .iter()
        .map(|(tool_type, topic, path)| MaterialExample {
            tool_type: *tool_type,
            topic: (*topic).to_string(),
            input_params: [("topic".to_string(), json!(topic))].into_iter().collect(),
            result_url: format!("{cdn}/{path}"),
            watermarked_url: format!("{cdn}/{}", path.replace('.', "_wm.")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_default_materials_are_findable() {
        let store = MemoryMaterialStore::new(default_materials());
        let found = store
            .find(ToolType::Effect, "anime", &HashMap::new())
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(found.unwrap().watermarked_url.contains("_wm"));
    }

    #[test]
    fn test_state_builds_from_default_config() {
        let state = AppState::new(ApiConfig::default()).unwrap();
        // The default routing table covers every tool's pipeline
        assert!(!state.registry.health_snapshot().is_empty());
    }
}
