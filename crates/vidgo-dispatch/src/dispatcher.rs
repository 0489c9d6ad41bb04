//! The generation dispatcher.
//!
//! One `dispatch` call takes a tool request end to end: demo-vs-live routing,
//! credit reservation, the ordered provider failover walk per pipeline step,
//! and the commit-or-refund settle. Every path persists exactly one
//! [`GenerationRecord`] and performs at most one ledger reserve, settled
//! exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use vidgo_models::{
    GenerationFailure, GenerationRecord, GenerationRequest, PlanTier, ProviderAttempt,
};
use vidgo_providers::{ProviderOutput, ProviderRegistry};

use crate::error::{DispatchError, DispatchResult};
use crate::ledger::{CommitContext, CreditLedger, LedgerError};
use crate::materials::MaterialLookup;
use crate::pipeline::{moderation_step, plan_for, PipelineStep};
use crate::records::GenerationStore;

/// Dispatcher behavior switches.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Run the moderation pre-step for tools that accept user imagery.
    pub moderation_enabled: bool,
}

/// Outcome of one pipeline step: the provider output plus which provider in
/// the ordered list won.
struct StepWin {
    output: ProviderOutput,
    provider_index: usize,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<dyn CreditLedger>,
    materials: Arc<dyn MaterialLookup>,
    records: Arc<dyn GenerationStore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: Arc<dyn CreditLedger>,
        materials: Arc<dyn MaterialLookup>,
        records: Arc<dyn GenerationStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            materials,
            records,
            config,
        }
    }

    /// Dispatch one tool request to a terminal record.
    ///
    /// Business failures come back inside the record; an `Err` here means a
    /// backend store fault, not a failed generation.
    ///
    /// The work runs on a detached task: a caller that stops polling this
    /// future (client disconnect) does not abort the attempt, so the
    /// reservation is still settled exactly once and the record persisted.
    pub async fn dispatch(
        &self,
        request: GenerationRequest,
        plan: PlanTier,
    ) -> DispatchResult<GenerationRecord> {
        let this = self.clone();
        tokio::spawn(async move { this.dispatch_inner(request, plan).await })
            .await
            .map_err(|e| DispatchError::Task(e.to_string()))?
    }

    async fn dispatch_inner(
        &self,
        request: GenerationRequest,
        plan: PlanTier,
    ) -> DispatchResult<GenerationRecord> {
        let record = if request.user_id.is_none() || !plan.is_subscriber() {
            self.dispatch_demo(&request).await?
        } else {
            self.dispatch_live(&request).await?
        };

        self.records.insert(&record).await?;
        info!(
            record_id = %record.id,
            tool = %request.tool_type,
            status = ?record.status,
            demo = record.demo,
            credits = record.credits_used,
            "Dispatch finished"
        );
        Ok(record)
    }

    /// Demo mode: serve a pre-generated watermarked example. Never touches
    /// the ledger or any provider.
    async fn dispatch_demo(&self, request: &GenerationRequest) -> DispatchResult<GenerationRecord> {
        let Some(topic) = request.topic() else {
            debug!(tool = %request.tool_type, "Demo request without a topic");
            return Ok(GenerationRecord::failed(
                request,
                GenerationFailure::NoMaterialAvailable,
                true,
            ));
        };

        let material = self
            .materials
            .find(request.tool_type, &topic, &request.input_params)
            .await?;

        Ok(match material {
            Some(material) => GenerationRecord::completed(
                request,
                vec![material.watermarked_url],
                0,
                false,
                true,
            ),
            None => {
                debug!(tool = %request.tool_type, topic = %topic, "No material for demo request");
                GenerationRecord::failed(request, GenerationFailure::NoMaterialAvailable, true)
            }
        })
    }

    /// Live mode: reserve credits, walk the pipeline with failover, then
    /// commit on success or refund on any failure.
    async fn dispatch_live(&self, request: &GenerationRequest) -> DispatchResult<GenerationRecord> {
        let user_id = request
            .user_id
            .as_deref()
            .unwrap_or_default()
            .to_string();
        let cost = self.registry.cost_of(request.tool_type);

        let reservation = match self.ledger.reserve(&user_id, cost).await {
            Ok(reservation) => reservation,
            Err(LedgerError::InsufficientCredits {
                required,
                available,
            }) => {
                info!(user_id = %user_id, required, available, "Reservation declined");
                return Ok(GenerationRecord::failed(
                    request,
                    GenerationFailure::InsufficientCredits {
                        required,
                        available,
                    },
                    false,
                ));
            }
            Err(err) => return Err(err.into()),
        };

        // Accumulates request params plus upstream step outputs.
        let mut params = request.input_params.clone();
        let mut attempts: Vec<ProviderAttempt> = Vec::new();

        if self.config.moderation_enabled && request.tool_type.requires_moderation() {
            let step = moderation_step();
            if let Err(detail) = self.run_step(&step, &params, &mut attempts).await {
                self.ledger.refund(reservation).await?;
                return Ok(GenerationRecord::failed(
                    request,
                    GenerationFailure::PipelineStepFailed {
                        step: step.name.to_string(),
                        detail,
                    },
                    false,
                ));
            }
        }

        let plan = plan_for(request.tool_type);
        let single_step = plan.len() == 1;
        let mut used_backup = false;
        let mut final_output: Option<ProviderOutput> = None;

        for step in &plan {
            match self.run_step(step, &params, &mut attempts).await {
                Ok(win) => {
                    used_backup |= win.provider_index > 0;
                    match (step.output_key, win.output.primary_url()) {
                        (Some(key), Some(url)) => {
                            params.insert(key.to_string(), serde_json::Value::from(url));
                        }
                        _ => final_output = Some(win.output),
                    }
                }
                Err(detail) => {
                    // Any step failure aborts the pipeline; partial step
                    // outputs are dropped with the request params.
                    self.ledger.refund(reservation).await?;
                    let failure = if single_step {
                        GenerationFailure::AllProvidersFailed {
                            capability: step.capability,
                            detail,
                        }
                    } else {
                        GenerationFailure::PipelineStepFailed {
                            step: step.name.to_string(),
                            detail,
                        }
                    };
                    return Ok(GenerationRecord::failed(request, failure, false));
                }
            }
        }

        let result_urls = final_output.map(|o| o.result_urls).unwrap_or_default();
        let record = GenerationRecord::completed(request, result_urls, cost, used_backup, false);

        self.ledger
            .commit(
                reservation,
                CommitContext {
                    tool_type: request.tool_type,
                    description: format!("{} generation", request.tool_type),
                    generation_id: Some(record.id.clone()),
                },
            )
            .await?;

        debug!(record_id = %record.id, attempts = attempts.len(), "Live dispatch committed");
        Ok(record)
    }

    /// Walk one step's ordered provider list. Returns the winning output or
    /// the last provider's error detail once the list is exhausted.
    async fn run_step(
        &self,
        step: &PipelineStep,
        params: &HashMap<String, serde_json::Value>,
        attempts: &mut Vec<ProviderAttempt>,
    ) -> Result<StepWin, String> {
        let providers = self.registry.providers_for(step.capability);
        if providers.is_empty() {
            return Err(format!("no provider routed for {}", step.capability));
        }

        let mut step_params = params.clone();
        for (source, target) in step.aliases {
            if let Some(value) = params.get(*source) {
                step_params.insert((*target).to_string(), value.clone());
            }
        }

        let mut last_detail = String::new();
        for (index, provider) in providers.iter().enumerate() {
            let started_at = Utc::now();
            let outcome =
                tokio::time::timeout(step.timeout, provider.invoke(step.capability, &step_params))
                    .await;

            match outcome {
                Ok(Ok(output)) => {
                    self.registry.mark_up(provider.name());
                    attempts.push(ProviderAttempt::success(
                        step.capability,
                        provider.name(),
                        started_at,
                        output.primary_url().unwrap_or_default(),
                    ));
                    return Ok(StepWin {
                        output,
                        provider_index: index,
                    });
                }
                Ok(Err(err)) => {
                    last_detail = err.to_string();
                    warn!(
                        provider = provider.name(),
                        step = step.name,
                        error = %last_detail,
                        "Provider attempt failed"
                    );
                    self.registry.mark_down(provider.name(), &last_detail);
                    attempts.push(ProviderAttempt::failure(
                        step.capability,
                        provider.name(),
                        started_at,
                        err.kind(),
                    ));
                }
                Err(_) => {
                    last_detail =
                        format!("timed out after {}s", step.timeout.as_secs());
                    warn!(
                        provider = provider.name(),
                        step = step.name,
                        "Provider attempt timed out"
                    );
                    self.registry.mark_down(provider.name(), &last_detail);
                    attempts.push(ProviderAttempt::failure(
                        step.capability,
                        provider.name(),
                        started_at,
                        "timeout",
                    ));
                }
            }
        }

        Err(last_detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use vidgo_models::{
        Capability, CreditBalance, CreditTransaction, GenerationStatus, MaterialExample, ToolType,
    };
    use vidgo_providers::{ProviderClient, ProviderError, ProviderParams, ProviderResult};

    use crate::ledger::{MemoryLedger, ReservationId};
    use crate::materials::MemoryMaterialStore;
    use crate::records::MemoryGenerationStore;

    // =========================================================================
    // Fakes
    // =========================================================================

    enum Behavior {
        Succeed(&'static str),
        Fail(&'static str),
        Hang,
        /// Succeed only when every listed param key is present.
        RequireParams(&'static [&'static str], &'static str),
    }

    struct ScriptedProvider {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn invoke(
            &self,
            _capability: Capability,
            params: &ProviderParams,
        ) -> ProviderResult<ProviderOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(url) => Ok(ProviderOutput::single(*url)),
                Behavior::Fail(detail) => Err(ProviderError::TaskFailed(detail.to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(86_400)).await;
                    Err(ProviderError::TaskFailed("hung".to_string()))
                }
                Behavior::RequireParams(keys, url) => {
                    for key in *keys {
                        if !params.contains_key(*key) {
                            return Err(ProviderError::MissingParam(key));
                        }
                    }
                    Ok(ProviderOutput::single(*url))
                }
            }
        }
    }

    /// Ledger wrapper that counts every call, to prove demo mode never
    /// touches the ledger.
    struct CountingLedger {
        inner: MemoryLedger,
        calls: AtomicUsize,
    }

    impl CountingLedger {
        fn new(inner: MemoryLedger) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CreditLedger for CountingLedger {
        async fn reserve(&self, user_id: &str, amount: u32) -> Result<ReservationId, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.reserve(user_id, amount).await
        }

        async fn commit(
            &self,
            reservation: ReservationId,
            context: CommitContext,
        ) -> Result<(), LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.commit(reservation, context).await
        }

        async fn refund(&self, reservation: ReservationId) -> Result<(), LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.refund(reservation).await
        }

        async fn balance(&self, user_id: &str) -> Result<CreditBalance, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.balance(user_id).await
        }

        async fn history(
            &self,
            user_id: &str,
            limit: usize,
        ) -> Result<Vec<CreditTransaction>, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.history(user_id, limit).await
        }
    }

    // =========================================================================
    // Harness
    // =========================================================================

    struct Harness {
        dispatcher: Dispatcher,
        ledger: Arc<MemoryLedger>,
        records: Arc<MemoryGenerationStore>,
    }

    async fn harness(
        routes: Vec<(Capability, Vec<Arc<dyn ProviderClient>>)>,
        balance: u32,
        config: DispatcherConfig,
    ) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .seed_user(CreditBalance::subscription("u1", balance))
            .await;
        let records = Arc::new(MemoryGenerationStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(ProviderRegistry::new(routes)),
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Arc::new(MemoryMaterialStore::default()),
            Arc::clone(&records) as Arc<dyn GenerationStore>,
            config,
        );
        Harness {
            dispatcher,
            ledger,
            records,
        }
    }

    fn request(tool: ToolType, params: &[(&str, serde_json::Value)]) -> GenerationRequest {
        let input_params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        GenerationRequest::new(Some("u1".to_string()), tool, input_params)
    }

    // =========================================================================
    // Demo mode
    // =========================================================================

    #[tokio::test]
    async fn test_demo_serves_watermarked_material_without_ledger() {
        // Scenario: anonymous user, effect tool, topic matches a material.
        let ledger = Arc::new(CountingLedger::new(MemoryLedger::new()));
        let materials = MemoryMaterialStore::new(vec![MaterialExample {
            tool_type: ToolType::Effect,
            topic: "anime".to_string(),
            input_params: HashMap::new(),
            result_url: "https://cdn.vidgo.app/m/anime.mp4".to_string(),
            watermarked_url: "https://cdn.vidgo.app/m/anime_wm.mp4".to_string(),
        }]);
        let records = Arc::new(MemoryGenerationStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(ProviderRegistry::new(vec![])),
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Arc::new(materials),
            Arc::clone(&records) as Arc<dyn GenerationStore>,
            DispatcherConfig::default(),
        );

        let req = GenerationRequest::new(
            None,
            ToolType::Effect,
            [("topic".to_string(), json!("anime"))].into_iter().collect(),
        );
        let record = dispatcher.dispatch(req, PlanTier::Free).await.unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert!(record.demo);
        assert_eq!(record.credits_used, 0);
        assert_eq!(record.result_urls, vec!["https://cdn.vidgo.app/m/anime_wm.mp4"]);
        assert_eq!(ledger.calls(), 0);
        assert_eq!(records.len().await, 1);
    }

    #[tokio::test]
    async fn test_demo_without_material_fails_without_ledger() {
        let ledger = Arc::new(CountingLedger::new(MemoryLedger::new()));
        let records = Arc::new(MemoryGenerationStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(ProviderRegistry::new(vec![])),
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Arc::new(MemoryMaterialStore::default()),
            Arc::clone(&records) as Arc<dyn GenerationStore>,
            DispatcherConfig::default(),
        );

        let req = GenerationRequest::new(
            None,
            ToolType::Effect,
            [("topic".to_string(), json!("vaporwave"))]
                .into_iter()
                .collect(),
        );
        let record = dispatcher.dispatch(req, PlanTier::Free).await.unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        assert_eq!(
            record.failure,
            Some(GenerationFailure::NoMaterialAvailable)
        );
        assert_eq!(ledger.calls(), 0);
        assert_eq!(records.len().await, 1);
    }

    #[tokio::test]
    async fn test_free_plan_routes_to_demo_even_with_user_id() {
        let ledger = Arc::new(CountingLedger::new(MemoryLedger::new()));
        let dispatcher = Dispatcher::new(
            Arc::new(ProviderRegistry::new(vec![])),
            Arc::clone(&ledger) as Arc<dyn CreditLedger>,
            Arc::new(MemoryMaterialStore::default()),
            Arc::new(MemoryGenerationStore::new()),
            DispatcherConfig::default(),
        );

        let record = dispatcher
            .dispatch(request(ToolType::Effect, &[]), PlanTier::Free)
            .await
            .unwrap();
        assert!(record.demo);
        assert_eq!(ledger.calls(), 0);
    }

    // =========================================================================
    // Live mode: credits
    // =========================================================================

    #[tokio::test]
    async fn test_insufficient_credits_makes_no_provider_call() {
        // Scenario: balance 5, room redesign costs 20.
        let provider = ScriptedProvider::new("piapi", Behavior::Succeed("https://x/out.png"));
        let h = harness(
            vec![(Capability::Interior, vec![Arc::clone(&provider) as _])],
            5,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::RoomRedesign, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        assert_eq!(
            record.failure,
            Some(GenerationFailure::InsufficientCredits {
                required: 20,
                available: 5
            })
        );
        assert_eq!(provider.calls(), 0);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 5);
        assert_eq!(h.records.len().await, 1);
    }

    #[tokio::test]
    async fn test_completed_dispatch_commits_exact_cost_once() {
        let provider = ScriptedProvider::new("goenhance", Behavior::Succeed("https://x/fx.mp4"));
        let h = harness(
            vec![(Capability::VideoToVideo, vec![provider as _])],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(
                request(ToolType::Effect, &[("video_url", json!("https://x/in.mp4"))]),
                PlanTier::Studio,
            )
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert_eq!(record.credits_used, 8);
        assert!(!record.used_backup);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 42);

        let history = h.ledger.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].credits_amount, 8);
        assert_eq!(history[0].generation_id.as_deref(), Some(record.id.as_str()));
    }

    // =========================================================================
    // Failover
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_primary_timeout_fails_over_to_backup() {
        // Scenario: short video, primary hangs past the step timeout, backup
        // succeeds.
        let primary = ScriptedProvider::new("pollo", Behavior::Hang);
        let backup = ScriptedProvider::new("piapi", Behavior::Succeed("https://x/video.mp4"));
        let h = harness(
            vec![(
                Capability::TextToVideo,
                vec![Arc::clone(&primary) as _, Arc::clone(&backup) as _],
            )],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(
                request(ToolType::ShortVideo, &[("prompt", json!("a fox"))]),
                PlanTier::Creator,
            )
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert!(record.used_backup);
        assert_eq!(record.credits_used, 25);
        assert_eq!(record.result_urls, vec!["https://x/video.mp4"]);
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 25);
    }

    #[tokio::test]
    async fn test_primary_success_never_calls_backup() {
        let primary = ScriptedProvider::new("pollo", Behavior::Succeed("https://x/a.mp4"));
        let backup = ScriptedProvider::new("piapi", Behavior::Succeed("https://x/b.mp4"));
        let h = harness(
            vec![(
                Capability::TextToVideo,
                vec![Arc::clone(&primary) as _, Arc::clone(&backup) as _],
            )],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::ShortVideo, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert!(!record.used_backup);
        assert_eq!(record.result_urls, vec!["https://x/a.mp4"]);
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_providers_failed_surfaces_last_error_and_refunds() {
        let primary = ScriptedProvider::new("pollo", Behavior::Fail("alpha exploded"));
        let backup = ScriptedProvider::new("piapi", Behavior::Fail("beta exploded"));
        let h = harness(
            vec![(
                Capability::TextToVideo,
                vec![primary as _, backup as _],
            )],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::ShortVideo, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        match record.failure.as_ref().unwrap() {
            GenerationFailure::AllProvidersFailed { capability, detail } => {
                assert_eq!(*capability, Capability::TextToVideo);
                assert!(detail.contains("beta exploded"), "got: {detail}");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        // Reserve + refund nets zero
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
        assert!(h.ledger.history("u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_provider_failure_is_terminal() {
        // Scenario: avatar has exactly one provider; its failure ends the
        // request with no failover.
        let provider = ScriptedProvider::new("a2e", Behavior::Fail("render farm down"));
        let h = harness(
            vec![(Capability::Avatar, vec![Arc::clone(&provider) as _])],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::Avatar, &[]), PlanTier::Studio)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        assert!(matches!(
            record.failure,
            Some(GenerationFailure::AllProvidersFailed {
                capability: Capability::Avatar,
                ..
            })
        ));
        assert_eq!(provider.calls(), 1);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
        assert_eq!(h.records.len().await, 1);
    }

    #[tokio::test]
    async fn test_unrouted_capability_fails_and_refunds() {
        let h = harness(vec![], 50, DispatcherConfig::default()).await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::Avatar, &[]), PlanTier::Studio)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_still_settles_reservation() {
        // Scenario: the client disconnects while the only provider is still
        // running. The detached attempt must finish on its own, refund the
        // hold, and persist the failed record.
        let provider = ScriptedProvider::new("pollo", Behavior::Hang);
        let h = harness(
            vec![(Capability::TextToVideo, vec![Arc::clone(&provider) as _])],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let caller = tokio::time::timeout(
            Duration::from_secs(1),
            h.dispatcher
                .dispatch(request(ToolType::ShortVideo, &[]), PlanTier::Creator),
        )
        .await;
        assert!(caller.is_err(), "caller should give up before the step timeout");

        // The attempt keeps running past the disconnect; wait for its
        // terminal record.
        for _ in 0..100 {
            if h.records.len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }

        assert_eq!(h.records.len().await, 1);
        assert_eq!(provider.calls(), 1);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
        assert!(h.ledger.history("u1", 10).await.unwrap().is_empty());
    }

    // =========================================================================
    // Multi-step pipeline
    // =========================================================================

    #[tokio::test]
    async fn test_product_scene_threads_step_outputs() {
        let cutout = ScriptedProvider::new("piapi", Behavior::Succeed("https://x/cutout.png"));
        let scene = ScriptedProvider::new("piapi-t2i", Behavior::Succeed("https://x/scene.png"));
        // Composite only succeeds when both upstream outputs arrived.
        let composite = ScriptedProvider::new(
            "goenhance",
            Behavior::RequireParams(&["overlay_url", "image_url"], "https://x/final.png"),
        );
        let h = harness(
            vec![
                (Capability::BackgroundRemoval, vec![cutout as _]),
                (Capability::TextToImage, vec![scene as _]),
                (Capability::StyleTransfer, vec![composite as _]),
            ],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(
                request(
                    ToolType::ProductScene,
                    &[
                        ("image_url", json!("https://x/product.png")),
                        ("prompt", json!("marble countertop")),
                    ],
                ),
                PlanTier::Creator,
            )
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert_eq!(record.result_urls, vec!["https://x/final.png"]);
        assert_eq!(record.credits_used, 10);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 40);
    }

    #[tokio::test]
    async fn test_pipeline_step_failure_aborts_and_discards_partials() {
        let cutout = ScriptedProvider::new("piapi", Behavior::Succeed("https://x/cutout.png"));
        let scene = ScriptedProvider::new("piapi-t2i", Behavior::Fail("quota exhausted"));
        let composite = ScriptedProvider::new("goenhance", Behavior::Succeed("https://x/f.png"));
        let h = harness(
            vec![
                (Capability::BackgroundRemoval, vec![cutout as _]),
                (Capability::TextToImage, vec![scene as _]),
                (Capability::StyleTransfer, vec![Arc::clone(&composite) as _]),
            ],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::ProductScene, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        match record.failure.as_ref().unwrap() {
            GenerationFailure::PipelineStepFailed { step, detail } => {
                assert_eq!(step, "scene_generation");
                assert!(detail.contains("quota exhausted"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(record.result_urls.is_empty());
        assert_eq!(record.credits_used, 0);
        assert_eq!(composite.calls(), 0);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
        assert_eq!(h.records.len().await, 1);
    }

    #[tokio::test]
    async fn test_try_on_aliases_garment_url() {
        let provider = ScriptedProvider::new(
            "goenhance",
            Behavior::RequireParams(&["image_url", "overlay_url"], "https://x/fit.png"),
        );
        let h = harness(
            vec![(Capability::StyleTransfer, vec![provider as _])],
            50,
            DispatcherConfig::default(),
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(
                request(
                    ToolType::TryOn,
                    &[
                        ("image_url", json!("https://x/person.png")),
                        ("garment_url", json!("https://x/shirt.png")),
                    ],
                ),
                PlanTier::Creator,
            )
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert_eq!(record.result_urls, vec!["https://x/fit.png"]);
    }

    // =========================================================================
    // Moderation pre-step
    // =========================================================================

    #[tokio::test]
    async fn test_moderation_rejection_refunds_and_skips_generation() {
        let moderation = ScriptedProvider::new("gemini", Behavior::Fail("nudity detected"));
        let generation = ScriptedProvider::new("goenhance", Behavior::Succeed("https://x/f.png"));
        let h = harness(
            vec![
                (Capability::Moderation, vec![moderation as _]),
                (Capability::StyleTransfer, vec![Arc::clone(&generation) as _]),
            ],
            50,
            DispatcherConfig {
                moderation_enabled: true,
            },
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::TryOn, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Failed);
        match record.failure.as_ref().unwrap() {
            GenerationFailure::PipelineStepFailed { step, detail } => {
                assert_eq!(step, "moderation");
                assert!(detail.contains("nudity detected"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(generation.calls(), 0);
        assert_eq!(h.ledger.balance("u1").await.unwrap().total(), 50);
    }

    #[tokio::test]
    async fn test_moderation_pass_proceeds_to_generation() {
        let moderation = ScriptedProvider::new("gemini", Behavior::Succeed("ok"));
        let generation = ScriptedProvider::new("goenhance", Behavior::Succeed("https://x/f.png"));
        let h = harness(
            vec![
                (Capability::Moderation, vec![moderation as _]),
                (Capability::StyleTransfer, vec![generation as _]),
            ],
            50,
            DispatcherConfig {
                moderation_enabled: true,
            },
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::TryOn, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert_eq!(record.result_urls, vec!["https://x/f.png"]);
        // Moderation never marks the result as a backup path
        assert!(!record.used_backup);
        assert_eq!(record.credits_used, 15);
    }

    #[tokio::test]
    async fn test_moderation_skipped_for_unflagged_tools() {
        let moderation = ScriptedProvider::new("gemini", Behavior::Fail("should not run"));
        let generation = ScriptedProvider::new("pollo", Behavior::Succeed("https://x/v.mp4"));
        let h = harness(
            vec![
                (Capability::Moderation, vec![Arc::clone(&moderation) as _]),
                (Capability::TextToVideo, vec![generation as _]),
            ],
            50,
            DispatcherConfig {
                moderation_enabled: true,
            },
        )
        .await;

        let record = h
            .dispatcher
            .dispatch(request(ToolType::ShortVideo, &[]), PlanTier::Creator)
            .await
            .unwrap();

        assert_eq!(record.status, GenerationStatus::Completed);
        assert_eq!(moderation.calls(), 0);
    }
}
