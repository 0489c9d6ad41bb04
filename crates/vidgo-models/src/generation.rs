//! Generation request and record data models.
//!
//! A [`GenerationRequest`] is one tool invocation as received from the API
//! layer. The dispatcher turns it into exactly one durable
//! [`GenerationRecord`], collecting a [`ProviderAttempt`] per provider tried
//! along the way.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::tool::ToolType;

/// Keys probed, in order, when deriving the demo-mode topic from input params.
const TOPIC_KEYS: &[&str] = &["topic", "style_id", "style", "room_type"];

/// One tool invocation as submitted by a user.
///
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    /// Requesting user, if authenticated. `None` means anonymous.
    pub user_id: Option<String>,

    /// Which tool was invoked.
    pub tool_type: ToolType,

    /// Tool inputs: string keys mapped to scalar or URL values.
    pub input_params: HashMap<String, serde_json::Value>,

    /// When the request was received.
    pub requested_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// Create a request with the current timestamp.
    pub fn new(
        user_id: Option<String>,
        tool_type: ToolType,
        input_params: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            user_id,
            tool_type,
            input_params,
            requested_at: Utc::now(),
        }
    }

    /// Derive the demo-mode topic from the input params.
    ///
    /// Probes a fixed list of keys (topic, style_id, style, room_type) and
    /// returns the first non-empty string value.
    pub fn topic(&self) -> Option<String> {
        for key in TOPIC_KEYS {
            if let Some(value) = self.input_params.get(*key).and_then(|v| v.as_str()) {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_lowercase());
                }
            }
        }
        None
    }

    /// Get a string param by key.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.input_params.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of a single provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// One provider invocation during a dispatch.
///
/// Kept in memory and logs for audit; not persisted with the record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderAttempt {
    /// Capability that was attempted.
    pub capability: Capability,

    /// Name of the provider that was called.
    pub provider_name: String,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,

    /// Whether the attempt succeeded.
    pub outcome: AttemptOutcome,

    /// Error description for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Result reference for successful attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}

impl ProviderAttempt {
    /// Record a successful attempt.
    pub fn success(
        capability: Capability,
        provider_name: impl Into<String>,
        started_at: DateTime<Utc>,
        result_ref: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            provider_name: provider_name.into(),
            started_at,
            outcome: AttemptOutcome::Success,
            error_kind: None,
            result_ref: Some(result_ref.into()),
        }
    }

    /// Record a failed attempt.
    pub fn failure(
        capability: Capability,
        provider_name: impl Into<String>,
        started_at: DateTime<Utc>,
        error_kind: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            provider_name: provider_name.into(),
            started_at,
            outcome: AttemptOutcome::Failure,
            error_kind: Some(error_kind.into()),
            result_ref: None,
        }
    }
}

/// Terminal status of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Completed,
    Failed,
}

/// Why a generation failed.
///
/// All variants are terminal for the request; the dispatcher never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationFailure {
    /// Demo mode had no pre-generated example for the requested topic.
    NoMaterialAvailable,
    /// The user's balance could not cover the tool's cost.
    InsufficientCredits { required: u32, available: u32 },
    /// Every provider in the capability's list failed.
    AllProvidersFailed { capability: Capability, detail: String },
    /// A step of a multi-step pipeline failed.
    PipelineStepFailed { step: String, detail: String },
}

impl GenerationFailure {
    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationFailure::NoMaterialAvailable => "no_material_available",
            GenerationFailure::InsufficientCredits { .. } => "insufficient_credits",
            GenerationFailure::AllProvidersFailed { .. } => "all_providers_failed",
            GenerationFailure::PipelineStepFailed { .. } => "pipeline_step_failed",
        }
    }

    /// Human-readable detail for API responses.
    pub fn detail(&self) -> String {
        match self {
            GenerationFailure::NoMaterialAvailable => {
                "No example is available for this topic yet".to_string()
            }
            GenerationFailure::InsufficientCredits { required, available } => format!(
                "Insufficient credits: {} required, {} available",
                required, available
            ),
            GenerationFailure::AllProvidersFailed { capability, detail } => {
                format!("Generation failed ({}): {}", capability, detail)
            }
            GenerationFailure::PipelineStepFailed { step, detail } => {
                format!("Generation failed at step '{}': {}", step, detail)
            }
        }
    }
}

/// Durable outcome of one generation request.
///
/// Created exactly once per request; never mutated after completion except
/// for soft-delete by the owning user.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRecord {
    /// Unique identifier (UUID).
    pub id: String,

    /// Owning user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Tool that was invoked.
    pub tool_type: ToolType,

    /// Inputs as submitted.
    pub input_params: HashMap<String, serde_json::Value>,

    /// Whether a non-primary provider satisfied any step.
    pub used_backup: bool,

    /// Result URLs (watermarked for demo results).
    pub result_urls: Vec<String>,

    /// Credits committed for this generation (0 for demo and failures).
    pub credits_used: u32,

    /// Terminal status.
    pub status: GenerationStatus,

    /// Failure detail when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<GenerationFailure>,

    /// Whether this result came from the demo/preset pool.
    pub demo: bool,

    /// Soft-delete flag, settable only by the owner.
    #[serde(default)]
    pub deleted: bool,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    /// Build a completed record.
    pub fn completed(
        request: &GenerationRequest,
        result_urls: Vec<String>,
        credits_used: u32,
        used_backup: bool,
        demo: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            tool_type: request.tool_type,
            input_params: request.input_params.clone(),
            used_backup,
            result_urls,
            credits_used,
            status: GenerationStatus::Completed,
            failure: None,
            demo,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    /// Build a failed record. Failed generations never charge credits.
    pub fn failed(request: &GenerationRequest, failure: GenerationFailure, demo: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            tool_type: request.tool_type,
            input_params: request.input_params.clone(),
            used_backup: false,
            result_urls: Vec::new(),
            credits_used: 0,
            status: GenerationStatus::Failed,
            failure: Some(failure),
            demo,
            deleted: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_with(params: &[(&str, serde_json::Value)]) -> GenerationRequest {
        let input_params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        GenerationRequest::new(None, ToolType::Effect, input_params)
    }

    #[test]
    fn test_topic_prefers_explicit_topic_key() {
        let req = request_with(&[
            ("style_id", json!("cyberpunk")),
            ("topic", json!("Anime")),
        ]);
        assert_eq!(req.topic().as_deref(), Some("anime"));
    }

    #[test]
    fn test_topic_falls_back_to_style_id() {
        let req = request_with(&[("style_id", json!("cyberpunk"))]);
        assert_eq!(req.topic().as_deref(), Some("cyberpunk"));
    }

    #[test]
    fn test_topic_ignores_empty_and_non_string() {
        let req = request_with(&[("topic", json!("  ")), ("style", json!(42))]);
        assert_eq!(req.topic(), None);
    }

    #[test]
    fn test_failure_codes() {
        assert_eq!(
            GenerationFailure::NoMaterialAvailable.code(),
            "no_material_available"
        );
        let f = GenerationFailure::InsufficientCredits {
            required: 20,
            available: 5,
        };
        assert_eq!(f.code(), "insufficient_credits");
        assert!(f.detail().contains("20"));
    }

    #[test]
    fn test_failure_serde_tagging() {
        let f = GenerationFailure::PipelineStepFailed {
            step: "composite".to_string(),
            detail: "upstream 500".to_string(),
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["kind"], "pipeline_step_failed");
        assert_eq!(json["step"], "composite");
    }

    #[test]
    fn test_failed_record_has_zero_credits() {
        let req = request_with(&[]);
        let rec = GenerationRecord::failed(&req, GenerationFailure::NoMaterialAvailable, true);
        assert_eq!(rec.credits_used, 0);
        assert_eq!(rec.status, GenerationStatus::Failed);
        assert!(rec.result_urls.is_empty());
    }
}
