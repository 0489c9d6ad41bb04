//! The uniform provider client trait.

use std::collections::HashMap;

use async_trait::async_trait;

use vidgo_models::Capability;

use crate::error::ProviderResult;

/// Parameters handed to a provider invocation.
///
/// String keys mapped to scalar or URL values, as received from the tool
/// request plus any outputs accumulated by earlier pipeline steps.
pub type ProviderParams = HashMap<String, serde_json::Value>;

/// Result of a successful provider invocation.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    /// Result URLs in vendor order; the first is the primary result.
    pub result_urls: Vec<String>,
}

impl ProviderOutput {
    /// Single-URL output.
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            result_urls: vec![url.into()],
        }
    }

    /// The primary result URL.
    pub fn primary_url(&self) -> Option<&str> {
        self.result_urls.first().map(String::as_str)
    }
}

/// Uniform interface over one external generation vendor.
///
/// Implementations are cheap to clone behind an `Arc` and are shared across
/// request handlers. `invoke` covers the whole vendor interaction for one
/// attempt, including task-create and result polling; callers bound it with
/// a timeout and never retry the same provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable provider name used in routing, health, and attempt records.
    fn name(&self) -> &'static str;

    /// Perform one unit of `capability` work with the given params.
    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput>;
}

/// Fetch a required string param.
pub(crate) fn require_str<'a>(
    params: &'a ProviderParams,
    key: &'static str,
) -> ProviderResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or(crate::error::ProviderError::MissingParam(key))
}

/// Fetch an optional string param.
pub(crate) fn optional_str<'a>(params: &'a ProviderParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}
