//! Gemini moderation client.
//!
//! Classifies user-supplied imagery/prompts before paid generation steps run.
//! A rejection surfaces as [`ProviderError::Rejected`] and is handled by the
//! dispatcher like any other step failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vidgo_models::Capability;

use crate::client::{optional_str, ProviderClient, ProviderOutput, ProviderParams};
use crate::error::{ProviderError, ProviderResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MODERATION_MODEL: &str = "gemini-2.5-flash-lite";

/// Gemini API client used for input moderation.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Moderation verdict parsed from the model's JSON reply.
#[derive(Debug, Deserialize)]
struct Verdict {
    safe: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl GeminiClient {
    /// Create a client against the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint (tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn moderation_prompt(params: &ProviderParams) -> String {
        let mut prompt = String::from(
            "You are a content safety classifier for a consumer image/video \
             generation product. Classify the following user inputs. Reply with \
             ONLY a JSON object: {\"safe\": true|false, \"reason\": \"...\"}.\n",
        );
        if let Some(image_url) = optional_str(params, "image_url") {
            prompt.push_str(&format!("\nINPUT IMAGE URL: {}", image_url));
        }
        if let Some(text) = optional_str(params, "prompt").or(optional_str(params, "script")) {
            prompt.push_str(&format!("\nINPUT TEXT: {}", text));
        }
        prompt
    }

    async fn classify(&self, prompt: &str) -> ProviderResult<Verdict> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, MODERATION_MODEL, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self.http.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| ProviderError::Malformed("no content in response".to_string()))?;

        // The model occasionally wraps JSON in a markdown code block
        let text = text.trim();
        let text = text.strip_prefix("```json").unwrap_or(text);
        let text = text.strip_suffix("```").unwrap_or(text);

        serde_json::from_str(text.trim())
            .map_err(|e| ProviderError::Malformed(format!("bad verdict JSON: {}", e)))
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn invoke(
        &self,
        capability: Capability,
        params: &ProviderParams,
    ) -> ProviderResult<ProviderOutput> {
        if capability != Capability::Moderation {
            return Err(ProviderError::Unsupported(capability));
        }

        let verdict = self.classify(&Self::moderation_prompt(params)).await?;
        if verdict.safe {
            debug!("Moderation passed");
            // Moderation produces no result URL
            Ok(ProviderOutput {
                result_urls: Vec::new(),
            })
        } else {
            Err(ProviderError::Rejected(
                verdict
                    .reason
                    .unwrap_or_else(|| "input failed moderation".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[tokio::test]
    async fn test_safe_verdict_passes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_body("{\"safe\": true}")),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url("k", server.uri());
        let mut params = ProviderParams::new();
        params.insert("image_url".to_string(), json!("https://x/photo.jpg"));

        let output = client.invoke(Capability::Moderation, &params).await.unwrap();
        assert!(output.result_urls.is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_verdict_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
                "```json\n{\"safe\": false, \"reason\": \"explicit content\"}\n```",
            )))
            .mount(&server)
            .await;

        let client = GeminiClient::with_base_url("k", server.uri());
        let err = client
            .invoke(Capability::Moderation, &ProviderParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(r) if r.contains("explicit")));
    }

    #[tokio::test]
    async fn test_only_moderation_supported() {
        let server = MockServer::start().await;
        let client = GeminiClient::with_base_url("k", server.uri());
        let err = client
            .invoke(Capability::TextToImage, &ProviderParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }
}
