//! OpenAiGateway -- concrete [`LlmGateway`] implementation for any
//! OpenAI-compatible API.
//!
//! Structured completions go to `/chat/completions` with a `json_schema`
//! response format; embeddings go to `/embeddings` with an explicit
//! `dimensions` so the vectors match the store's column width. The API key
//! is wrapped in [`secrecy::SecretString`] and only exposed when building
//! request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use mnemon_core::llm::gateway::LlmGateway;
use mnemon_types::config::LlmConfig;
use mnemon_types::error::GatewayError;
use mnemon_types::llm::StructuredRequest;

use super::wire::{
    ChatCompletionRequest, ChatCompletionResponse, EmbeddingRequest, EmbeddingResponse,
    JsonSchemaFormat, ResponseFormat, WireMessage,
};

/// Gateway to an OpenAI-compatible provider.
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    completion_model: String,
    embedding_model: String,
    dimension: usize,
}

impl OpenAiGateway {
    /// Build a gateway from engine configuration, reading the API key from
    /// the environment variable the config names.
    pub fn from_config(config: &LlmConfig) -> Result<Self, GatewayError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| GatewayError::AuthenticationFailed)?;
        Ok(Self::new(
            SecretString::from(api_key),
            config.base_url.clone(),
            config.completion_model.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        ))
    }

    pub fn new(
        api_key: SecretString,
        base_url: String,
        completion_model: String,
        embedding_model: String,
        dimension: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            completion_model,
            embedding_model,
            dimension,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GatewayError::AuthenticationFailed,
                429 => GatewayError::RateLimited { retry_after_ms },
                _ => GatewayError::Provider {
                    message: format!("HTTP {status}: {error_body}"),
                },
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}

// OpenAiGateway intentionally does NOT derive Debug to keep the API key out
// of any Debug output.

impl LlmGateway for OpenAiGateway {
    async fn complete_json(
        &self,
        request: &StructuredRequest,
    ) -> Result<serde_json::Value, GatewayError> {
        let body = ChatCompletionRequest {
            model: self.completion_model.clone(),
            messages: vec![
                WireMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                WireMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: request.schema_name.clone(),
                    schema: request.schema.clone(),
                    strict: true,
                },
            },
        };

        let response: ChatCompletionResponse = self.post_json("/chat/completions", &body).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::InvalidResponse("empty completion".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            GatewayError::InvalidResponse(format!("completion is not valid JSON: {e}"))
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: texts.to_vec(),
            dimensions: self.dimension,
        };
        let response: EmbeddingResponse = self.post_json("/embeddings", &body).await?;

        if response.data.len() != texts.len() {
            return Err(GatewayError::InvalidResponse(format!(
                "embedding count {} does not match input count {}",
                response.data.len(),
                texts.len()
            )));
        }

        // The API may return items out of order; restore input order.
        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for item in response.data {
            if item.embedding.len() != self.dimension {
                return Err(GatewayError::InvalidResponse(format!(
                    "embedding dimension {} does not match configured {}",
                    item.embedding.len(),
                    self.dimension
                )));
            }
            let slot = ordered.get_mut(item.index).ok_or_else(|| {
                GatewayError::InvalidResponse(format!("embedding index {} out of range", item.index))
            })?;
            *slot = Some(item.embedding);
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    GatewayError::InvalidResponse(format!("missing embedding for index {i}"))
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
