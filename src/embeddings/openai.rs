//! OpenAI-style embeddings client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::config::ProviderConfig;
use crate::types::{ChatError, ChatResult};

/// Embedding client backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddingProvider {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    /// Builds a client from the given configuration.
    pub fn new(config: ProviderConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ChatError::Serialization(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn auth_headers(&self) -> ChatResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|err| ChatError::Serialization(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> ChatResult<Vec<f32>> {
        if text.is_empty() {
            return Err(ChatError::InvalidInput("cannot embed empty text".into()));
        }
        if !self.config.has_credential() {
            return Err(ChatError::Auth);
        }

        debug!(
            length = text.len(),
            model = %self.config.embedding_model,
            "requesting embedding"
        );

        let body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };

        let response = self
            .client
            .post(&self.config.embeddings_url)
            .headers(self.auth_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(ChatError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ChatError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Parse(err.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ChatError::Parse("no embedding found in response".into()))?;

        debug!(dimensions = embedding.len(), "embedding received");
        Ok(embedding)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
    #[allow(dead_code)]
    model: Option<String>,
    #[allow(dead_code)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[allow(dead_code)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[allow(dead_code)]
    prompt_tokens: Option<u64>,
    #[allow(dead_code)]
    total_tokens: Option<u64>,
}
