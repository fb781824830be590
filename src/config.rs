//! Provider configuration.
//!
//! Configuration is an explicit value handed to the provider constructors
//! rather than ambient process-wide state. The only environment coupling
//! lives in [`ProviderConfig::from_env`], which recognizes three variables
//! and nothing else.

use std::time::Duration;

/// Endpoint, model, and credential settings shared by the embedding and
/// completion clients.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Bearer token for the external provider. Empty means "not configured";
    /// clients fail with [`ChatError::Auth`](crate::ChatError::Auth) before
    /// issuing any request.
    pub api_key: String,
    /// Model name sent to the embeddings endpoint.
    pub embedding_model: String,
    /// Model name sent to the chat-completions endpoint.
    pub completion_model: String,
    /// Embeddings endpoint URL.
    pub embeddings_url: String,
    /// Chat-completions endpoint URL.
    pub completions_url: String,
    /// Per-request timeout; expiry surfaces as a service error.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o".to_string(),
            embeddings_url: "https://api.openai.com/v1/embeddings".to_string(),
            completions_url: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    /// Creates a configuration with the given credential and default models.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Reads configuration from the environment (and a `.env` file if one
    /// is present). Recognized variables: `OPENAI_API_KEY`,
    /// `DOCCHAT_EMBEDDING_MODEL`, `DOCCHAT_COMPLETION_MODEL`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(model) = std::env::var("DOCCHAT_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(model) = std::env::var("DOCCHAT_COMPLETION_MODEL") {
            config.completion_model = model;
        }
        config
    }

    /// Overrides the embedding model name.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Overrides the completion model name.
    #[must_use]
    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    /// Overrides the embeddings endpoint. Used by tests to point at a mock
    /// server.
    #[must_use]
    pub fn with_embeddings_url(mut self, url: impl Into<String>) -> Self {
        self.embeddings_url = url.into();
        self
    }

    /// Overrides the chat-completions endpoint.
    #[must_use]
    pub fn with_completions_url(mut self, url: impl Into<String>) -> Self {
        self.completions_url = url.into();
        self
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` when a credential is configured.
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
