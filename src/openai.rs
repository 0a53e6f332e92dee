//! OpenAI-compatible embedding and chat-completion clients.
//!
//! Two URL and auth flavors are supported:
//!
//! | `provider` | Embeddings URL | Auth header |
//! |------------|----------------|-------------|
//! | `"openai"` | `{api_base}/embeddings` | `Authorization: Bearer <key>` |
//! | `"azure"`  | `{endpoint}/openai/deployments/{deployment}/embeddings?api-version=…` | `api-key: <key>` |
//!
//! Chat completions use `/chat/completions` on the same base. The API key is
//! read from the environment variable named by `api_key_env` when the client
//! is created.
//!
//! These clients do not retry. Embedding calls are retried by the core
//! pipeline; search and generation failures surface immediately.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use docent::config::EmbeddingConfig;
//! # use docent::openai::create_embedder;
//! # use docent_core::embedding::EmbeddingProvider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_embedder(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use docent_core::embedding::EmbeddingProvider;
use docent_core::generation::{ChatMessage, ChatModel, CompletionOptions};

use crate::config::{EmbeddingConfig, GenerationConfig, ModelEndpointConfig};

/// Resolved base URL and credentials for one model endpoint.
#[derive(Clone)]
struct Endpoint {
    flavor: Flavor,
    api_key: String,
    api_version: String,
}

#[derive(Clone)]
enum Flavor {
    OpenAi { api_base: String },
    Azure { endpoint: String, deployment: String },
}

impl Endpoint {
    fn from_config(config: &ModelEndpointConfig, model: &str) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;

        let flavor = match config.provider.as_str() {
            "openai" => Flavor::OpenAi {
                api_base: config.api_base.trim_end_matches('/').to_string(),
            },
            "azure" => Flavor::Azure {
                endpoint: config
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| anyhow!("endpoint required for azure provider"))?
                    .trim_end_matches('/')
                    .to_string(),
                deployment: config
                    .deployment
                    .clone()
                    .unwrap_or_else(|| model.to_string()),
            },
            other => bail!("Unknown model provider: {}", other),
        };

        Ok(Self {
            flavor,
            api_key,
            api_version: config.api_version.clone(),
        })
    }

    /// URL for an operation such as `"embeddings"` or `"chat/completions"`.
    fn url(&self, operation: &str) -> String {
        match &self.flavor {
            Flavor::OpenAi { api_base } => format!("{}/{}", api_base, operation),
            Flavor::Azure {
                endpoint,
                deployment,
            } => format!(
                "{}/openai/deployments/{}/{}?api-version={}",
                endpoint, deployment, operation, self.api_version
            ),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.flavor {
            Flavor::OpenAi { .. } => req.header("Authorization", format!("Bearer {}", self.api_key)),
            Flavor::Azure { .. } => req.header("api-key", &self.api_key),
        }
    }

    /// Whether the request body must name the model (Azure infers it from the deployment).
    fn sends_model(&self) -> bool {
        matches!(self.flavor, Flavor::OpenAi { .. })
    }

    async fn post_json(
        &self,
        client: &reqwest::Client,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let resp = self
            .authorize(client.post(self.url(operation)))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} request failed", operation))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            bail!(
                "model API error {} on {}: {}",
                status,
                operation,
                body_text.chars().take(300).collect::<String>()
            );
        }

        Ok(resp.json().await?)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ Disabled ============

/// A provider that always fails.
///
/// Used when `provider = "disabled"`. Lets `docent config` and `/health`
/// work without credentials; any actual call reports the missing setup.
pub struct DisabledModel {
    dims: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

#[async_trait]
impl ChatModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage], _options: CompletionOptions) -> Result<String> {
        bail!("Chat provider is disabled")
    }
}

// ============ Embeddings ============

/// Embedding provider for OpenAI and Azure OpenAI.
pub struct OpenAiEmbedder {
    endpoint: Endpoint,
    client: reqwest::Client,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::from_config(&config.endpoint, &config.model)?,
            client: http_client(config.endpoint.timeout_secs)?,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut body = serde_json::json!({ "input": texts });
        if self.endpoint.sends_model() {
            body["model"] = serde_json::Value::String(self.model.clone());
        }

        let json = self
            .endpoint
            .post_json(&self.client, "embeddings", &body)
            .await?;
        let embeddings = parse_embeddings_response(&json)?;
        if embeddings.len() != texts.len() {
            bail!(
                "embedding response has {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }
        Ok(embeddings)
    }
}

/// Parse an embeddings response.
///
/// Extracts `data[].embedding` and orders it by `data[].index`, falling back
/// to array order for entries without an index.
pub fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Chat ============

/// Chat-completion model for OpenAI and Azure OpenAI.
pub struct OpenAiChat {
    endpoint: Endpoint,
    client: reqwest::Client,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::from_config(&config.endpoint, &config.model)?,
            client: http_client(config.endpoint.timeout_secs)?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if self.endpoint.sends_model() {
            body["model"] = serde_json::Value::String(self.model.clone());
        }

        let start = std::time::Instant::now();
        let json = self
            .endpoint
            .post_json(&self.client, "chat/completions", &body)
            .await?;
        tracing::debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content`. A `null` content reads as empty text.
pub fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let message = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow!("Invalid chat response: no choices"))?;

    Ok(message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

// ============ Factories ============

/// Create the embedding provider selected by `config.endpoint.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.endpoint.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel { dims: config.dims })),
        "openai" | "azure" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Create the chat model selected by `config.endpoint.provider`.
pub fn create_chat(config: &GenerationConfig) -> Result<Arc<dyn ChatModel>> {
    match config.endpoint.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel { dims: 0 })),
        "openai" | "azure" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(flavor: Flavor) -> Endpoint {
        Endpoint {
            flavor,
            api_key: "k".into(),
            api_version: "2024-02-01".into(),
        }
    }

    #[test]
    fn test_openai_urls() {
        let e = endpoint(Flavor::OpenAi {
            api_base: "https://api.openai.com/v1".into(),
        });
        assert_eq!(e.url("embeddings"), "https://api.openai.com/v1/embeddings");
        assert!(e.sends_model());
    }

    #[test]
    fn test_azure_urls() {
        let e = endpoint(Flavor::Azure {
            endpoint: "https://acme.openai.azure.com".into(),
            deployment: "gpt-4o".into(),
        });
        assert_eq!(
            e.url("chat/completions"),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
        assert!(!e.sends_model());
    }

    #[test]
    fn test_embeddings_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_embeddings_missing_data() {
        assert!(parse_embeddings_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_chat_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Thirty days."}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Thirty days.");
        let null = serde_json::json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(parse_chat_response(&null).unwrap(), "");
        assert!(parse_chat_response(&serde_json::json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
        let chat = create_chat(&GenerationConfig::default()).unwrap();
        let opts = CompletionOptions {
            temperature: 0.0,
            max_tokens: 10,
        };
        assert!(chat.complete(&[ChatMessage::user("hi")], opts).await.is_err());
    }
}
