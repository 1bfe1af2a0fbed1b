//! Embedding providers.
//!
//! The store only sees the [`EmbeddingProvider`] trait. Two backends ship:
//! a local fastembed model and the remote Gemini `embedContent` API.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{DEFAULT_MODEL, EMBEDDING_DIM};
use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{Error, Result};

/// An embedding vector.
pub type Embedding = Vec<f32>;

/// Default Gemini embedding model.
pub const DEFAULT_GEMINI_MODEL: &str = "text-embedding-004";

/// Output dimension of [`DEFAULT_GEMINI_MODEL`].
pub const GEMINI_EMBEDDING_DIM: usize = 768;

/// Maps text to a fixed-length vector.
///
/// All vectors returned by one provider share [`EmbeddingProvider::dimensions`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

fn reject_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Embedding("cannot embed empty text".to_string()));
    }
    Ok(())
}

fn check_dimensions(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(Error::Embedding(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            embedding.len()
        )));
    }
    Ok(())
}

/// Configuration for the local embedding service.
#[derive(Debug, Clone)]
pub struct EmbeddingServiceConfig {
    /// Model name, e.g. `all-MiniLM-L6-v2`.
    pub model: String,
    /// Where downloaded ONNX files are cached.
    pub cache_dir: Option<PathBuf>,
    /// Show download progress on first use.
    pub show_download_progress: bool,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            show_download_progress: false,
        }
    }
}

fn resolve_local_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, EMBEDDING_DIM)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        other => Err(Error::Config(format!(
            "Unsupported local embedding model '{}'",
            other
        ))),
    }
}

/// Local ONNX embeddings through fastembed.
///
/// Inference is CPU-bound, so each call runs on the blocking pool.
pub struct EmbeddingService {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingService {
    /// Load the default model (downloads it on first use).
    pub fn new() -> Result<Self> {
        Self::with_config(EmbeddingServiceConfig::default())
    }

    /// Load a specific model.
    pub fn with_config(config: EmbeddingServiceConfig) -> Result<Self> {
        let (model, dimensions) = resolve_local_model(&config.model)?;
        let mut options =
            InitOptions::new(model).with_show_download_progress(config.show_download_progress);
        if let Some(dir) = config.cache_dir {
            options = options.with_cache_dir(dir);
        }

        let embedding = TextEmbedding::try_new(options)
            .map_err(|e| Error::Embedding(format!("Failed to load model: {}", e)))?;
        info!(model = %config.model, dimensions, "Local embedding model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
            model_name: config.model,
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        reject_empty(text)?;
        let model = Arc::clone(&self.model);
        let input = text.to_string();

        let mut batch = tokio::task::spawn_blocking(move || {
            let model = model
                .lock()
                .map_err(|_| Error::Embedding("embedding model lock poisoned".to_string()))?;
            model
                .embed(vec![input], None)
                .map_err(|e| Error::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))??;

        let embedding = batch
            .pop()
            .ok_or_else(|| Error::Embedding("model returned no embedding".to_string()))?;
        check_dimensions(&embedding, self.dimensions)?;
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Remote embeddings through the Gemini `embedContent` endpoint.
pub struct GeminiEmbedder {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    /// Build from configuration. A missing key is reported on every call,
    /// not here, so the process can still start and serve the policy gate.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let (model, dimensions) = if config.model == DEFAULT_MODEL {
            (DEFAULT_GEMINI_MODEL.to_string(), GEMINI_EMBEDDING_DIM)
        } else {
            (config.model.clone(), config.dimensions)
        };
        Self {
            http_client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model,
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            dimensions,
        }
    }

    /// Override the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn url(&self) -> String {
        format!("{}/models/{}:embedContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Gemini embeddings require an API key. Set {}.",
                self.api_key_env
            ))
        })?;
        reject_empty(text)?;

        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part { text }],
            },
        };
        debug!(model = %self.model, chars = text.len(), "Requesting remote embedding");

        let resp = self
            .http_client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Gemini embedding API error ({}): {}",
                status, body
            )));
        }

        let response: EmbedContentResponse = resp
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("malformed response: {}", e)))?;
        let values = response
            .embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Embedding("response contained no embedding".to_string()))?;
        check_dimensions(&values, self.dimensions)?;
        Ok(values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Build the provider selected in configuration.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Local => {
            let service = EmbeddingService::with_config(EmbeddingServiceConfig {
                model: config.model.clone(),
                ..Default::default()
            })?;
            Ok(Arc::new(service))
        }
        EmbeddingProviderKind::Gemini => Ok(Arc::new(GeminiEmbedder::from_config(config))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_gemini(response: Value, status: StatusCode) -> String {
        async fn handler(
            State((response, status)): State<(Value, StatusCode)>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            assert_eq!(headers["x-goog-api-key"], "test-key");
            assert!(body["content"]["parts"][0]["text"].is_string());
            (status, Json(response))
        }

        let app = Router::new()
            .route("/v1beta/models/{model}", post(handler))
            .with_state((response, status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    fn gemini_config(endpoint: String) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: EmbeddingProviderKind::Gemini,
            model: "test-embed".into(),
            dimensions: 3,
            endpoint,
            api_key_env: "SYNAPSE_TEST_KEY_THAT_IS_NEVER_SET".into(),
        }
    }

    #[tokio::test]
    async fn test_gemini_returns_values() {
        let endpoint = spawn_gemini(
            json!({"embedding": {"values": [0.1, 0.2, 0.3]}}),
            StatusCode::OK,
        )
        .await;
        let embedder = GeminiEmbedder::from_config(&gemini_config(endpoint)).with_api_key("test-key");

        let v = embedder.embed("test text").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_gemini_missing_key_fails_every_time() {
        let embedder = GeminiEmbedder::from_config(&gemini_config("http://127.0.0.1:9".into()));
        let first = embedder.embed("hello").await.unwrap_err().to_string();
        let second = embedder.embed("hello").await.unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(first.contains("SYNAPSE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[tokio::test]
    async fn test_gemini_rejects_empty_input() {
        let embedder = GeminiEmbedder::from_config(&gemini_config("http://127.0.0.1:9".into()))
            .with_api_key("test-key");
        assert!(matches!(embedder.embed("   ").await, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_gemini_http_error_is_reported() {
        let endpoint = spawn_gemini(
            json!({"error": {"message": "quota exceeded"}}),
            StatusCode::TOO_MANY_REQUESTS,
        )
        .await;
        let embedder = GeminiEmbedder::from_config(&gemini_config(endpoint)).with_api_key("test-key");

        let err = embedder.embed("text").await.unwrap_err().to_string();
        assert!(err.contains("429"), "{}", err);
    }

    #[tokio::test]
    async fn test_gemini_malformed_and_wrong_dimension() {
        let endpoint = spawn_gemini(json!({"unexpected": true}), StatusCode::OK).await;
        let embedder = GeminiEmbedder::from_config(&gemini_config(endpoint)).with_api_key("test-key");
        assert!(matches!(embedder.embed("text").await, Err(Error::Embedding(_))));

        let endpoint = spawn_gemini(json!({"embedding": {"values": [1.0, 2.0]}}), StatusCode::OK).await;
        let embedder = GeminiEmbedder::from_config(&gemini_config(endpoint)).with_api_key("test-key");
        let err = embedder.embed("text").await.unwrap_err().to_string();
        assert!(err.contains("dimension mismatch"));
    }

    #[test]
    fn test_gemini_default_model_substitution() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Gemini,
            ..Default::default()
        };
        let embedder = GeminiEmbedder::from_config(&config);
        assert_eq!(embedder.name(), DEFAULT_GEMINI_MODEL);
        assert_eq!(embedder.dimensions(), GEMINI_EMBEDDING_DIM);
    }

    #[test]
    fn test_unknown_local_model_is_config_error() {
        assert!(matches!(resolve_local_model("gpt-embeddings"), Err(Error::Config(_))));
        assert_eq!(resolve_local_model(DEFAULT_MODEL).unwrap().1, EMBEDDING_DIM);
    }
}
