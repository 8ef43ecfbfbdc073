//! Ollama HTTP providers.
//!
//! [`OllamaEmbedder`] calls `POST {url}/api/embeddings` with `{model, prompt}` and
//! reads the `embedding` array. [`OllamaGenerator`] calls `POST {url}/api/generate`
//! with `{model, prompt, stream: false}` and reads the `response` string.
//!
//! Failures are classified for the pipelines:
//!
//! | Failure                                    | Error                |
//! |--------------------------------------------|----------------------|
//! | connect refused, DNS, timeout, broken body | `Error::Connection`  |
//! | non-2xx status                             | `Error::Generation`  |
//! | unparseable JSON, missing or empty field   | `Error::Generation`  |

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use docqa_core::embedding::{ensure_non_empty, AnswerGenerator, EmbeddingProvider};
use docqa_core::{Error, Result};

use crate::config::{EmbeddingConfig, GenerationConfig};

/// Thin JSON-over-HTTP client shared by both providers.
struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    fn new(url: &str, connect_timeout_secs: u64, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| connection_error(&self.base_url, e))?;

        if !status.is_success() {
            return Err(Error::Generation(format!(
                "Ollama API error {}: {}",
                status,
                truncate(&text, 200)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Generation(format!("invalid response from Ollama: {e}")))
    }
}

fn connection_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Connection(format!("request to Ollama at {url} timed out"))
    } else {
        Error::Connection(format!(
            "failed to connect to Ollama (is it running at {url}?): {err}"
        ))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

fn parse_embedding(response: EmbeddingResponse) -> Result<Vec<f32>> {
    let vector = response.embedding.ok_or_else(|| {
        Error::Generation("invalid Ollama response: missing embedding".to_string())
    })?;
    ensure_non_empty(vector)
}

fn parse_answer(response: GenerateResponse) -> Result<String> {
    match response.response {
        Some(answer) if !answer.trim().is_empty() => Ok(answer.trim().to_string()),
        Some(_) => Err(Error::Generation(
            "Ollama returned an empty answer".to_string(),
        )),
        None => Err(Error::Generation(
            "invalid Ollama response: missing response".to_string(),
        )),
    }
}

pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: OllamaClient::new(
                &config.url,
                config.connect_timeout_secs,
                config.timeout_secs,
            )?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "prompt": text });
        let response: EmbeddingResponse = self.client.post("/api/embeddings", &body).await?;
        parse_embedding(response)
    }
}

pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: OllamaClient::new(
                &config.url,
                config.connect_timeout_secs,
                config.timeout_secs,
            )?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_answer(&self, question: &str, context: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": build_prompt(question, context),
            "stream": false,
        });
        let response: GenerateResponse = self.client.post("/api/generate", &body).await?;
        parse_answer(response)
    }
}

/// Prompt that keeps the model grounded in the retrieved passages.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an assistant answering questions about a private document collection. \
Answer the question using the provided context.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Instructions:\n\
- Answer only from the provided context\n\
- Be concise and factual\n\
- If the context does not contain enough information, say so\n\
- Refer to specific details from the context where possible\n\n\
Answer:"
    )
}

/// Build the configured embedding provider.
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "disabled" => {
            bail!("Embedding provider is disabled; set [embedding] provider = \"ollama\"")
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}

pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn AnswerGenerator>> {
    Ok(Arc::new(OllamaGenerator::new(config)?))
}
