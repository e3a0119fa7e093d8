//! Language model runtimes reachable over HTTP.
//!
//! Both clients send the already-rendered prompt verbatim; role templating is
//! done by the agent, so Ollama is called with `raw: true`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tracechat_agent::{CompletionRequest, GenerationParams, LlmClient, ModelLoader};
use tracechat_core::config::{LlmConfig, LlmProvider};

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build language model http client")
}

async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    body: &B,
    runtime: &str,
) -> Result<R> {
    let response = request.json(body).send().await.with_context(|| format!("{runtime} request failed"))?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        let excerpt: String = detail.chars().take(200).collect();
        anyhow::bail!("{runtime} returned {status}: {excerpt}");
    }
    response.json::<R>().await.with_context(|| format!("failed to decode {runtime} response"))
}

// Ollama

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            raw: true,
            stream: false,
            options: OllamaOptions {
                num_predict: request.params.max_tokens,
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                repeat_penalty: request.params.repeat_penalty,
            },
        };
        let url = format!("{}/api/generate", self.base_url);
        debug!(event_name = "chat.llm.request", runtime = "ollama", url = %url, model = %self.model, "completion request");

        let response: OllamaGenerateResponse =
            post_json(self.client.post(&url), &body, "ollama").await?;
        Ok(response.response)
    }
}

// OpenAI-compatible completions

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

pub struct OpenAiCompatibleClient {
    base_url: String,
    model: String,
    api_key: SecretString,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: &str, model: &str, api_key: SecretString, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = CompletionsRequest {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            repetition_penalty: request.params.repeat_penalty,
        };
        let url = format!("{}/v1/completions", self.base_url);
        debug!(event_name = "chat.llm.request", runtime = "openai_compatible", url = %url, model = %self.model, "completion request");

        let builder = self.client.post(&url).bearer_auth(self.api_key.expose_secret());
        let response: CompletionsResponse = post_json(builder, &body, "completions endpoint").await?;
        Ok(response.choices.into_iter().next().map(|choice| choice.text).unwrap_or_default())
    }
}

// Loader

/// Builds the configured runtime client on first use.
pub struct RuntimeLoader {
    config: LlmConfig,
}

impl RuntimeLoader {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for RuntimeLoader {
    async fn load(&self) -> Result<Arc<dyn LlmClient>> {
        let config = &self.config;
        match config.provider {
            LlmProvider::Ollama => {
                let client = OllamaClient::new(&config.base_url, &config.model, config.timeout_secs)?;
                // First generate call makes Ollama pull the weights into memory.
                let warm_up = CompletionRequest {
                    prompt: "ok".to_string(),
                    params: GenerationParams { max_tokens: 1, ..GenerationParams::default() },
                };
                client.complete(&warm_up).await.context("ollama warm-up request failed")?;
                info!(event_name = "chat.model.loaded", runtime = "ollama", model = %config.model, "language model ready");
                Ok(Arc::new(client))
            }
            LlmProvider::OpenAiCompatible => {
                let api_key = config
                    .api_key
                    .clone()
                    .context("llm.api_key is required for the openai_compatible provider")?;
                let client =
                    OpenAiCompatibleClient::new(&config.base_url, &config.model, api_key, config.timeout_secs)?;
                info!(
                    event_name = "chat.model.loaded",
                    runtime = "openai_compatible",
                    model = %config.model,
                    "language model ready"
                );
                Ok(Arc::new(client))
            }
        }
    }
}
