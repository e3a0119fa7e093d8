use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

/// Sampling settings for one completion. The defaults are tuned for short,
/// deterministic-leaning replies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 64, temperature: 0.15, top_p: 0.85, repeat_penalty: 1.15 }
    }
}

impl GenerationParams {
    pub fn extraction() -> Self {
        Self { max_tokens: 8, temperature: 0.2, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub params: GenerationParams,
}

/// Black-box text completion. Implementations return the raw generated text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Builds the runtime handle the first time it is needed.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn LlmClient>>;
}

/// The single process-wide model handle.
///
/// Loading happens at most once; concurrent first callers wait on the same
/// initialization. When `serialize_inference` is set every completion goes through
/// one gate, which is then the throughput bottleneck of the whole service.
pub struct SharedModel {
    loader: Box<dyn ModelLoader>,
    model: OnceCell<Arc<dyn LlmClient>>,
    inference_gate: Option<Mutex<()>>,
}

impl SharedModel {
    pub fn new(loader: impl ModelLoader + 'static, serialize_inference: bool) -> Self {
        Self {
            loader: Box::new(loader),
            model: OnceCell::new(),
            inference_gate: serialize_inference.then(|| Mutex::new(())),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn handle(&self) -> Result<&Arc<dyn LlmClient>> {
        self.model
            .get_or_try_init(|| async {
                info!(event_name = "chat.model.loading", "initializing language model runtime");
                self.loader.load().await
            })
            .await
    }
}

#[async_trait]
impl LlmClient for SharedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = self.handle().await?;
        let _permit = match &self.inference_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        model.complete(request).await
    }
}

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const START_HEADER: &str = "<|start_header_id|>";
const END_HEADER: &str = "<|end_header_id|>";

/// Role-delimited prompt layout understood by the deployed model.
pub fn render_chat_prompt(system: &str, user: &str) -> String {
    format!(
        "{BEGIN_OF_TEXT}{START_HEADER}system\n{system}\n{END_HEADER}\n\n\
         {START_HEADER}user\n{user}\n{END_HEADER}\n\n\
         {START_HEADER}assistant\n"
    )
}

fn control_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<\|.*?\|>").expect("control token pattern is valid"))
}

/// Removes `<|...|>` sentinels the runtime may echo back, then trims.
pub fn strip_control_tokens(raw: &str) -> String {
    control_token_pattern().replace_all(raw, "").trim().to_string()
}
