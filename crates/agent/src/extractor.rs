use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, warn};

use tracechat_core::text::{normalize, sanitize_product};
use tracechat_core::ProductName;

use crate::llm::{CompletionRequest, GenerationParams, LlmClient};
use crate::matchers::{
    expresses_uncertainty, first_match, is_non_product_word, product_request, Matcher,
};

pub const NONE_SENTINEL: &str = "NONE";

const DETERMINISTIC_MATCHERS: &[Matcher<String>] =
    &[Matcher { name: "product_request", apply: match_product_request }];

fn match_product_request(normalized: &str) -> Option<String> {
    if expresses_uncertainty(normalized) {
        return None;
    }

    // A rejected capture may itself start the next construction ("mostre os codigos
    // do cabo"), so scanning resumes at the capture rather than after it.
    let mut start = 0;
    while let Some(captures) = product_request().captures_at(normalized, start) {
        let capture = captures.name("prod")?;
        let candidate = sanitize_product(capture.as_str());
        if !candidate.is_empty() && !is_non_product_word(&candidate) {
            return Some(candidate);
        }
        start = capture.start();
    }
    None
}

/// Deterministic tier only: never calls the model.
pub fn extract_deterministic(utterance: &str) -> Option<ProductName> {
    first_match(DETERMINISTIC_MATCHERS, &normalize(utterance))
        .and_then(|(_, candidate)| ProductName::new(candidate))
}

pub fn extraction_prompt(utterance: &str) -> String {
    format!(
        "Você receberá uma frase. \
         Se pedir códigos ou quantidade de um item, responda **somente** o nome do item \
         (singular, minúsculo, sem acento). Caso contrário responda \"{NONE_SENTINEL}\".\n\n\
         Frase: \"{}\"\nProduto:",
        utterance.trim()
    )
}

/// Finds the resource an utterance asks about.
///
/// Results are memoized per distinct utterance. Model failures degrade to "no
/// product" and are not cached, so a transient outage does not pin a miss.
pub struct ProductExtractor {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    cache: Mutex<LruCache<String, Option<ProductName>>>,
}

impl ProductExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, params: GenerationParams, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self { llm, params, cache: Mutex::new(LruCache::new(capacity)) }
    }

    pub async fn extract(&self, utterance: &str) -> Option<ProductName> {
        if let Some(cached) = self.cached(utterance) {
            return cached;
        }

        if let Some(product) = extract_deterministic(utterance) {
            debug!(event_name = "chat.extractor.regex_hit", product = %product, "regex captured product");
            self.remember(utterance, Some(product.clone()));
            return Some(product);
        }

        match self.extract_with_model(utterance).await {
            Ok(product) => {
                self.remember(utterance, product.clone());
                product
            }
            Err(error) => {
                warn!(
                    event_name = "chat.extractor.model_failed",
                    error = %error,
                    "product extraction fallback failed, treating as no product"
                );
                None
            }
        }
    }

    async fn extract_with_model(&self, utterance: &str) -> anyhow::Result<Option<ProductName>> {
        let request = CompletionRequest { prompt: extraction_prompt(utterance), params: self.params };
        let raw = self.llm.complete(&request).await?;
        debug!(event_name = "chat.extractor.model_raw", raw = %raw, "extractor model output");

        let cleaned = crate::llm::strip_control_tokens(&raw);
        let first_line = cleaned.lines().next().unwrap_or_default().trim();
        if first_line.is_empty() || first_line.to_ascii_uppercase().starts_with(NONE_SENTINEL) {
            return Ok(None);
        }

        let candidate = sanitize_product(first_line);
        if is_non_product_word(&candidate) {
            return Ok(None);
        }
        Ok(ProductName::new(candidate))
    }

    fn cached(&self, utterance: &str) -> Option<Option<ProductName>> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(utterance).cloned()
    }

    fn remember(&self, utterance: &str, product: Option<ProductName>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(utterance.to_string(), product);
        }
    }
}
