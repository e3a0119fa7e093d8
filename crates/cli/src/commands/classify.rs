//! Offline routing preview: shows what the deterministic pipeline stages make of
//! an utterance without calling the backend or the language model.

use serde::Serialize;

use tracechat_agent::classifier::{is_domain_related, IntentClassifier};
use tracechat_agent::extractor::extract_deterministic;
use tracechat_core::knowledge::service_info_for;
use tracechat_core::text::normalize;
use tracechat_core::Intent;

use super::CommandResult;

#[derive(Debug, Serialize)]
pub struct ClassifyReport {
    pub normalized: String,
    pub domain_related: bool,
    pub intent: Intent,
    /// `None` means the regex tier found nothing; the server would ask the model next.
    pub product: Option<String>,
    pub service_snippets: Vec<&'static str>,
}

pub fn classify(utterance: &str) -> ClassifyReport {
    let normalized = normalize(utterance.trim());
    ClassifyReport {
        domain_related: is_domain_related(&normalized),
        intent: IntentClassifier::new().classify(&normalized),
        product: extract_deterministic(utterance).map(|product| product.0),
        service_snippets: service_info_for(&normalized),
        normalized,
    }
}

pub fn run(utterance: &str) -> CommandResult {
    if utterance.trim().is_empty() {
        return CommandResult::failure("classify", "empty_message", "Mensagem vazia.", 2);
    }
    CommandResult::with_result("classify", classify(utterance))
}
