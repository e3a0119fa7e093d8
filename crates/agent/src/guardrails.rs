use tracechat_core::knowledge::{FALLBACK_SENTENCE, SERVICE_INFO};
use tracechat_core::text::normalize;
use tracechat_core::ProductName;

use crate::llm::strip_control_tokens;

/// Bare negatives the model emits when it has nothing useful to say.
const NEGATION_ONLY: &[&str] = &["nao", "no", "none", "nada", "nenhum", "null", "n/a"];

const NAVIGATION_MARKERS: &[&str] = &["/dashboard", "rm traceability"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow(String),
    Degrade { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    pub fn into_reply(self) -> String {
        match self {
            Self::Allow(reply) => reply,
            Self::Degrade { user_message, .. } => user_message,
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow(_) => None,
            Self::Degrade { reason_code, .. } => Some(reason_code),
        }
    }
}

/// Post-generation checks on free-form model output. A rejected completion is
/// replaced with the fixed fallback sentence; it is never an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplyGuardrail;

impl ReplyGuardrail {
    pub fn evaluate(&self, raw: &str, product: Option<&ProductName>) -> GuardrailDecision {
        let reply = strip_control_tokens(raw);
        if reply.is_empty() {
            return fallback("empty_completion");
        }

        let normalized = normalize(&reply);
        let bare = normalized.trim_matches(|c: char| !c.is_alphanumeric() && c != '/');
        if NEGATION_ONLY.contains(&bare) {
            return fallback("negation_only");
        }

        if !references_domain(&normalized, product) {
            return fallback("missing_domain_reference");
        }

        GuardrailDecision::Allow(reply)
    }
}

fn fallback(reason_code: &'static str) -> GuardrailDecision {
    GuardrailDecision::Degrade { reason_code, user_message: FALLBACK_SENTENCE.to_string() }
}

fn references_domain(normalized_reply: &str, product: Option<&ProductName>) -> bool {
    NAVIGATION_MARKERS.iter().any(|marker| normalized_reply.contains(marker))
        || SERVICE_INFO.iter().any(|info| normalized_reply.contains(info.keyword))
        || product.is_some_and(|product| normalized_reply.contains(product.as_str()))
}
