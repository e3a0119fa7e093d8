use std::sync::OnceLock;

use regex::Regex;

use tracechat_core::text::sanitize_product;
use tracechat_core::{ProductName, Session};

use crate::matchers::{anaphoric_cue, is_continuation, is_non_product_word};

fn elliptical_product() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*e\s+(?P<word>[a-z][a-z-]*)\s*[?!.]*\s*$").expect("elliptical pattern is valid")
    })
}

/// "e porcas?" after an earlier exchange names a new product on its own.
fn elliptical_mention(normalized: &str, session: &Session) -> Option<ProductName> {
    if !session.has_history() {
        return None;
    }
    let word = elliptical_product().captures(normalized)?.name("word")?.as_str();
    let candidate = sanitize_product(word);
    if is_non_product_word(&candidate) {
        return None;
    }
    ProductName::new(candidate)
}

/// Fills in the product for a turn that did not name one, using session memory.
///
/// An explicit mention always wins. Otherwise an elliptical "e <palavra>" names
/// the product directly, and an anaphoric cue or continuation falls back to the
/// session's `last_product`.
pub fn resolve_reference(
    extracted: Option<ProductName>,
    normalized: &str,
    session: &Session,
) -> Option<ProductName> {
    if extracted.is_some() {
        return extracted;
    }
    if let Some(product) = elliptical_mention(normalized, session) {
        return Some(product);
    }
    if anaphoric_cue().is_match(normalized) || is_continuation(normalized) {
        return session.last_product.clone();
    }
    None
}
