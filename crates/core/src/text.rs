//! Text normalization shared by every matcher in the routing pipeline.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-cases and strips combining marks; every other character survives as-is.
pub fn normalize(text: &str) -> String {
    text.nfd().filter(|ch| !is_combining_mark(*ch)).collect::<String>().to_lowercase()
}

/// Turns a raw mention (regex capture or model output) into the backend's resource key.
///
/// Non `[a-z0-9 -]` characters are dropped and a trailing plural `s` is removed when the
/// word is longer than three characters. The length guard is a heuristic: short names
/// ending in `s` survive, longer genuine names ending in `s` are still clipped.
pub fn sanitize_product(raw: &str) -> String {
    let ascii = normalize(raw)
        .chars()
        .filter(|ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-' || ch.is_whitespace()
        })
        .collect::<String>();
    let trimmed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");

    if trimmed.len() > 3 {
        if let Some(singular) = trimmed.strip_suffix('s') {
            return singular.to_string();
        }
    }
    trimmed
}
