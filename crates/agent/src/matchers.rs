//! Ordered, pure text matchers shared by product extraction, intent
//! classification and reference resolution. Every matcher receives text that
//! already went through [`tracechat_core::text::normalize`].

use std::sync::OnceLock;

use regex::Regex;

use tracechat_core::text::sanitize_product;

/// A named pure function from normalized text to an optional result.
pub struct Matcher<T> {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<T>,
}

/// Runs matchers in order and returns the first hit together with the matcher's name.
pub fn first_match<T>(matchers: &[Matcher<T>], normalized: &str) -> Option<(&'static str, T)> {
    matchers
        .iter()
        .find_map(|matcher| (matcher.apply)(normalized).map(|value| (matcher.name, value)))
}

macro_rules! pattern {
    ($name:ident, $regex:expr) => {
        pub fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($regex).expect("static pattern is valid"))
        }
    };
}

// "quantos/tenho/mostrar/ver/codigos do <PRODUCT>", optionally followed by
// "no meu inventario/estoque/produto", which never influences the capture.
pattern!(
    product_request,
    r"\b(?:quant(?:os|as|idade)?|qtde?|tem|tenho|possui(?:mos)?|mostrar|mostre|ver|listar|liste|codigos?\s+(?:do|da|de|dos|das))(?:\s+(?:do|da|de|dos|das|o|a|os|as))?\s+(?P<prod>\w{2,})"
);

pattern!(
    domain_keyword,
    r"\b(?:quant(?:os|as|idade)?|qtde?|tem|tenho|possui(?:mos)?|codigos?|inventario|estoque|empresas?|moviment\w*|produtos?|lotes?|status|rastre\w*|configura\w*|usuarios?)\b"
);

pattern!(quantity_query, r"\b(?:quant(?:os|as|idade)?|qtde?|tem|tenho|possui(?:mos)?)\b");

pattern!(codes_query, r"\bcodigos?\b");

pattern!(
    anaphoric_cue,
    r"\b(?:ele|ela|eles|elas|isso|isto|esse|essa|esses|essas|este|desse|dessa|deste|dele|dela|deles|delas|mesmo|mesma|o produto|do produto)\b"
);

pattern!(continuation, r"^\s*e\s+\S");

/// Words a capture group can land on that never name an inventory resource.
const NON_PRODUCT_WORDS: &[&str] = &[
    "eu", "voce", "voces", "nos", "ele", "ela", "isso", "isto", "esse", "essa", "meu", "minha",
    "meus", "minhas", "nosso", "nossa", "no", "na", "nas", "em", "um", "uma", "tem",
    "tenho", "temos", "mais", "ainda", "todos", "todas", "inventario", "estoque", "produto",
    "produtos", "codigo", "codigos", "item", "itens", "unidades", "quantidade", "sistema",
];

/// Matches raw and singularized forms alike, so "unidades" and "unidade" are both rejected.
pub fn is_non_product_word(word: &str) -> bool {
    let singular = sanitize_product(word);
    NON_PRODUCT_WORDS
        .iter()
        .any(|stop| *stop == word || *stop == singular || sanitize_product(stop) == singular)
}

/// "nao sei ..." utterances are never product requests.
pub fn expresses_uncertainty(normalized: &str) -> bool {
    normalized.contains("nao sei")
}

pub fn is_continuation(normalized: &str) -> bool {
    continuation().is_match(normalized)
}

#[cfg(test)]
mod tests {
    use super::{
        anaphoric_cue, codes_query, domain_keyword, first_match, is_continuation,
        is_non_product_word, product_request, quantity_query, Matcher,
    };

    #[test]
    fn first_match_respects_order() {
        let matchers = [
            Matcher { name: "never", apply: |_| None::<u8> },
            Matcher { name: "digits", apply: |text| text.parse::<u8>().ok() },
            Matcher { name: "always", apply: |_| Some(0) },
        ];

        assert_eq!(first_match(&matchers, "7"), Some(("digits", 7)));
        assert_eq!(first_match(&matchers, "x"), Some(("always", 0)));
        assert_eq!(first_match::<u8>(&[], "x"), None);
    }

    #[test]
    fn product_request_captures_across_phrasings() {
        let cases = [
            ("quantos parafusos tenho no inventario", "parafusos"),
            ("tenho porcas no meu estoque?", "porcas"),
            ("qual a quantidade de arruelas", "arruelas"),
            ("quais os codigos do parafuso", "parafuso"),
            ("codigos das luvas", "luvas"),
            ("possuimos cabos?", "cabos"),
        ];

        for (text, expected) in cases {
            let captured = product_request()
                .captures(text)
                .and_then(|captures| captures.name("prod"))
                .map(|m| m.as_str());
            assert_eq!(captured, Some(expected), "utterance: {text}");
        }
    }

    #[test]
    fn keywords_do_not_fire_inside_words() {
        assert!(!quantity_query().is_match("o sistema temporariamente caiu"));
        assert!(!product_request().is_match("verificar inventario"));
        assert!(domain_keyword().is_match("onde ficam as movimentacoes"));
        assert!(!domain_keyword().is_match("qual a capital da franca?"));
    }

    #[test]
    fn codes_and_cues() {
        assert!(codes_query().is_match("quais codigos tenho"));
        assert!(anaphoric_cue().is_match("quantos disso? e dele?"));
        assert!(is_continuation("e no meu estoque?"));
        assert!(!is_continuation("entao, como faco?"));
    }

    #[test]
    fn stop_words_match_after_singularization() {
        for word in ["unidades", "unidade", "itens", "iten", "todos", "todo", "mais", "mai", "codigo"] {
            assert!(is_non_product_word(word), "word: {word}");
        }
        for word in ["parafuso", "porca", "luva"] {
            assert!(!is_non_product_word(word), "word: {word}");
        }
    }
}
