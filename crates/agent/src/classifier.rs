use tracing::debug;

use tracechat_core::Intent;

use crate::matchers::{codes_query, domain_keyword, first_match, is_continuation, quantity_query, Matcher};

/// Evaluation order is the routing policy: first hit wins, `DomainInfo` otherwise.
const INTENT_MATCHERS: &[Matcher<Intent>] = &[
    Matcher { name: "out_of_domain", apply: match_out_of_domain },
    Matcher { name: "quantity_query", apply: match_quantity },
    Matcher { name: "codes_query", apply: match_codes },
];

fn match_out_of_domain(normalized: &str) -> Option<Intent> {
    (!is_domain_related(normalized)).then_some(Intent::OutOfDomain)
}

fn match_quantity(normalized: &str) -> Option<Intent> {
    let asks_quantity = quantity_query().is_match(normalized);
    // "e no meu estoque?" continues the previous quantity question.
    let follow_up = is_continuation(normalized) && !codes_query().is_match(normalized);
    (asks_quantity || follow_up).then_some(Intent::InventoryQty)
}

fn match_codes(normalized: &str) -> Option<Intent> {
    codes_query().is_match(normalized).then_some(Intent::ListCodes)
}

/// True when the utterance touches any domain keyword family or continues the previous turn.
pub fn is_domain_related(normalized: &str) -> bool {
    domain_keyword().is_match(normalized) || is_continuation(normalized)
}

#[derive(Clone, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, normalized: &str) -> Intent {
        match first_match(INTENT_MATCHERS, normalized) {
            Some((matcher, intent)) => {
                debug!(event_name = "chat.classifier.matched", matcher, intent = %intent, "intent classified");
                intent
            }
            None => Intent::DomainInfo,
        }
    }
}

#[cfg(test)]
mod tests {
    use tracechat_core::text::normalize;
    use tracechat_core::Intent;

    use super::{is_domain_related, IntentClassifier};

    fn classify(text: &str) -> Intent {
        IntentClassifier::new().classify(&normalize(text))
    }

    #[test]
    fn utterances_without_domain_keywords_are_out_of_domain() {
        for text in ["Qual a capital da França?", "me conte uma piada", "bom dia!", ""] {
            assert_eq!(classify(text), Intent::OutOfDomain, "utterance: {text}");
        }
    }

    #[test]
    fn quantity_verbs_route_to_inventory() {
        assert_eq!(classify("quantos parafusos tenho no inventário"), Intent::InventoryQty);
        assert_eq!(classify("Qual a quantidade de porcas?"), Intent::InventoryQty);
        assert_eq!(classify("e no meu estoque?"), Intent::InventoryQty);
    }

    #[test]
    fn quantity_wins_over_codes_when_both_present() {
        assert_eq!(classify("tenho códigos de parafuso?"), Intent::InventoryQty);
    }

    #[test]
    fn codes_requests_route_to_list_codes() {
        assert_eq!(classify("mostrar os códigos do parafuso"), Intent::ListCodes);
        assert_eq!(classify("e os códigos?"), Intent::ListCodes);
    }

    #[test]
    fn navigation_questions_are_domain_info() {
        assert_eq!(classify("Como acessar o inventário?"), Intent::DomainInfo);
        assert_eq!(classify("Onde vejo o rastreamento das movimentações?"), Intent::DomainInfo);
        assert_eq!(classify("como gerar um lote de QR?"), Intent::DomainInfo);
    }

    #[test]
    fn continuation_is_domain_related_even_without_keywords() {
        assert!(is_domain_related("e parafusos?"));
        assert!(!is_domain_related("parafusos?"));
    }
}
