//! Reply composition per intent.
//!
//! `InventoryQty` and `ListCodes` replies are rendered from backend data with
//! fixed templates and never touch the model. Only `DomainInfo` generates text,
//! and that text passes through [`ReplyGuardrail`] before it is returned.

use std::sync::Arc;

use tracing::{debug, error, info};

use tracechat_core::knowledge::{
    service_info_for, FALLBACK_SENTENCE, FEW_SHOT_EXAMPLES, GROUNDED_ANSWER_INSTRUCTION,
    LANGUAGE_INSTRUCTION,
};
use tracechat_core::{ApplicationError, Intent, ProductName, Session};

use crate::gateway::BackendGateway;
use crate::guardrails::ReplyGuardrail;
use crate::llm::{render_chat_prompt, CompletionRequest, GenerationParams, LlmClient};

pub const NO_PRODUCT_REPLY: &str =
    "Desculpe, não consegui identificar o produto. Qual produto você quer consultar?";

pub const NO_COMPANY_REPLY: &str = "Não consegui identificar a sua empresa. \
     Informe o usuário ou a empresa para consultar o estoque.";

/// Turns of prior conversation included in generated prompts.
const HISTORY_TURNS: usize = 6;

pub fn quantity_sentence(quantity: u64, product: &ProductName) -> String {
    format!("Você tem {quantity} unidades de {product} no estoque.")
}

pub fn codes_reply(product: &ProductName, codes: &[String]) -> String {
    if codes.is_empty() {
        return format!("Nenhum código encontrado para '{product}'.");
    }
    format!("Códigos para '{product}':\n{}", codes.join("\n"))
}

/// Everything the composer needs to answer one turn.
#[derive(Clone, Copy, Debug)]
pub struct ComposeRequest<'a> {
    pub intent: Intent,
    pub utterance: &'a str,
    pub normalized: &'a str,
    pub session: &'a Session,
    pub company_id: Option<&'a str>,
    pub product: Option<&'a ProductName>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composition {
    pub reply: String,
    /// Set when the reply listed codes (zero included).
    pub codes_shown: Option<usize>,
    pub used_model: bool,
}

impl Composition {
    fn deterministic(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), codes_shown: None, used_model: false }
    }
}

pub struct ResponseComposer {
    llm: Arc<dyn LlmClient>,
    gateway: BackendGateway,
    system_context: String,
    params: GenerationParams,
    guardrail: ReplyGuardrail,
}

impl ResponseComposer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        gateway: BackendGateway,
        system_context: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            llm,
            gateway,
            system_context: system_context.into(),
            params,
            guardrail: ReplyGuardrail::default(),
        }
    }

    pub async fn compose(&self, request: ComposeRequest<'_>) -> Result<Composition, ApplicationError> {
        match request.intent {
            Intent::OutOfDomain => Ok(Composition::deterministic(FALLBACK_SENTENCE)),
            Intent::InventoryQty => Ok(self.compose_quantity(request).await),
            Intent::ListCodes => Ok(self.compose_codes(request).await),
            Intent::DomainInfo => self.compose_domain_info(request).await,
        }
    }

    async fn compose_quantity(&self, request: ComposeRequest<'_>) -> Composition {
        let Some(product) = request.product else {
            return Composition::deterministic(NO_PRODUCT_REPLY);
        };
        let Some(company_id) = request.company_id else {
            return Composition::deterministic(NO_COMPANY_REPLY);
        };
        let quantity = self.gateway.quantity(product, company_id).await;
        Composition::deterministic(quantity_sentence(quantity, product))
    }

    async fn compose_codes(&self, request: ComposeRequest<'_>) -> Composition {
        let Some(product) = request.product else {
            return Composition::deterministic(NO_PRODUCT_REPLY);
        };
        let Some(company_id) = request.company_id else {
            return Composition::deterministic(NO_COMPANY_REPLY);
        };
        let codes = self.gateway.codes(product, company_id).await;
        Composition { reply: codes_reply(product, &codes), codes_shown: Some(codes.len()), used_model: false }
    }

    async fn compose_domain_info(&self, request: ComposeRequest<'_>) -> Result<Composition, ApplicationError> {
        let system = self.system_block(request.normalized, request.session);

        // A navigation question still gets grounded on the product the session last discussed.
        let grounded_product = request.product.or(request.session.last_product.as_ref());

        let mut user = request.utterance.trim().to_string();
        if let (Some(product), Some(company_id)) = (grounded_product, request.company_id) {
            let quantity = self.gateway.quantity(product, company_id).await;
            user.push_str(&format!(
                "\n[Resposta do BD: {}]\n{GROUNDED_ANSWER_INSTRUCTION}",
                quantity_sentence(quantity, product)
            ));
        }

        let completion = CompletionRequest { prompt: render_chat_prompt(&system, &user), params: self.params };
        let raw = self.llm.complete(&completion).await.map_err(|err| {
            error!(
                event_name = "chat.compose.generation_failed",
                session_id = %request.session.id,
                error = %err,
                "language model completion failed"
            );
            ApplicationError::Generation(err.to_string())
        })?;
        debug!(event_name = "chat.compose.model_raw", raw = %raw, "domain info completion");

        let decision = self.guardrail.evaluate(&raw, grounded_product);
        if let Some(reason_code) = decision.reason_code() {
            info!(
                event_name = "chat.compose.fallback",
                session_id = %request.session.id,
                reason_code,
                "model reply replaced with fallback sentence"
            );
        }
        Ok(Composition { reply: decision.into_reply(), codes_shown: None, used_model: true })
    }

    fn system_block(&self, normalized: &str, session: &Session) -> String {
        let mut sections = vec![self.system_context.clone(), FEW_SHOT_EXAMPLES.to_string()];
        let snippets = service_info_for(normalized);
        if !snippets.is_empty() {
            sections.push(snippets.join("\n"));
        }
        if session.has_history() {
            sections.push(format!("Histórico recente:\n{}", session.transcript(HISTORY_TURNS)));
        }
        sections.push(LANGUAGE_INSTRUCTION.to_string());
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;

    use tracechat_core::knowledge::FALLBACK_SENTENCE;
    use tracechat_core::text::normalize;
    use tracechat_core::{ApplicationError, Intent, ProductName, Session, SessionId};

    use crate::gateway::{BackendGateway, InventoryApi};
    use crate::llm::{CompletionRequest, GenerationParams, LlmClient};

    use super::{ComposeRequest, ResponseComposer, NO_COMPANY_REPLY, NO_PRODUCT_REPLY};

    struct RecordingModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: Err("runtime crashed".to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for RecordingModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().expect("prompts lock").push(request.prompt.clone());
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    struct FixedInventory {
        quantity: u64,
        codes: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InventoryApi for FixedInventory {
        async fn company_for_user(&self, _user_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some("c-1".to_string()))
        }

        async fn quantity(&self, _product: &ProductName, _company_id: &str) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.quantity)
        }

        async fn codes(&self, _product: &ProductName, _company_id: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.codes.clone())
        }
    }

    fn composer(model: Arc<RecordingModel>, codes: &[&str]) -> (ResponseComposer, Arc<FixedInventory>) {
        let inventory = Arc::new(FixedInventory {
            quantity: 42,
            codes: codes.iter().map(|code| code.to_string()).collect(),
            calls: AtomicUsize::new(0),
        });
        let gateway = BackendGateway::new(inventory.clone(), BackendGateway::DEFAULT_TIMEOUT);
        let composer =
            ResponseComposer::new(model, gateway, "RM Traceability SaaS.", GenerationParams::default());
        (composer, inventory)
    }

    fn request<'a>(
        intent: Intent,
        utterance: &'a str,
        normalized: &'a str,
        session: &'a Session,
        product: Option<&'a ProductName>,
    ) -> ComposeRequest<'a> {
        ComposeRequest { intent, utterance, normalized, session, company_id: Some("c-1"), product }
    }

    #[tokio::test]
    async fn quantity_reply_is_templated_without_the_model() {
        let model = RecordingModel::replying("ignored");
        let (composer, _) = composer(model.clone(), &[]);
        let session = Session::new(SessionId("s".to_string()));
        let product = ProductName::new("parafuso");

        let composition = composer
            .compose(request(Intent::InventoryQty, "quantos?", "quantos?", &session, product.as_ref()))
            .await
            .expect("compose");

        assert_eq!(composition.reply, "Você tem 42 unidades de parafuso no estoque.");
        assert!(!composition.used_model);
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn missing_product_and_company_ask_for_clarification() {
        let (composer, inventory) = composer(RecordingModel::replying("x"), &[]);
        let session = Session::new(SessionId("s".to_string()));

        let no_product = composer
            .compose(request(Intent::InventoryQty, "quantos tenho?", "quantos tenho?", &session, None))
            .await
            .expect("compose");
        assert_eq!(no_product.reply, NO_PRODUCT_REPLY);

        let product = ProductName::new("porca");
        let mut no_company = request(Intent::ListCodes, "codigos", "codigos", &session, product.as_ref());
        no_company.company_id = None;
        assert_eq!(composer.compose(no_company).await.expect("compose").reply, NO_COMPANY_REPLY);

        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_code_list_differs_from_unknown_product() {
        let (composer, _) = composer(RecordingModel::replying("x"), &[]);
        let session = Session::new(SessionId("s".to_string()));
        let product = ProductName::new("porca");

        let composition = composer
            .compose(request(Intent::ListCodes, "codigos da porca", "codigos da porca", &session, product.as_ref()))
            .await
            .expect("compose");

        assert_eq!(composition.reply, "Nenhum código encontrado para 'porca'.");
        assert_ne!(composition.reply, NO_PRODUCT_REPLY);
        assert_eq!(composition.codes_shown, Some(0));
    }

    #[tokio::test]
    async fn code_list_is_rendered_one_per_line() {
        let (composer, _) = composer(RecordingModel::replying("x"), &["QR-1", "QR-2"]);
        let session = Session::new(SessionId("s".to_string()));
        let product = ProductName::new("porca");

        let composition = composer
            .compose(request(Intent::ListCodes, "codigos da porca", "codigos da porca", &session, product.as_ref()))
            .await
            .expect("compose");

        assert_eq!(composition.reply, "Códigos para 'porca':\nQR-1\nQR-2");
        assert_eq!(composition.codes_shown, Some(2));
    }

    #[tokio::test]
    async fn domain_info_prompt_carries_grounding_and_backend_fact() {
        let model = RecordingModel::replying("Acesse '/dashboard/codigos/inventory'.<|eot_id|>");
        let (composer, _) = composer(model.clone(), &[]);
        let mut session = Session::new(SessionId("s".to_string()));
        session.record_exchange("quantos parafusos tenho", "Você tem 42 unidades de parafuso no estoque.");
        let product = ProductName::new("parafuso");
        let utterance = "Como acessar o inventário desse produto?";
        let normalized = normalize(utterance);

        let composition = composer
            .compose(request(Intent::DomainInfo, utterance, &normalized, &session, product.as_ref()))
            .await
            .expect("compose");

        assert_eq!(composition.reply, "Acesse '/dashboard/codigos/inventory'.");
        assert!(composition.used_model);

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("RM Traceability SaaS."));
        assert!(prompt.contains("Inventário: Gerencie e visualize seu estoque."));
        assert!(prompt.contains("Usuário: quantos parafusos tenho"));
        assert!(prompt.contains("português do Brasil"));
        assert!(prompt.contains("[Resposta do BD: Você tem 42 unidades de parafuso no estoque.]"));
        assert!(prompt.contains("[Responda **apenas** com base nesses dados.]"));
    }

    #[tokio::test]
    async fn domain_info_falls_back_to_session_product_for_grounding() {
        let model = RecordingModel::replying("Veja em /dashboard/codigos/movements.");
        let (composer, inventory) = composer(model.clone(), &[]);
        let mut session = Session::new(SessionId("s".to_string()));
        session.record_exchange("quantas porcas tenho", "Você tem 42 unidades de porca no estoque.");
        session.last_product = ProductName::new("porca");
        let utterance = "Onde registro movimentações?";
        let normalized = normalize(utterance);

        composer
            .compose(request(Intent::DomainInfo, utterance, &normalized, &session, None))
            .await
            .expect("compose");

        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
        assert!(model.prompts()[0].contains("[Resposta do BD: Você tem 42 unidades de porca no estoque.]"));
    }

    #[tokio::test]
    async fn off_domain_completion_is_replaced_by_fallback() {
        let (composer, _) = composer(RecordingModel::replying("Não."), &[]);
        let session = Session::new(SessionId("s".to_string()));

        let composition = composer
            .compose(request(Intent::DomainInfo, "como vejo o status?", "como vejo o status?", &session, None))
            .await
            .expect("compose");

        assert_eq!(composition.reply, FALLBACK_SENTENCE);
    }

    #[tokio::test]
    async fn generation_failure_is_surfaced() {
        let (composer, _) = composer(RecordingModel::failing(), &[]);
        let session = Session::new(SessionId("s".to_string()));

        let error = composer
            .compose(request(Intent::DomainInfo, "como vejo o status?", "como vejo o status?", &session, None))
            .await
            .expect_err("generation should fail");

        assert!(matches!(error, ApplicationError::Generation(message) if message.contains("runtime crashed")));
    }

    #[tokio::test]
    async fn out_of_domain_is_the_fixed_sentence() {
        let model = RecordingModel::replying("x");
        let (composer, inventory) = composer(model.clone(), &[]);
        let session = Session::new(SessionId("s".to_string()));

        let composition = composer
            .compose(request(Intent::OutOfDomain, "piada", "piada", &session, None))
            .await
            .expect("compose");

        assert_eq!(composition.reply, FALLBACK_SENTENCE);
        assert!(model.prompts().is_empty());
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
    }
}
