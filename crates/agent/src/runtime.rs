use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use tracechat_core::text::normalize;
use tracechat_core::{ApplicationError, DomainError, Intent, SessionId};

use crate::advisor::{AdvisorSignals, NextAction, NextActionAdvisor};
use crate::classifier::IntentClassifier;
use crate::composer::{ComposeRequest, ResponseComposer};
use crate::extractor::ProductExtractor;
use crate::gateway::BackendGateway;
use crate::reference::resolve_reference;
use crate::session::SessionStore;

/// One inbound chat turn. `message` must be non-empty after trimming.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub company_id: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub session_id: SessionId,
    pub intent: Intent,
    pub next_action: Option<NextAction>,
}

/// Pipeline stages of a turn, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStage {
    IdentifySession,
    ResolveCompany,
    ExtractProduct,
    ResolveReference,
    ClassifyIntent,
    Compose,
    Persist,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentifySession => "identify_session",
            Self::ResolveCompany => "resolve_company",
            Self::ExtractProduct => "extract_product",
            Self::ResolveReference => "resolve_reference",
            Self::ClassifyIntent => "classify_intent",
            Self::Compose => "compose",
            Self::Persist => "persist",
        }
    }
}

const ADVISOR_TIMEOUT: Duration = Duration::from_millis(250);

/// Runs one conversational turn end to end and owns the session lifecycle.
pub struct ConversationOrchestrator {
    sessions: Arc<dyn SessionStore>,
    gateway: BackendGateway,
    extractor: ProductExtractor,
    classifier: IntentClassifier,
    composer: ResponseComposer,
    advisor: Option<Arc<dyn NextActionAdvisor>>,
}

impl ConversationOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        gateway: BackendGateway,
        extractor: ProductExtractor,
        composer: ResponseComposer,
    ) -> Self {
        Self { sessions, gateway, extractor, classifier: IntentClassifier::new(), composer, advisor: None }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn NextActionAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, ApplicationError> {
        let utterance = request.message.trim();
        if utterance.is_empty() {
            return Err(DomainError::EmptyMessage.into());
        }

        trace_stage(TurnStage::IdentifySession);
        let handle = self.sessions.get_or_create(request.session_id.as_deref()).await;
        // Held until the turn is persisted: turns on one session never interleave.
        let mut session = handle.lock().await;
        let session_id = session.id.clone();

        let normalized = normalize(utterance);
        let in_domain = crate::classifier::is_domain_related(&normalized);

        trace_stage(TurnStage::ResolveCompany);
        let company_id = match (request.company_id, request.user_id.as_deref()) {
            (Some(company_id), _) => Some(company_id),
            (None, Some(user_id)) if in_domain => self.gateway.resolve_company(user_id).await,
            _ => None,
        };

        trace_stage(TurnStage::ExtractProduct);
        let extracted = if in_domain { self.extractor.extract(utterance).await } else { None };

        trace_stage(TurnStage::ResolveReference);
        let product = if in_domain { resolve_reference(extracted, &normalized, &session) } else { None };

        trace_stage(TurnStage::ClassifyIntent);
        let intent = self.classifier.classify(&normalized);

        trace_stage(TurnStage::Compose);
        let composition = self
            .composer
            .compose(ComposeRequest {
                intent,
                utterance,
                normalized: &normalized,
                session: &session,
                company_id: company_id.as_deref(),
                product: product.as_ref(),
            })
            .await?;

        trace_stage(TurnStage::Persist);
        session.record_exchange(utterance, composition.reply.as_str());
        if let Some(product) = &product {
            session.last_product = Some(product.clone());
        }
        if let Some(count) = composition.codes_shown {
            session.last_code_count = Some(count);
        }
        let signals = AdvisorSignals {
            code_count: session.last_code_count.unwrap_or(0),
            exchange_count: session.exchange_count(),
        };
        drop(session);

        let next_action = self.advise(&session_id, signals).await;

        info!(
            event_name = "chat.turn.completed",
            session_id = %session_id,
            intent = %intent,
            product = product.as_ref().map(|p| p.as_str()).unwrap_or(""),
            used_model = composition.used_model,
            "chat turn completed"
        );

        Ok(TurnOutcome { reply: composition.reply, session_id, intent, next_action })
    }

    async fn advise(&self, session_id: &SessionId, signals: AdvisorSignals) -> Option<NextAction> {
        let advisor = self.advisor.as_ref()?;
        match tokio::time::timeout(ADVISOR_TIMEOUT, advisor.predict(signals)).await {
            Ok(Ok(action)) => {
                debug!(
                    event_name = "chat.advisor.hint",
                    session_id = %session_id,
                    next_action = action.as_str(),
                    "next action predicted"
                );
                Some(action)
            }
            Ok(Err(error)) => {
                warn!(event_name = "chat.advisor.failed", session_id = %session_id, error = %error, "advisor failed");
                None
            }
            Err(_) => {
                warn!(event_name = "chat.advisor.timed_out", session_id = %session_id, "advisor timed out");
                None
            }
        }
    }
}

fn trace_stage(stage: TurnStage) {
    debug!(event_name = "chat.turn.stage", stage = stage.as_str(), "entering turn stage");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use tracechat_core::{ApplicationError, DomainError, Intent, ProductName, SessionId};

    use crate::advisor::{AdvisorSignals, HeuristicAdvisor, NextAction, NextActionAdvisor};
    use crate::composer::ResponseComposer;
    use crate::extractor::ProductExtractor;
    use crate::gateway::{BackendGateway, InventoryApi};
    use crate::llm::{CompletionRequest, GenerationParams, LlmClient};
    use crate::session::{InMemorySessionStore, SessionStore};

    use super::{ConversationOrchestrator, TurnRequest};

    struct CannedModel;

    #[async_trait]
    impl LlmClient for CannedModel {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok("NONE".to_string())
        }
    }

    struct Inventory;

    #[async_trait]
    impl InventoryApi for Inventory {
        async fn company_for_user(&self, user_id: &str) -> Result<Option<String>> {
            Ok((user_id == "u-1").then(|| "c-1".to_string()))
        }

        async fn quantity(&self, _product: &ProductName, company_id: &str) -> Result<u64> {
            Ok(if company_id == "c-1" { 7 } else { 0 })
        }

        async fn codes(&self, _product: &ProductName, _company_id: &str) -> Result<Vec<String>> {
            Ok(vec!["QR-1".to_string(), "QR-2".to_string()])
        }
    }

    struct BrokenAdvisor;

    #[async_trait]
    impl NextActionAdvisor for BrokenAdvisor {
        async fn predict(&self, _signals: AdvisorSignals) -> Result<NextAction> {
            anyhow::bail!("model.pkl missing")
        }
    }

    fn orchestrator() -> ConversationOrchestrator {
        let llm: Arc<dyn LlmClient> = Arc::new(CannedModel);
        let gateway = BackendGateway::new(Arc::new(Inventory), BackendGateway::DEFAULT_TIMEOUT);
        let extractor = ProductExtractor::new(llm.clone(), GenerationParams::extraction(), 64);
        let composer = ResponseComposer::new(llm, gateway.clone(), "ctx", GenerationParams::default());
        ConversationOrchestrator::new(
            Arc::new(InMemorySessionStore::default()),
            gateway,
            extractor,
            composer,
        )
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_touching_sessions() {
        let orchestrator = orchestrator();
        let error = orchestrator.handle_turn(TurnRequest::new("   ")).await.expect_err("rejected");
        assert_eq!(error, ApplicationError::Domain(DomainError::EmptyMessage));
        assert_eq!(orchestrator.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn company_is_resolved_from_user_id() {
        let orchestrator = orchestrator();
        let request = TurnRequest {
            message: "quantos parafusos tenho no estoque?".to_string(),
            user_id: Some("u-1".to_string()),
            ..TurnRequest::default()
        };

        let outcome = orchestrator.handle_turn(request).await.expect("turn");
        assert_eq!(outcome.intent, Intent::InventoryQty);
        assert_eq!(outcome.reply, "Você tem 7 unidades de parafuso no estoque.");
    }

    #[tokio::test]
    async fn persisted_state_tracks_product_and_code_count() {
        let orchestrator = orchestrator();
        let request = TurnRequest {
            message: "mostrar os códigos do parafuso".to_string(),
            company_id: Some("c-1".to_string()),
            ..TurnRequest::default()
        };

        let outcome = orchestrator.handle_turn(request).await.expect("turn");
        assert_eq!(outcome.intent, Intent::ListCodes);

        let session = orchestrator.sessions().get(&outcome.session_id).await.expect("stored");
        assert_eq!(session.last_product, ProductName::new("parafuso"));
        assert_eq!(session.last_code_count, Some(2));
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn advisor_hint_is_attached_without_changing_reply() {
        let orchestrator = orchestrator().with_advisor(Arc::new(HeuristicAdvisor::default()));
        let outcome = orchestrator
            .handle_turn(TurnRequest::new("bom dia").with_session("s-hint"))
            .await
            .expect("turn");

        assert_eq!(outcome.session_id, SessionId("s-hint".to_string()));
        assert_eq!(outcome.next_action, Some(NextAction::Inventario));
        assert_eq!(outcome.intent, Intent::OutOfDomain);
    }

    #[tokio::test]
    async fn failing_advisor_is_ignored() {
        let plain = orchestrator().handle_turn(TurnRequest::new("bom dia")).await.expect("turn");
        let advised = orchestrator()
            .with_advisor(Arc::new(BrokenAdvisor))
            .handle_turn(TurnRequest::new("bom dia"))
            .await
            .expect("turn");

        assert_eq!(advised.reply, plain.reply);
        assert_eq!(advised.next_action, None);
    }
}
