use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use tracechat_agent::composer::NO_PRODUCT_REPLY;
use tracechat_agent::{
    BackendGateway, CompletionRequest, ConversationOrchestrator, GenerationParams,
    InMemorySessionStore, InventoryApi, LlmClient, ProductExtractor, ResponseComposer,
    SessionStore, TurnRequest,
};
use tracechat_core::knowledge::FALLBACK_SENTENCE;
use tracechat_core::{ApplicationError, Intent, ProductName};

#[derive(Default)]
struct CountingModel {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl LlmClient for CountingModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("inference runtime unavailable");
        }
        Ok("NONE".to_string())
    }
}

#[derive(Default)]
struct StubInventory {
    quantity: u64,
    codes: Vec<String>,
    fail_quantity: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl InventoryApi for StubInventory {
    async fn company_for_user(&self, _user_id: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("empresa-1".to_string()))
    }

    async fn quantity(&self, _product: &ProductName, _company_id: &str) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quantity {
            anyhow::bail!("503 from backend");
        }
        Ok(self.quantity)
    }

    async fn codes(&self, _product: &ProductName, _company_id: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.codes.clone())
    }
}

struct Harness {
    orchestrator: ConversationOrchestrator,
    model: Arc<CountingModel>,
    inventory: Arc<StubInventory>,
}

impl Harness {
    fn new(model: CountingModel, inventory: StubInventory) -> Self {
        let model = Arc::new(model);
        let inventory = Arc::new(inventory);
        let gateway = BackendGateway::new(inventory.clone(), BackendGateway::DEFAULT_TIMEOUT);
        let extractor = ProductExtractor::new(model.clone(), GenerationParams::extraction(), 128);
        let composer =
            ResponseComposer::new(model.clone(), gateway.clone(), "RM Traceability SaaS", GenerationParams::default());
        let orchestrator =
            ConversationOrchestrator::new(Arc::new(InMemorySessionStore::default()), gateway, extractor, composer);
        Self { orchestrator, model, inventory }
    }

    fn model_calls(&self) -> usize {
        self.model.calls.load(Ordering::SeqCst)
    }

    fn backend_calls(&self) -> usize {
        self.inventory.calls.load(Ordering::SeqCst)
    }
}

fn turn(message: &str) -> TurnRequest {
    TurnRequest {
        message: message.to_string(),
        user_id: Some("usuario-1".to_string()),
        ..TurnRequest::default()
    }
}

#[tokio::test]
async fn out_of_domain_turns_use_fallback_without_dependencies() {
    let harness = Harness::new(CountingModel::default(), StubInventory::default());

    for message in ["Qual a capital da França?", "me conta uma piada", "bom dia"] {
        let outcome = harness.orchestrator.handle_turn(turn(message)).await.expect("turn");
        assert_eq!(outcome.intent, Intent::OutOfDomain);
        assert_eq!(outcome.reply, FALLBACK_SENTENCE);
    }

    assert_eq!(harness.model_calls(), 0);
    assert_eq!(harness.backend_calls(), 0);
}

#[tokio::test]
async fn inventory_quantity_is_answered_from_backend_only() {
    let harness = Harness::new(CountingModel::default(), StubInventory { quantity: 42, ..Default::default() });

    let outcome = harness
        .orchestrator
        .handle_turn(turn("quantos parafusos tenho no inventário"))
        .await
        .expect("turn");

    assert_eq!(outcome.intent, Intent::InventoryQty);
    assert!(outcome.reply.contains("42"));
    assert!(outcome.reply.contains("parafuso"));
    assert_eq!(harness.model_calls(), 0);
}

#[tokio::test]
async fn follow_up_reuses_last_product() {
    let harness = Harness::new(CountingModel::default(), StubInventory { quantity: 42, ..Default::default() });

    let first = harness
        .orchestrator
        .handle_turn(turn("quantos parafusos tenho no inventário"))
        .await
        .expect("first turn");
    assert_eq!(harness.model_calls(), 0);

    let follow_up = harness
        .orchestrator
        .handle_turn(turn("e no meu estoque?").with_session(first.session_id.as_str()))
        .await
        .expect("follow-up turn");

    assert_eq!(follow_up.session_id, first.session_id);
    assert_eq!(follow_up.intent, Intent::InventoryQty);
    assert_eq!(follow_up.reply, "Você tem 42 unidades de parafuso no estoque.");
    // The only model call is the extraction fallback, which answered NONE.
    assert_eq!(harness.model_calls(), 1);
}

#[tokio::test]
async fn zero_codes_message_differs_from_unknown_product() {
    let harness = Harness::new(CountingModel::default(), StubInventory::default());

    let empty = harness
        .orchestrator
        .handle_turn(turn("mostrar os códigos do parafuso"))
        .await
        .expect("codes turn");
    let unknown = harness.orchestrator.handle_turn(turn("quais códigos?")).await.expect("unknown turn");

    assert_eq!(empty.reply, "Nenhum código encontrado para 'parafuso'.");
    assert_eq!(unknown.reply, NO_PRODUCT_REPLY);
    assert_ne!(empty.reply, unknown.reply);
}

#[tokio::test]
async fn second_turn_appends_to_generated_session() {
    let harness = Harness::new(CountingModel::default(), StubInventory { quantity: 3, ..Default::default() });

    let first = harness.orchestrator.handle_turn(turn("quantas porcas tenho?")).await.expect("first");
    harness
        .orchestrator
        .handle_turn(turn("e no estoque?").with_session(first.session_id.as_str()))
        .await
        .expect("second");

    let sessions = harness.orchestrator.sessions();
    assert_eq!(sessions.len().await, 1);
    let session = sessions.get(&first.session_id).await.expect("session stored");
    assert_eq!(session.history.len(), 4);
    assert_eq!(session.exchange_count(), 2);
}

#[tokio::test]
async fn backend_failure_reports_zero_units() {
    let harness = Harness::new(
        CountingModel::default(),
        StubInventory { fail_quantity: true, ..Default::default() },
    );

    let outcome = harness
        .orchestrator
        .handle_turn(turn("quantos parafusos tenho no inventário"))
        .await
        .expect("turn still succeeds");

    assert_eq!(outcome.reply, "Você tem 0 unidades de parafuso no estoque.");
}

#[tokio::test]
async fn generation_failure_surfaces_and_is_not_persisted() {
    let harness = Harness::new(CountingModel { fail: true, ..Default::default() }, StubInventory::default());

    let error = harness
        .orchestrator
        .handle_turn(turn("Como acessar o inventário?").with_session("s-falha"))
        .await
        .expect_err("generation failure");

    assert!(matches!(error, ApplicationError::Generation(_)));
    let session = harness
        .orchestrator
        .sessions()
        .get(&tracechat_core::SessionId("s-falha".to_string()))
        .await
        .expect("session created");
    assert!(session.history.is_empty());
}
