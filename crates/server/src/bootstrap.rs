use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tracechat_agent::{
    BackendGateway, ConversationOrchestrator, EvictionPolicy, GenerationParams, HeuristicAdvisor,
    InMemorySessionStore, ProductExtractor, ResponseComposer, SessionStore, SharedModel,
};
use tracechat_core::config::{AppConfig, ConfigError, LlmConfig, LoadOptions};
use tracechat_core::knowledge::load_system_context;

use crate::backend::HttpInventoryApi;
use crate::llm_runtime::RuntimeLoader;

pub struct Application {
    pub config: AppConfig,
    pub model: Arc<SharedModel>,
    pub sessions: Arc<dyn SessionStore>,
    pub orchestrator: Arc<ConversationOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("backend client setup failed: {0}")]
    BackendClient(#[source] anyhow::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let model = Arc::new(SharedModel::new(
        RuntimeLoader::new(config.llm.clone()),
        config.llm.serialize_inference,
    ));

    let backend_timeout = Duration::from_secs(config.backend.timeout_secs);
    let api = HttpInventoryApi::new(&config.backend.base_url, backend_timeout)
        .map_err(BootstrapError::BackendClient)?;
    let gateway = BackendGateway::new(Arc::new(api), backend_timeout);
    info!(
        event_name = "system.bootstrap.backend_configured",
        correlation_id = "bootstrap",
        backend_url = %config.backend.base_url,
        "backend gateway configured"
    );

    let extractor = ProductExtractor::new(model.clone(), extraction_params(&config.llm), config.extractor.cache_size);
    let system_context = load_system_context(&config.context.system_context_path);
    let composer = ResponseComposer::new(model.clone(), gateway.clone(), system_context, reply_params(&config.llm));

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(EvictionPolicy {
        idle_ttl_secs: config.session.idle_ttl_secs,
        max_sessions: config.session.max_sessions,
    }));

    let mut orchestrator = ConversationOrchestrator::new(sessions.clone(), gateway, extractor, composer);
    if config.chat.next_action_hints {
        orchestrator = orchestrator.with_advisor(Arc::new(HeuristicAdvisor::default()));
    }

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        next_action_hints = config.chat.next_action_hints,
        "conversation pipeline assembled"
    );

    Ok(Application { config, model, sessions, orchestrator: Arc::new(orchestrator) })
}

fn reply_params(llm: &LlmConfig) -> GenerationParams {
    GenerationParams {
        max_tokens: llm.max_tokens,
        temperature: llm.temperature,
        top_p: llm.top_p,
        repeat_penalty: llm.repeat_penalty,
    }
}

fn extraction_params(llm: &LlmConfig) -> GenerationParams {
    GenerationParams {
        max_tokens: llm.extractor_max_tokens,
        temperature: llm.extractor_temperature,
        ..reply_params(llm)
    }
}
