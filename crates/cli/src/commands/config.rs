use std::env;
use std::fs;
use std::path::Path;

use toml::Value;

use tracechat_core::config::{resolve_config_path, AppConfig, LoadOptions};

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl ToString) -> Self {
        Self { key, env_keys, value: value.to_string() }
    }
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    vec![
        Field::new(
            "backend.base_url",
            &["TRACECHAT_BACKEND_BASE_URL", "BACKEND_URL"],
            &config.backend.base_url,
        ),
        Field::new("backend.timeout_secs", &["TRACECHAT_BACKEND_TIMEOUT_SECS"], config.backend.timeout_secs),
        Field::new("llm.provider", &["TRACECHAT_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        Field::new("llm.base_url", &["TRACECHAT_LLM_BASE_URL"], &config.llm.base_url),
        Field::new("llm.model", &["TRACECHAT_LLM_MODEL"], &config.llm.model),
        Field::new("llm.api_key", &["TRACECHAT_LLM_API_KEY"], api_key),
        Field::new("llm.timeout_secs", &["TRACECHAT_LLM_TIMEOUT_SECS"], config.llm.timeout_secs),
        Field::new("llm.max_tokens", &["TRACECHAT_LLM_MAX_TOKENS"], config.llm.max_tokens),
        Field::new("llm.temperature", &["TRACECHAT_LLM_TEMPERATURE"], config.llm.temperature),
        Field::new("llm.top_p", &["TRACECHAT_LLM_TOP_P"], config.llm.top_p),
        Field::new("llm.repeat_penalty", &["TRACECHAT_LLM_REPEAT_PENALTY"], config.llm.repeat_penalty),
        Field::new(
            "llm.serialize_inference",
            &["TRACECHAT_LLM_SERIALIZE_INFERENCE"],
            config.llm.serialize_inference,
        ),
        Field::new("server.bind_address", &["TRACECHAT_SERVER_BIND_ADDRESS"], &config.server.bind_address),
        Field::new("server.port", &["TRACECHAT_SERVER_PORT"], config.server.port),
        Field::new(
            "session.idle_ttl_secs",
            &["TRACECHAT_SESSION_IDLE_TTL_SECS"],
            config.session.idle_ttl_secs,
        ),
        Field::new(
            "session.max_sessions",
            &["TRACECHAT_SESSION_MAX_SESSIONS"],
            config.session.max_sessions,
        ),
        Field::new(
            "context.system_context_path",
            &["TRACECHAT_CONTEXT_SYSTEM_CONTEXT_PATH"],
            config.context.system_context_path.display(),
        ),
        Field::new("extractor.cache_size", &["TRACECHAT_EXTRACTOR_CACHE_SIZE"], config.extractor.cache_size),
        Field::new(
            "chat.next_action_hints",
            &["TRACECHAT_CHAT_NEXT_ACTION_HINTS"],
            config.chat.next_action_hints,
        ),
        Field::new(
            "logging.level",
            &["TRACECHAT_LOGGING_LEVEL", "TRACECHAT_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["TRACECHAT_LOGGING_FORMAT", "TRACECHAT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, config_file_doc: Option<&Value>, config_file_path: Option<&Path>) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, field.key)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
