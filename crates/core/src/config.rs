use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub context: ContextConfig,
    pub extractor: ExtractorConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub extractor_max_tokens: u32,
    pub extractor_temperature: f32,
    pub serialize_inference: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Idle sessions older than this are evicted on access. `0` keeps them for process lifetime.
    pub idle_ttl_secs: u64,
    /// Upper bound on live sessions. `0` means unbounded.
    pub max_sessions: usize,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub system_context_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub cache_size: usize,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub next_action_hints: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    #[serde(rename = "openai_compatible", alias = "openai")]
    OpenAiCompatible,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub backend_base_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub system_context_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_BACKEND_URL: &str = "http://rm_traceability_app:3001";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig { base_url: DEFAULT_BACKEND_URL.to_string(), timeout_secs: 5 },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_tokens: 64,
                temperature: 0.15,
                top_p: 0.85,
                repeat_penalty: 1.15,
                extractor_max_tokens: 8,
                extractor_temperature: 0.2,
                serialize_inference: true,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            session: SessionConfig { idle_ttl_secs: 86_400, max_sessions: 10_000 },
            context: ContextConfig { system_context_path: PathBuf::from("system_context.txt") },
            extractor: ExtractorConfig { cache_size: 1024 },
            chat: ChatConfig { next_action_hints: false },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai_compatible" | "openai-compatible" | "openai" => Ok(Self::OpenAiCompatible),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected ollama|openai_compatible)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("tracechat.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(top_p) = llm.top_p {
                self.llm.top_p = top_p;
            }
            if let Some(repeat_penalty) = llm.repeat_penalty {
                self.llm.repeat_penalty = repeat_penalty;
            }
            if let Some(extractor_max_tokens) = llm.extractor_max_tokens {
                self.llm.extractor_max_tokens = extractor_max_tokens;
            }
            if let Some(extractor_temperature) = llm.extractor_temperature {
                self.llm.extractor_temperature = extractor_temperature;
            }
            if let Some(serialize_inference) = llm.serialize_inference {
                self.llm.serialize_inference = serialize_inference;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(idle_ttl_secs) = session.idle_ttl_secs {
                self.session.idle_ttl_secs = idle_ttl_secs;
            }
            if let Some(max_sessions) = session.max_sessions {
                self.session.max_sessions = max_sessions;
            }
        }

        if let Some(path) = patch.context.and_then(|context| context.system_context_path) {
            self.context.system_context_path = path;
        }

        if let Some(cache_size) = patch.extractor.and_then(|extractor| extractor.cache_size) {
            self.extractor.cache_size = cache_size;
        }

        if let Some(hints) = patch.chat.and_then(|chat| chat.next_action_hints) {
            self.chat.next_action_hints = hints;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let backend_url =
            read_env("TRACECHAT_BACKEND_BASE_URL").or_else(|| read_env("BACKEND_URL"));
        if let Some(value) = backend_url {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("TRACECHAT_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("TRACECHAT_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRACECHAT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRACECHAT_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TRACECHAT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("TRACECHAT_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("TRACECHAT_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_TOP_P") {
            self.llm.top_p = parse_f32("TRACECHAT_LLM_TOP_P", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_REPEAT_PENALTY") {
            self.llm.repeat_penalty = parse_f32("TRACECHAT_LLM_REPEAT_PENALTY", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_LLM_SERIALIZE_INFERENCE") {
            self.llm.serialize_inference =
                parse_bool("TRACECHAT_LLM_SERIALIZE_INFERENCE", &value)?;
        }

        if let Some(value) = read_env("TRACECHAT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRACECHAT_SERVER_PORT") {
            self.server.port = parse_u16("TRACECHAT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRACECHAT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TRACECHAT_SESSION_IDLE_TTL_SECS") {
            self.session.idle_ttl_secs = parse_u64("TRACECHAT_SESSION_IDLE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_SESSION_MAX_SESSIONS") {
            self.session.max_sessions = parse_usize("TRACECHAT_SESSION_MAX_SESSIONS", &value)?;
        }

        if let Some(value) = read_env("TRACECHAT_CONTEXT_SYSTEM_CONTEXT_PATH") {
            self.context.system_context_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("TRACECHAT_EXTRACTOR_CACHE_SIZE") {
            self.extractor.cache_size = parse_usize("TRACECHAT_EXTRACTOR_CACHE_SIZE", &value)?;
        }
        if let Some(value) = read_env("TRACECHAT_CHAT_NEXT_ACTION_HINTS") {
            self.chat.next_action_hints = parse_bool("TRACECHAT_CHAT_NEXT_ACTION_HINTS", &value)?;
        }

        let log_level =
            read_env("TRACECHAT_LOGGING_LEVEL").or_else(|| read_env("TRACECHAT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRACECHAT_LOGGING_FORMAT").or_else(|| read_env("TRACECHAT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(backend_base_url) = overrides.backend_base_url {
            self.backend.base_url = backend_base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(path) = overrides.system_context_path {
            self.context.system_context_path = path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_extractor(&self.extractor)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tracechat.toml"), PathBuf::from("config/tracechat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if !is_http_url(&backend.base_url) {
        return Err(ConfigError::Validation(format!(
            "backend.base_url must start with http:// or https:// (got `{}`)",
            backend.base_url
        )));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if !is_http_url(&llm.base_url) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.max_tokens == 0 || llm.extractor_max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens and llm.extractor_max_tokens must be greater than zero".to_string(),
        ));
    }

    let temperatures = [llm.temperature, llm.extractor_temperature];
    if temperatures.iter().any(|value| !(0.0..=2.0).contains(value)) {
        return Err(ConfigError::Validation(
            "llm.temperature and llm.extractor_temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if !(llm.top_p > 0.0 && llm.top_p <= 1.0) {
        return Err(ConfigError::Validation("llm.top_p must be in range (0.0, 1.0]".to_string()));
    }

    if llm.repeat_penalty <= 0.0 {
        return Err(ConfigError::Validation(
            "llm.repeat_penalty must be greater than zero".to_string(),
        ));
    }

    if llm.provider == LlmProvider::OpenAiCompatible {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai_compatible provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_extractor(extractor: &ExtractorConfig) -> Result<(), ConfigError> {
    if extractor.cache_size == 0 {
        return Err(ConfigError::Validation(
            "extractor.cache_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    session: Option<SessionPatch>,
    context: Option<ContextPatch>,
    extractor: Option<ExtractorPatch>,
    chat: Option<ChatPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    repeat_penalty: Option<f32>,
    extractor_max_tokens: Option<u32>,
    extractor_temperature: Option<f32>,
    serialize_inference: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    idle_ttl_secs: Option<u64>,
    max_sessions: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    system_context_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractorPatch {
    cache_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    next_action_hints: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
