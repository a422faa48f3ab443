use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub company: CompanyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub verify_token: SecretString,
    pub access_token: SecretString,
    pub app_secret: Option<SecretString>,
    pub phone_number_id: String,
    pub api_base_url: String,
    pub api_version: String,
    pub send_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Bearer token for the console endpoints. The console is not mounted without it.
    pub console_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub classifier: ClassifierMode,
    pub keywords_path: Option<PathBuf>,
    pub handoff_score: u8,
    pub max_bot_messages: u32,
    pub history_limit: u32,
    pub knowledge_chunks: usize,
}

#[derive(Clone, Debug)]
pub struct CompanyConfig {
    pub name: String,
    pub website: Option<String>,
    pub business_hours: String,
    pub facts: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Xai,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "open_ai",
            Self::Anthropic => "anthropic",
            Self::Xai => "xai",
            Self::Ollama => "ollama",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// API root used when `llm.base_url` is unset.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Xai => "https://api.x.ai/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Keyword,
    Llm,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_send_enabled: Option<bool>,
    pub classifier: Option<ClassifierMode>,
    pub server_port: Option<u16>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://balcao.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                verify_token: String::new().into(),
                access_token: String::new().into(),
                app_secret: None,
                phone_number_id: String::new(),
                api_base_url: "https://graph.facebook.com".to_string(),
                api_version: "v21.0".to_string(),
                send_enabled: true,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                console_token: None,
            },
            routing: RoutingConfig {
                classifier: ClassifierMode::Keyword,
                keywords_path: None,
                handoff_score: 70,
                max_bot_messages: 12,
                history_limit: 20,
                knowledge_chunks: 3,
            },
            company: CompanyConfig {
                name: "Balcão Materiais de Construção".to_string(),
                website: None,
                business_hours: "segunda a sexta, 8h às 18h; sábado, 8h às 12h".to_string(),
                facts: Vec::new(),
            },
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
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "xai" | "grok" => Ok(Self::Xai),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|xai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for ClassifierMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier mode `{other}` (expected keyword|llm)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("balcao.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token);
            }
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = secret_value(access_token);
            }
            if let Some(app_secret) = whatsapp.app_secret {
                self.whatsapp.app_secret = Some(secret_value(app_secret));
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
            if let Some(api_version) = whatsapp.api_version {
                self.whatsapp.api_version = api_version;
            }
            if let Some(send_enabled) = whatsapp.send_enabled {
                self.whatsapp.send_enabled = send_enabled;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
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
            if let Some(console_token) = server.console_token {
                self.server.console_token = Some(secret_value(console_token));
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(classifier) = routing.classifier {
                self.routing.classifier = classifier;
            }
            if let Some(keywords_path) = routing.keywords_path {
                self.routing.keywords_path = Some(keywords_path);
            }
            if let Some(handoff_score) = routing.handoff_score {
                self.routing.handoff_score = handoff_score;
            }
            if let Some(max_bot_messages) = routing.max_bot_messages {
                self.routing.max_bot_messages = max_bot_messages;
            }
            if let Some(history_limit) = routing.history_limit {
                self.routing.history_limit = history_limit;
            }
            if let Some(knowledge_chunks) = routing.knowledge_chunks {
                self.routing.knowledge_chunks = knowledge_chunks;
            }
        }

        if let Some(company) = patch.company {
            if let Some(name) = company.name {
                self.company.name = name;
            }
            if let Some(website) = company.website {
                self.company.website = Some(website);
            }
            if let Some(business_hours) = company.business_hours {
                self.company.business_hours = business_hours;
            }
            if let Some(facts) = company.facts {
                self.company.facts = facts;
            }
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
        if let Some(value) = read_env("BALCAO_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BALCAO_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BALCAO_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BALCAO_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BALCAO_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BALCAO_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }
        if let Some(value) = read_env("BALCAO_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = secret_value(value);
        }
        if let Some(value) = read_env("BALCAO_WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("BALCAO_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("BALCAO_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }
        if let Some(value) = read_env("BALCAO_WHATSAPP_SEND_ENABLED") {
            self.whatsapp.send_enabled = parse_bool("BALCAO_WHATSAPP_SEND_ENABLED", &value)?;
        }

        if let Some(value) = read_env("BALCAO_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("BALCAO_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BALCAO_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("BALCAO_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("BALCAO_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("BALCAO_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BALCAO_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("BALCAO_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("BALCAO_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BALCAO_SERVER_PORT") {
            self.server.port = parse_u16("BALCAO_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BALCAO_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BALCAO_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("BALCAO_SERVER_CONSOLE_TOKEN") {
            self.server.console_token = Some(secret_value(value));
        }

        if let Some(value) = read_env("BALCAO_ROUTING_CLASSIFIER") {
            self.routing.classifier = value.parse()?;
        }
        if let Some(value) = read_env("BALCAO_ROUTING_KEYWORDS_PATH") {
            self.routing.keywords_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("BALCAO_ROUTING_HANDOFF_SCORE") {
            self.routing.handoff_score = parse_u8("BALCAO_ROUTING_HANDOFF_SCORE", &value)?;
        }
        if let Some(value) = read_env("BALCAO_ROUTING_MAX_BOT_MESSAGES") {
            self.routing.max_bot_messages = parse_u32("BALCAO_ROUTING_MAX_BOT_MESSAGES", &value)?;
        }

        if let Some(value) = read_env("BALCAO_COMPANY_NAME") {
            self.company.name = value;
        }

        let log_level = read_env("BALCAO_LOGGING_LEVEL").or_else(|| read_env("BALCAO_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BALCAO_LOGGING_FORMAT").or_else(|| read_env("BALCAO_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
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
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = secret_value(access_token);
        }
        if let Some(phone_number_id) = overrides.whatsapp_phone_number_id {
            self.whatsapp.phone_number_id = phone_number_id;
        }
        if let Some(send_enabled) = overrides.whatsapp_send_enabled {
            self.whatsapp.send_enabled = send_enabled;
        }
        if let Some(classifier) = overrides.classifier {
            self.routing.classifier = classifier;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_routing(&self.routing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("balcao.toml"), PathBuf::from("config/balcao.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if whatsapp.verify_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required. Choose any string and enter the same value in Meta App Dashboard > WhatsApp > Configuration > Webhook".to_string(),
        ));
    }

    if whatsapp.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.access_token is required. Get it from Meta App Dashboard > WhatsApp > API Setup".to_string(),
        ));
    }

    let phone_number_id = whatsapp.phone_number_id.trim();
    if phone_number_id.is_empty() || !phone_number_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id must be the numeric id shown in Meta App Dashboard > WhatsApp > API Setup".to_string(),
        ));
    }

    let base_url = whatsapp.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for openai/anthropic/xai providers".to_string(),
            ));
        }
    }

    if let Some(base_url) = llm.base_url.as_deref().map(str::trim) {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
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

    if server.console_token.as_ref().is_some_and(|token| token.expose_secret().trim().is_empty()) {
        return Err(ConfigError::Validation(
            "server.console_token must not be blank; remove it to disable the console".to_string(),
        ));
    }

    Ok(())
}

fn validate_routing(routing: &RoutingConfig) -> Result<(), ConfigError> {
    if routing.handoff_score == 0 || routing.handoff_score > 100 {
        return Err(ConfigError::Validation(
            "routing.handoff_score must be in range 1..=100".to_string(),
        ));
    }
    if routing.max_bot_messages == 0 {
        return Err(ConfigError::Validation(
            "routing.max_bot_messages must be greater than zero".to_string(),
        ));
    }
    if routing.history_limit == 0 || routing.history_limit > 200 {
        return Err(ConfigError::Validation(
            "routing.history_limit must be in range 1..=200".to_string(),
        ));
    }
    if let Some(path) = &routing.keywords_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "routing.keywords_path `{}` does not exist",
                path.display()
            )));
        }
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

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| invalid_override(key, value))
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    routing: Option<RoutingPatch>,
    company: Option<CompanyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    verify_token: Option<String>,
    access_token: Option<String>,
    app_secret: Option<String>,
    phone_number_id: Option<String>,
    api_base_url: Option<String>,
    api_version: Option<String>,
    send_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    console_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    classifier: Option<ClassifierMode>,
    keywords_path: Option<PathBuf>,
    handoff_score: Option<u8>,
    max_bot_messages: Option<u32>,
    history_limit: Option<u32>,
    knowledge_chunks: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CompanyPatch {
    name: Option<String>,
    website: Option<String>,
    business_hours: Option<String>,
    facts: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ClassifierMode, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const WHATSAPP_VARS: [&str; 3] = [
        "BALCAO_WHATSAPP_VERIFY_TOKEN",
        "BALCAO_WHATSAPP_ACCESS_TOKEN",
        "BALCAO_WHATSAPP_PHONE_NUMBER_ID",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_whatsapp_env() {
        env::set_var("BALCAO_WHATSAPP_VERIFY_TOKEN", "verify-me");
        env::set_var("BALCAO_WHATSAPP_ACCESS_TOKEN", "EAAG-test-token");
        env::set_var("BALCAO_WHATSAPP_PHONE_NUMBER_ID", "1234567890");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WA_VERIFY", "verify-from-env");
        env::set_var("TEST_WA_ACCESS", "EAAG-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("balcao.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
verify_token = "${TEST_WA_VERIFY}"
access_token = "${TEST_WA_ACCESS}"
phone_number_id = "1098765432"

[company]
name = "Casa das Telhas"
facts = ["Entrega grátis acima de R$ 2.000", "Parcelamos em até 12x"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.verify_token.expose_secret() == "verify-from-env",
                "verify token should be loaded from environment",
            )?;
            ensure(
                config.whatsapp.access_token.expose_secret() == "EAAG-from-env",
                "access token should be loaded from environment",
            )?;
            ensure(config.company.name == "Casa das Telhas", "company name should come from file")?;
            ensure(config.company.facts.len() == 2, "company facts should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_WA_VERIFY", "TEST_WA_ACCESS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_whatsapp_env();
        env::set_var("BALCAO_LOG_LEVEL", "warn");
        env::set_var("BALCAO_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&WHATSAPP_VARS);
        clear_vars(&["BALCAO_LOG_LEVEL", "BALCAO_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_whatsapp_env();
        env::set_var("BALCAO_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BALCAO_ROUTING_CLASSIFIER", "llm");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("balcao.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[routing]
classifier = "keyword"
handoff_score = 80

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.routing.classifier == ClassifierMode::Llm,
                "env classifier should win over file",
            )?;
            ensure(config.routing.handoff_score == 80, "file handoff score should win over default")?;
            Ok(())
        })();

        clear_vars(&WHATSAPP_VARS);
        clear_vars(&["BALCAO_DATABASE_URL", "BALCAO_ROUTING_CLASSIFIER"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BALCAO_WHATSAPP_VERIFY_TOKEN", "verify-me");
        env::set_var("BALCAO_WHATSAPP_ACCESS_TOKEN", "EAAG-test-token");
        env::set_var("BALCAO_WHATSAPP_PHONE_NUMBER_ID", "not-a-number");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("whatsapp.phone_number_id")
            );
            ensure(has_message, "validation failure should mention whatsapp.phone_number_id")
        })();

        clear_vars(&WHATSAPP_VARS);
        result
    }

    #[test]
    fn hosted_provider_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_whatsapp_env();
        env::set_var("BALCAO_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("anthropic without api key should fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
                "validation failure should mention llm.api_key",
            )
        })();

        clear_vars(&WHATSAPP_VARS);
        clear_vars(&["BALCAO_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BALCAO_WHATSAPP_VERIFY_TOKEN", "verify-secret-value");
        env::set_var("BALCAO_WHATSAPP_ACCESS_TOKEN", "EAAG-secret-value");
        env::set_var("BALCAO_WHATSAPP_PHONE_NUMBER_ID", "1234567890");
        env::set_var("BALCAO_SERVER_CONSOLE_TOKEN", "console-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                config.server.console_token.as_ref().map(|token| token.expose_secret())
                    == Some("console-secret-value"),
                "console token should come from env",
            )?;
            ensure(
                !debug.contains("console-secret-value"),
                "debug output should not contain console token",
            )?;

            ensure(
                !debug.contains("verify-secret-value"),
                "debug output should not contain verify token",
            )?;
            ensure(
                !debug.contains("EAAG-secret-value"),
                "debug output should not contain access token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&WHATSAPP_VARS);
        clear_vars(&["BALCAO_SERVER_CONSOLE_TOKEN"]);
        result
    }
}
