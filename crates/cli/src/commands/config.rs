use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use balcao_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, env_key: &str, value: &str| {
        lines.push(render_line(key, value, source(key, env_key)));
    };

    push("database.url", "BALCAO_DATABASE_URL", &config.database.url);
    push(
        "database.max_connections",
        "BALCAO_DATABASE_MAX_CONNECTIONS",
        &config.database.max_connections.to_string(),
    );
    push(
        "database.timeout_secs",
        "BALCAO_DATABASE_TIMEOUT_SECS",
        &config.database.timeout_secs.to_string(),
    );

    push(
        "whatsapp.verify_token",
        "BALCAO_WHATSAPP_VERIFY_TOKEN",
        &redact_token(config.whatsapp.verify_token.expose_secret()),
    );
    push(
        "whatsapp.access_token",
        "BALCAO_WHATSAPP_ACCESS_TOKEN",
        &redact_token(config.whatsapp.access_token.expose_secret()),
    );
    let app_secret = if config.whatsapp.app_secret.is_some() { "<redacted>" } else { "<unset>" };
    push("whatsapp.app_secret", "BALCAO_WHATSAPP_APP_SECRET", app_secret);
    push(
        "whatsapp.phone_number_id",
        "BALCAO_WHATSAPP_PHONE_NUMBER_ID",
        &config.whatsapp.phone_number_id,
    );
    push("whatsapp.api_base_url", "BALCAO_WHATSAPP_API_BASE_URL", &config.whatsapp.api_base_url);
    push(
        "whatsapp.send_enabled",
        "BALCAO_WHATSAPP_SEND_ENABLED",
        &config.whatsapp.send_enabled.to_string(),
    );

    push("llm.provider", "BALCAO_LLM_PROVIDER", config.llm.provider.as_str());
    push("llm.model", "BALCAO_LLM_MODEL", &config.llm.model);
    push("llm.base_url", "BALCAO_LLM_BASE_URL", config.llm.base_url.as_deref().unwrap_or("<unset>"));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("llm.api_key", "BALCAO_LLM_API_KEY", llm_api_key);

    push("server.bind_address", "BALCAO_SERVER_BIND_ADDRESS", &config.server.bind_address);
    push("server.port", "BALCAO_SERVER_PORT", &config.server.port.to_string());
    let console_token =
        if config.server.console_token.is_some() { "<redacted>" } else { "<unset>" };
    push("server.console_token", "BALCAO_SERVER_CONSOLE_TOKEN", console_token);

    push(
        "routing.classifier",
        "BALCAO_ROUTING_CLASSIFIER",
        &format!("{:?}", config.routing.classifier),
    );
    push(
        "routing.handoff_score",
        "BALCAO_ROUTING_HANDOFF_SCORE",
        &config.routing.handoff_score.to_string(),
    );
    push(
        "routing.max_bot_messages",
        "BALCAO_ROUTING_MAX_BOT_MESSAGES",
        &config.routing.max_bot_messages.to_string(),
    );
    push("company.name", "BALCAO_COMPANY_NAME", &config.company.name);

    push("logging.level", "BALCAO_LOGGING_LEVEL", &config.logging.level);
    push("logging.format", "BALCAO_LOGGING_FORMAT", &format!("{:?}", config.logging.format));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("balcao.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/balcao.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.get(..4) {
        Some(prefix) if trimmed.len() > 8 => format!("{prefix}***"),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        assert_eq!(redact_token("EAAGm0PX4ZCpsBAKZBZC"), "EAAG***");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_nested_tables() {
        let doc: Value = "[whatsapp]\nphone_number_id = \"123\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "whatsapp.phone_number_id"));
        assert!(!contains_path(&doc, "whatsapp.access_token"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
