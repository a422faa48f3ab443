use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => {
                Err(DomainError::UnknownVariant { kind: "log level", value: other.to_string() })
            }
        }
    }
}

/// Business-level log row kept in the database for the console.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub id: String,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub conversation_id: Option<ConversationId>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl SystemLogEntry {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: format!("LOG-{}", uuid::Uuid::new_v4().simple()),
            level,
            source: source.into(),
            message: message.into(),
            conversation_id: None,
            details: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, source, message)
    }

    pub fn for_conversation(mut self, conversation_id: &ConversationId) -> Self {
        self.conversation_id = Some(conversation_id.clone());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}
