use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use balcao_core::domain::agent::{AgentConfig, AgentKey};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use balcao_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use balcao_core::domain::knowledge::{KnowledgeChunk, KnowledgeFile};
use balcao_core::domain::lead::LeadTemperature;
use balcao_core::domain::log::{LogLevel, SystemLogEntry};
use balcao_core::domain::message::{DeliveryStatus, Message, MessageId};

pub mod agent_config;
pub mod analytics;
pub mod context;
pub mod conversation;
pub mod knowledge;
pub mod message;
pub mod system_log;

pub use agent_config::SqlAgentConfigRepository;
pub use analytics::{LeadSummary, SqlAnalyticsRepository};
pub use context::SqlProjectContextRepository;
pub use conversation::SqlConversationRepository;
pub use knowledge::SqlKnowledgeRepository;
pub use message::SqlMessageRepository;
pub use system_log::SqlSystemLogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Inbox filter. `limit` is clamped by the repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub temperature: Option<LeadTemperature>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: &ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    async fn find_by_wa_id(&self, wa_id: &str) -> Result<Option<Conversation>, RepositoryError>;
    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError>;
    async fn list(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>, RepositoryError>;
    /// Returns the conversation for `wa_id`, creating it when absent.
    /// Concurrent callers for the same number all get the same row.
    async fn open_for_wa_id(
        &self,
        wa_id: &str,
        contact_name: Option<&str>,
    ) -> Result<Conversation, RepositoryError>;
    /// Counts one customer message in a single statement. A closed
    /// conversation reopens with the bot and a cleared handoff.
    async fn record_inbound(
        &self,
        id: &ConversationId,
        contact_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError>;
    /// Writes the columns a bot turn owns, only while the row still has
    /// `expected` status and no pending handoff. Returns whether it applied.
    async fn apply_bot_turn(
        &self,
        conversation: &Conversation,
        expected: ConversationStatus,
    ) -> Result<bool, RepositoryError>;
    /// Writes the ownership columns only, leaving classification and scoring alone.
    async fn update_status(&self, conversation: &Conversation) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError>;
    async fn wa_message_exists(&self, wa_message_id: &str) -> Result<bool, RepositoryError>;
    /// Most recent `limit` messages, returned oldest first.
    async fn recent_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
    /// Every customer message body of the conversation, oldest first.
    async fn customer_text(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<String>, RepositoryError>;
    async fn mark_sent(
        &self,
        id: &MessageId,
        wa_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<(), RepositoryError>;
    /// Applies a delivery receipt. Receipts never move a message backwards.
    async fn apply_receipt(
        &self,
        wa_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProjectContextRepository: Send + Sync {
    async fn find(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ProjectContext>, RepositoryError>;
    async fn save(
        &self,
        conversation_id: &ConversationId,
        context: &ProjectContext,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait AgentConfigRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<AgentConfig>, RepositoryError>;
    async fn find(&self, key: AgentKey) -> Result<Option<AgentConfig>, RepositoryError>;
    async fn save(&self, config: &AgentConfig) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn create_file(
        &self,
        name: &str,
        category: Option<ProductCategory>,
        content: &str,
    ) -> Result<KnowledgeFile, RepositoryError>;
    async fn list_files(&self) -> Result<Vec<KnowledgeFile>, RepositoryError>;
    /// Chunks tagged with `category` plus uncategorized chunks.
    async fn candidate_chunks(
        &self,
        category: ProductCategory,
    ) -> Result<Vec<KnowledgeChunk>, RepositoryError>;
}

#[async_trait]
pub trait SystemLogRepository: Send + Sync {
    async fn append(&self, entry: &SystemLogEntry) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<SystemLogEntry>, RepositoryError>;
    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<SystemLogEntry>, RepositoryError>;
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| RepositoryError::Decode(format!("invalid value in `{column}`: {error}")))
}

pub(crate) fn to_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("`{column}` out of range: {value}")))
}

pub(crate) fn clamp_limit(limit: Option<u32>, default: u32, max: u32) -> i64 {
    i64::from(limit.unwrap_or(default).clamp(1, max))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
