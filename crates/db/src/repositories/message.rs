use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::domain::conversation::ConversationId;
use balcao_core::domain::message::{DeliveryStatus, Message, MessageId, MessageSender};

use super::{format_timestamp, parse_column, parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        let quick_replies = serde_json::to_string(&message.quick_replies)
            .map_err(|error| RepositoryError::Decode(format!("quick replies: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, direction, sender, body, wa_message_id, status,
                quick_replies_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(message.direction.as_str())
        .bind(message.sender.as_str())
        .bind(&message.body)
        .bind(&message.wa_message_id)
        .bind(message.status.as_str())
        .bind(quick_replies)
        .bind(format_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn wa_message_exists(&self, wa_message_id: &str) -> Result<bool, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE wa_message_id = ?")
                .bind(wa_message_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn recent_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT
                    id, conversation_id, direction, sender, body, wa_message_id, status,
                    quick_replies_json, created_at, rowid AS seq
                FROM messages
                WHERE conversation_id = ?
                ORDER BY created_at DESC, seq DESC
                LIMIT ?
            )
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(&conversation_id.0)
        .bind(i64::from(limit.max(1)))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn customer_text(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<String>, RepositoryError> {
        let bodies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT body FROM messages
            WHERE conversation_id = ? AND sender = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(&conversation_id.0)
        .bind(MessageSender::Customer.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(bodies)
    }

    async fn mark_sent(
        &self,
        id: &MessageId,
        wa_message_id: Option<&str>,
        status: DeliveryStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE messages SET wa_message_id = COALESCE(?, wa_message_id), status = ? WHERE id = ?")
            .bind(wa_message_id)
            .bind(status.as_str())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_receipt(
        &self,
        wa_message_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, RepositoryError> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM messages WHERE wa_message_id = ?")
                .bind(wa_message_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(current) = current else {
            return Ok(false);
        };
        let current: DeliveryStatus = parse_column("status", &current)?;
        if status.rank() <= current.rank() {
            return Ok(false);
        }

        sqlx::query("UPDATE messages SET status = ? WHERE wa_message_id = ?")
            .bind(status.as_str())
            .bind(wa_message_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message, RepositoryError> {
    let direction: String = row.try_get("direction")?;
    let sender: String = row.try_get("sender")?;
    let status: String = row.try_get("status")?;
    let quick_replies: String = row.try_get("quick_replies_json")?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        direction: parse_column("direction", &direction)?,
        sender: parse_column("sender", &sender)?,
        body: row.try_get("body")?,
        wa_message_id: row.try_get("wa_message_id")?,
        status: parse_column("status", &status)?,
        quick_replies: serde_json::from_str(&quick_replies).map_err(|error| {
            RepositoryError::Decode(format!("invalid value in `quick_replies_json`: {error}"))
        })?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
