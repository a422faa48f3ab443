use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::domain::conversation::ConversationId;
use balcao_core::domain::log::{LogLevel, SystemLogEntry};

use super::{format_timestamp, parse_column, parse_timestamp, RepositoryError, SystemLogRepository};
use crate::DbPool;

pub struct SqlSystemLogRepository {
    pool: DbPool,
}

impl SqlSystemLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SystemLogRepository for SqlSystemLogRepository {
    async fn append(&self, entry: &SystemLogEntry) -> Result<(), RepositoryError> {
        let details = serde_json::to_string(&entry.details)
            .map_err(|error| RepositoryError::Decode(format!("details: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO system_logs (id, level, source, message, conversation_id, details_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.level.as_str())
        .bind(&entry.source)
        .bind(&entry.message)
        .bind(entry.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(details)
        .bind(format_timestamp(&entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<SystemLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, source, message, conversation_id, details_json, created_at
            FROM system_logs
            WHERE (?1 IS NULL OR level = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(level.map(|level| level.as_str()))
        .bind(i64::from(limit.clamp(1, 1_000)))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<SystemLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, source, message, conversation_id, details_json, created_at
            FROM system_logs
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(log_from_row).collect()
    }
}

fn log_from_row(row: &SqliteRow) -> Result<SystemLogEntry, RepositoryError> {
    let level: String = row.try_get("level")?;
    let details: String = row.try_get("details_json")?;
    let conversation_id: Option<String> = row.try_get("conversation_id")?;

    Ok(SystemLogEntry {
        id: row.try_get("id")?,
        level: parse_column("level", &level)?,
        source: row.try_get("source")?,
        message: row.try_get("message")?,
        conversation_id: conversation_id.map(ConversationId),
        details: serde_json::from_str(&details).map_err(|error| {
            RepositoryError::Decode(format!("invalid value in `details_json`: {error}"))
        })?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
