use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};

use super::{
    clamp_limit, format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp, to_u32,
    ConversationFilter, ConversationRepository, RepositoryError,
};
use crate::DbPool;

const SELECT_COLUMNS: &str = "id, wa_id, contact_name, status, category, lead_score, \
     lead_temperature, needs_handoff, handoff_reason, message_count, messages_since_human, \
     last_message_at, created_at, updated_at";

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM conversations WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| conversation_from_row(&row)).transpose()
    }

    async fn find_by_wa_id(&self, wa_id: &str) -> Result<Option<Conversation>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM conversations WHERE wa_id = ?"))
                .bind(wa_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|row| conversation_from_row(&row)).transpose()
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, wa_id, contact_name, status, category, lead_score, lead_temperature,
                needs_handoff, handoff_reason, message_count, messages_since_human,
                last_message_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                contact_name = excluded.contact_name,
                status = excluded.status,
                category = excluded.category,
                lead_score = excluded.lead_score,
                lead_temperature = excluded.lead_temperature,
                needs_handoff = excluded.needs_handoff,
                handoff_reason = excluded.handoff_reason,
                message_count = excluded.message_count,
                messages_since_human = excluded.messages_since_human,
                last_message_at = excluded.last_message_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation.id.0)
        .bind(&conversation.wa_id)
        .bind(&conversation.contact_name)
        .bind(conversation.status.as_str())
        .bind(conversation.category.as_str())
        .bind(i64::from(conversation.lead_score))
        .bind(conversation.lead_temperature.as_str())
        .bind(conversation.needs_handoff)
        .bind(&conversation.handoff_reason)
        .bind(i64::from(conversation.message_count))
        .bind(i64::from(conversation.messages_since_human))
        .bind(conversation.last_message_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&conversation.created_at))
        .bind(format_timestamp(&conversation.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM conversations
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR lead_temperature = ?2)
            ORDER BY COALESCE(last_message_at, updated_at) DESC, id ASC
            LIMIT ?3
            "#
        ))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.temperature.map(|temperature| temperature.as_str()))
        .bind(clamp_limit(filter.limit, 50, 500))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }

    async fn open_for_wa_id(
        &self,
        wa_id: &str,
        contact_name: Option<&str>,
    ) -> Result<Conversation, RepositoryError> {
        let fresh = Conversation::new(wa_id, contact_name.map(str::to_string));
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, wa_id, contact_name, status, category, lead_score, lead_temperature,
                needs_handoff, handoff_reason, message_count, messages_since_human,
                last_message_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, 0, NULL, 0, 0, NULL, ?, ?)
            ON CONFLICT(wa_id) DO NOTHING
            "#,
        )
        .bind(&fresh.id.0)
        .bind(&fresh.wa_id)
        .bind(&fresh.contact_name)
        .bind(fresh.status.as_str())
        .bind(fresh.category.as_str())
        .bind(fresh.lead_temperature.as_str())
        .bind(format_timestamp(&fresh.created_at))
        .bind(format_timestamp(&fresh.updated_at))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM conversations WHERE wa_id = ?"))
            .bind(wa_id)
            .fetch_one(&self.pool)
            .await?;
        conversation_from_row(&row)
    }

    async fn record_inbound(
        &self,
        id: &ConversationId,
        contact_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let reopening = "status = 'closed'";
        sqlx::query(&format!(
            r#"
            UPDATE conversations SET
                status = CASE WHEN {reopening} THEN 'in_bot' ELSE status END,
                needs_handoff = CASE WHEN {reopening} THEN 0 ELSE needs_handoff END,
                handoff_reason = CASE WHEN {reopening} THEN NULL ELSE handoff_reason END,
                messages_since_human =
                    CASE WHEN {reopening} THEN 1 ELSE messages_since_human + 1 END,
                message_count = message_count + 1,
                contact_name = COALESCE(contact_name, ?),
                last_message_at = ?,
                updated_at = ?
            WHERE id = ?
            "#
        ))
        .bind(contact_name)
        .bind(format_timestamp(&at))
        .bind(format_timestamp(&at))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM conversations WHERE id = ?"))
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        conversation_from_row(&row)
    }

    async fn apply_bot_turn(
        &self,
        conversation: &Conversation,
        expected: ConversationStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                status = ?,
                category = ?,
                lead_score = ?,
                lead_temperature = ?,
                needs_handoff = ?,
                handoff_reason = ?,
                updated_at = ?
            WHERE id = ? AND status = ? AND needs_handoff = 0
            "#,
        )
        .bind(conversation.status.as_str())
        .bind(conversation.category.as_str())
        .bind(i64::from(conversation.lead_score))
        .bind(conversation.lead_temperature.as_str())
        .bind(conversation.needs_handoff)
        .bind(&conversation.handoff_reason)
        .bind(format_timestamp(&conversation.updated_at))
        .bind(&conversation.id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_status(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE conversations SET
                status = ?,
                needs_handoff = ?,
                handoff_reason = ?,
                messages_since_human = ?,
                last_message_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(conversation.status.as_str())
        .bind(conversation.needs_handoff)
        .bind(&conversation.handoff_reason)
        .bind(i64::from(conversation.messages_since_human))
        .bind(conversation.last_message_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&conversation.updated_at))
        .bind(&conversation.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let status: String = row.try_get("status")?;
    let category: String = row.try_get("category")?;
    let lead_temperature: String = row.try_get("lead_temperature")?;
    let lead_score: i64 = row.try_get("lead_score")?;
    let message_count: i64 = row.try_get("message_count")?;
    let messages_since_human: i64 = row.try_get("messages_since_human")?;

    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        wa_id: row.try_get("wa_id")?,
        contact_name: row.try_get("contact_name")?,
        status: parse_column("status", &status)?,
        category: parse_column("category", &category)?,
        lead_score: u8::try_from(lead_score).map_err(|_| {
            RepositoryError::Decode(format!("`lead_score` out of range: {lead_score}"))
        })?,
        lead_temperature: parse_column("lead_temperature", &lead_temperature)?,
        needs_handoff: row.try_get("needs_handoff")?,
        handoff_reason: row.try_get("handoff_reason")?,
        message_count: to_u32("message_count", message_count)?,
        messages_since_human: to_u32("messages_since_human", messages_since_human)?,
        last_message_at: parse_optional_timestamp(
            "last_message_at",
            row.try_get("last_message_at")?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use balcao_core::domain::category::ProductCategory;
    use balcao_core::domain::conversation::{Conversation, ConversationStatus};
    use balcao_core::domain::lead::LeadTemperature;

    use super::SqlConversationRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::{ConversationFilter, ConversationRepository};

    #[tokio::test]
    async fn conversation_round_trip_by_id_and_wa_id() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let mut conversation = Conversation::new("5541999990001", Some("Marina".to_string()));
        conversation.category = ProductCategory::Forros;
        conversation.lead_score = 45;
        conversation.lead_temperature = LeadTemperature::Warm;
        conversation.message_count = 3;
        conversation.last_message_at = Some(Utc::now());
        repo.save(&conversation).await.expect("save");

        let by_id = repo.find_by_id(&conversation.id).await.expect("find").expect("exists");
        assert_eq!(by_id.wa_id, conversation.wa_id);
        assert_eq!(by_id.category, ProductCategory::Forros);
        assert_eq!(by_id.lead_temperature, LeadTemperature::Warm);
        assert_eq!(by_id.message_count, 3);

        let by_wa = repo.find_by_wa_id("5541999990001").await.expect("find").expect("exists");
        assert_eq!(by_wa.id, conversation.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn save_updates_existing_row() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let mut conversation = Conversation::new("5511988887777", None);
        repo.save(&conversation).await.expect("insert");

        conversation.transition_to(ConversationStatus::Transferred).expect("transition");
        conversation.needs_handoff = true;
        conversation.handoff_reason = Some("lead quente".to_string());
        repo.save(&conversation).await.expect("update");

        let stored = repo.find_by_id(&conversation.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ConversationStatus::Transferred);
        assert!(stored.needs_handoff);
        assert_eq!(stored.handoff_reason.as_deref(), Some("lead quente"));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_and_orders_by_recent_activity() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        let now = Utc::now();

        let mut older = Conversation::new("551100000001", None);
        older.last_message_at = Some(now - Duration::minutes(10));
        older.lead_temperature = LeadTemperature::Hot;
        let mut newer = Conversation::new("551100000002", None);
        newer.last_message_at = Some(now);
        newer.lead_temperature = LeadTemperature::Hot;
        let mut closed = Conversation::new("551100000003", None);
        closed.transition_to(ConversationStatus::Closed).expect("close");

        for conversation in [&older, &newer, &closed] {
            repo.save(conversation).await.expect("save");
        }

        let hot = repo
            .list(&ConversationFilter {
                temperature: Some(LeadTemperature::Hot),
                ..ConversationFilter::default()
            })
            .await
            .expect("list hot");
        assert_eq!(hot.iter().map(|c| c.wa_id.as_str()).collect::<Vec<_>>(), vec![
            "551100000002",
            "551100000001"
        ]);

        let closed_only = repo
            .list(&ConversationFilter {
                status: Some(ConversationStatus::Closed),
                ..ConversationFilter::default()
            })
            .await
            .expect("list closed");
        assert_eq!(closed_only.len(), 1);
        assert_eq!(closed_only[0].id, closed.id);

        let limited = repo
            .list(&ConversationFilter { limit: Some(1), ..ConversationFilter::default() })
            .await
            .expect("list limited");
        assert_eq!(limited.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_opens_for_one_number_share_the_row() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let (first, second) = tokio::join!(
            repo.open_for_wa_id("5541988881111", Some("Paulo")),
            repo.open_for_wa_id("5541988881111", None),
        );
        let first = first.expect("first open");
        let second = second.expect("second open");
        assert_eq!(first.id, second.id);
        assert_eq!(second.contact_name.as_deref(), Some("Paulo"));

        let all = repo.list(&ConversationFilter::default()).await.expect("list");
        assert_eq!(all.len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn record_inbound_counts_and_reopens_closed_conversations() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let opened = repo.open_for_wa_id("5541988882222", None).await.expect("open");
        let now = Utc::now();
        repo.record_inbound(&opened.id, Some("Rita"), now).await.expect("first");
        let counted = repo.record_inbound(&opened.id, None, now).await.expect("second");
        assert_eq!(counted.message_count, 2);
        assert_eq!(counted.messages_since_human, 2);
        assert_eq!(counted.contact_name.as_deref(), Some("Rita"));

        let mut closed = counted.clone();
        closed.transition_to(ConversationStatus::Closed).expect("close");
        closed.needs_handoff = true;
        closed.handoff_reason = Some("lead quente".to_string());
        repo.update_status(&closed).await.expect("close");

        let reopened = repo.record_inbound(&opened.id, None, now).await.expect("reopen");
        assert_eq!(reopened.status, ConversationStatus::InBot);
        assert!(!reopened.needs_handoff);
        assert!(reopened.handoff_reason.is_none());
        assert_eq!(reopened.message_count, 3);
        assert_eq!(reopened.messages_since_human, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn bot_turn_is_skipped_after_a_takeover() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let read_by_bot = repo.open_for_wa_id("5541988883333", None).await.expect("open");

        let mut taken = read_by_bot.clone();
        taken.transition_to(ConversationStatus::WithAgent).expect("take over");
        repo.update_status(&taken).await.expect("take over");

        let mut turn = read_by_bot.clone();
        turn.category = ProductCategory::Forros;
        turn.lead_score = 80;
        turn.lead_temperature = LeadTemperature::Hot;
        turn.transition_to(ConversationStatus::Qualified).expect("qualify");
        let applied = repo.apply_bot_turn(&turn, ConversationStatus::InBot).await.expect("apply");
        assert!(!applied);

        let stored = repo.find_by_id(&read_by_bot.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ConversationStatus::WithAgent);
        assert_eq!(stored.category, ProductCategory::Indefinido);

        let mut handed_back = stored.clone();
        handed_back.transition_to(ConversationStatus::Active).expect("hand back");
        repo.update_status(&handed_back).await.expect("hand back");
        let mut next_turn = handed_back.clone();
        next_turn.category = ProductCategory::Forros;
        assert!(repo
            .apply_bot_turn(&next_turn, ConversationStatus::Active)
            .await
            .expect("apply"));
        let stored = repo.find_by_id(&read_by_bot.id).await.expect("find").expect("exists");
        assert_eq!(stored.category, ProductCategory::Forros);

        pool.close().await;
    }
}
