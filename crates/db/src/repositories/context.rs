use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::domain::context::{BudgetRange, ProjectContext};
use balcao_core::domain::conversation::ConversationId;

use super::{format_timestamp, parse_column, ProjectContextRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectContextRepository {
    pool: DbPool,
}

impl SqlProjectContextRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectContextRepository for SqlProjectContextRepository {
    async fn find(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ProjectContext>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                customer_name, phone, email, city, state, budget_amount, budget_min,
                budget_max, area_m2, urgency, project_type, timeline, materials_json
            FROM project_contexts
            WHERE conversation_id = ?
            "#,
        )
        .bind(&conversation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| context_from_row(&row)).transpose()
    }

    async fn save(
        &self,
        conversation_id: &ConversationId,
        context: &ProjectContext,
    ) -> Result<(), RepositoryError> {
        let materials = serde_json::to_string(&context.materials)
            .map_err(|error| RepositoryError::Decode(format!("materials: {error}")))?;
        let (budget_min, budget_max) = match &context.budget_range {
            Some(range) => (Some(range.min.to_string()), range.max.map(|max| max.to_string())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO project_contexts (
                conversation_id, customer_name, phone, email, city, state, budget_amount,
                budget_min, budget_max, area_m2, urgency, project_type, timeline,
                materials_json, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                customer_name = excluded.customer_name,
                phone = excluded.phone,
                email = excluded.email,
                city = excluded.city,
                state = excluded.state,
                budget_amount = excluded.budget_amount,
                budget_min = excluded.budget_min,
                budget_max = excluded.budget_max,
                area_m2 = excluded.area_m2,
                urgency = excluded.urgency,
                project_type = excluded.project_type,
                timeline = excluded.timeline,
                materials_json = excluded.materials_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation_id.0)
        .bind(&context.customer_name)
        .bind(&context.phone)
        .bind(&context.email)
        .bind(&context.city)
        .bind(&context.state)
        .bind(context.budget_amount.map(|amount| amount.to_string()))
        .bind(budget_min)
        .bind(budget_max)
        .bind(context.area_m2.map(|area| area.to_string()))
        .bind(context.urgency.map(|urgency| urgency.as_str()))
        .bind(context.project_type.map(|project_type| project_type.as_str()))
        .bind(&context.timeline)
        .bind(materials)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decimal_column(column: &str, value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}

fn context_from_row(row: &SqliteRow) -> Result<ProjectContext, RepositoryError> {
    let urgency: Option<String> = row.try_get("urgency")?;
    let project_type: Option<String> = row.try_get("project_type")?;
    let materials: String = row.try_get("materials_json")?;
    let budget_min = decimal_column("budget_min", row.try_get("budget_min")?)?;
    let budget_max = decimal_column("budget_max", row.try_get("budget_max")?)?;

    Ok(ProjectContext {
        customer_name: row.try_get("customer_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        budget_amount: decimal_column("budget_amount", row.try_get("budget_amount")?)?,
        budget_range: budget_min.map(|min| BudgetRange { min, max: budget_max }),
        area_m2: decimal_column("area_m2", row.try_get("area_m2")?)?,
        urgency: urgency.map(|value| parse_column("urgency", &value)).transpose()?,
        project_type: project_type
            .map(|value| parse_column("project_type", &value))
            .transpose()?,
        timeline: row.try_get("timeline")?,
        materials: serde_json::from_str(&materials).map_err(|error| {
            RepositoryError::Decode(format!("invalid value in `materials_json`: {error}"))
        })?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use balcao_core::domain::context::{BudgetRange, ProjectContext, ProjectType, Urgency};
    use balcao_core::domain::conversation::Conversation;

    use super::SqlProjectContextRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::{
        ConversationRepository, ProjectContextRepository, SqlConversationRepository,
    };

    #[tokio::test]
    async fn context_round_trip_preserves_decimals_and_materials() {
        let pool = setup_pool().await;
        let conversation = Conversation::new("5531966665555", None);
        SqlConversationRepository::new(pool.clone()).save(&conversation).await.expect("save");
        let repo = SqlProjectContextRepository::new(pool.clone());

        assert_eq!(repo.find(&conversation.id).await.expect("find"), None);

        let context = ProjectContext {
            customer_name: Some("João".to_string()),
            phone: Some("31966665555".to_string()),
            budget_amount: Some(Decimal::new(125_050, 1)),
            budget_range: Some(BudgetRange {
                min: Decimal::new(10_000, 0),
                max: Some(Decimal::new(15_000, 0)),
            }),
            area_m2: Some(Decimal::new(875, 1)),
            urgency: Some(Urgency::Medium),
            project_type: Some(ProjectType::Comercial),
            materials: vec!["drywall".to_string(), "forro".to_string()],
            ..ProjectContext::default()
        };
        repo.save(&conversation.id, &context).await.expect("save context");
        assert_eq!(repo.find(&conversation.id).await.expect("find"), Some(context.clone()));

        let updated = ProjectContext { city: Some("Belo Horizonte".to_string()), ..context };
        repo.save(&conversation.id, &updated).await.expect("update context");
        assert_eq!(repo.find(&conversation.id).await.expect("find"), Some(updated));

        pool.close().await;
    }
}
