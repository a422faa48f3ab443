use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::Row;

use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::conversation::ConversationStatus;
use balcao_core::domain::lead::LeadTemperature;

use super::RepositoryError;
use crate::DbPool;

/// Aggregate lead figures for the console dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadSummary {
    pub total_conversations: i64,
    pub average_score: f64,
    pub needs_handoff: i64,
    pub by_temperature: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
}

pub struct SqlAnalyticsRepository {
    pool: DbPool,
}

impl SqlAnalyticsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn lead_summary(&self) -> Result<LeadSummary, RepositoryError> {
        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(AVG(lead_score), 0.0) AS average_score,
                COALESCE(SUM(needs_handoff), 0) AS handoffs
            FROM conversations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let mut by_temperature = zeroed(LeadTemperature::ALL.iter().map(|t| t.as_str()));
        by_temperature.extend(self.grouped("lead_temperature").await?);

        let mut by_category = zeroed(ProductCategory::ALL.iter().map(|c| c.as_str()));
        by_category.extend(self.grouped("category").await?);

        let mut by_status = zeroed(ConversationStatus::ALL.iter().map(|s| s.as_str()));
        by_status.extend(self.grouped("status").await?);

        Ok(LeadSummary {
            total_conversations: totals.try_get("total")?,
            average_score: totals.try_get("average_score")?,
            needs_handoff: totals.try_get("handoffs")?,
            by_temperature,
            by_category,
            by_status,
        })
    }

    async fn grouped(&self, column: &'static str) -> Result<Vec<(String, i64)>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {column} AS bucket, COUNT(*) AS count FROM conversations GROUP BY {column}"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, i64), RepositoryError> {
                Ok((row.try_get("bucket")?, row.try_get("count")?))
            })
            .collect()
    }
}

fn zeroed<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, i64> {
    keys.map(|key| (key.to_string(), 0)).collect()
}

#[cfg(test)]
mod tests {
    use balcao_core::domain::category::ProductCategory;
    use balcao_core::domain::conversation::Conversation;
    use balcao_core::domain::lead::LeadTemperature;

    use super::SqlAnalyticsRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::{ConversationRepository, SqlConversationRepository};

    #[tokio::test]
    async fn empty_database_reports_zeroed_buckets() {
        let pool = setup_pool().await;
        let summary = SqlAnalyticsRepository::new(pool.clone()).lead_summary().await.expect("summary");

        assert_eq!(summary.total_conversations, 0);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.by_temperature.get("hot"), Some(&0));
        assert_eq!(summary.by_category.len(), 9);
        assert_eq!(summary.by_status.len(), 7);

        pool.close().await;
    }

    #[tokio::test]
    async fn summary_counts_leads() {
        let pool = setup_pool().await;
        let conversations = SqlConversationRepository::new(pool.clone());

        let mut hot = Conversation::new("5511911110000", None);
        hot.lead_score = 80;
        hot.lead_temperature = LeadTemperature::Hot;
        hot.category = ProductCategory::EnergiaSolar;
        hot.needs_handoff = true;
        let mut cold = Conversation::new("5511922220000", None);
        cold.lead_score = 20;
        cold.category = ProductCategory::EnergiaSolar;

        conversations.save(&hot).await.expect("save hot");
        conversations.save(&cold).await.expect("save cold");

        let summary = SqlAnalyticsRepository::new(pool.clone()).lead_summary().await.expect("summary");
        assert_eq!(summary.total_conversations, 2);
        assert!((summary.average_score - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.needs_handoff, 1);
        assert_eq!(summary.by_temperature.get("hot"), Some(&1));
        assert_eq!(summary.by_temperature.get("cold"), Some(&1));
        assert_eq!(summary.by_category.get("energia_solar"), Some(&2));
        assert_eq!(summary.by_status.get("in_bot"), Some(&2));

        pool.close().await;
    }
}
