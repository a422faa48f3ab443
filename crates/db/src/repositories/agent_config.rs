use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use balcao_core::config::LlmProvider;
use balcao_core::domain::agent::{AgentConfig, AgentKey};

use super::{
    format_timestamp, parse_column, parse_timestamp, to_u32, AgentConfigRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlAgentConfigRepository {
    pool: DbPool,
}

impl SqlAgentConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentConfigRepository for SqlAgentConfigRepository {
    async fn list(&self) -> Result<Vec<AgentConfig>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT agent_key, name, system_prompt, provider, model, temperature, max_tokens,
                   is_active, updated_at
            FROM agent_configs
            ORDER BY agent_key = 'general', agent_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(agent_config_from_row).collect()
    }

    async fn find(&self, key: AgentKey) -> Result<Option<AgentConfig>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT agent_key, name, system_prompt, provider, model, temperature, max_tokens,
                   is_active, updated_at
            FROM agent_configs
            WHERE agent_key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| agent_config_from_row(&row)).transpose()
    }

    async fn save(&self, config: &AgentConfig) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agent_configs (
                agent_key, name, system_prompt, provider, model, temperature, max_tokens,
                is_active, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_key) DO UPDATE SET
                name = excluded.name,
                system_prompt = excluded.system_prompt,
                provider = excluded.provider,
                model = excluded.model,
                temperature = excluded.temperature,
                max_tokens = excluded.max_tokens,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.key.as_str())
        .bind(&config.name)
        .bind(&config.system_prompt)
        .bind(config.provider.map(|provider| provider.as_str()))
        .bind(&config.model)
        .bind(f64::from(config.temperature))
        .bind(i64::from(config.max_tokens))
        .bind(config.is_active)
        .bind(format_timestamp(&config.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn agent_config_from_row(row: &SqliteRow) -> Result<AgentConfig, RepositoryError> {
    let key: String = row.try_get("agent_key")?;
    let provider: Option<String> = row.try_get("provider")?;
    let temperature: f64 = row.try_get("temperature")?;
    let max_tokens: i64 = row.try_get("max_tokens")?;

    Ok(AgentConfig {
        key: parse_column("agent_key", &key)?,
        name: row.try_get("name")?,
        system_prompt: row.try_get("system_prompt")?,
        provider: provider.map(|value| parse_column::<LlmProvider>("provider", &value)).transpose()?,
        model: row.try_get("model")?,
        temperature: temperature as f32,
        max_tokens: to_u32("max_tokens", max_tokens)?,
        is_active: row.try_get("is_active")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use balcao_core::config::LlmProvider;
    use balcao_core::domain::agent::{AgentConfig, AgentKey};
    use balcao_core::domain::category::ProductCategory;

    use super::SqlAgentConfigRepository;
    use crate::repositories::test_support::setup_pool;
    use crate::repositories::AgentConfigRepository;

    fn config(key: AgentKey) -> AgentConfig {
        AgentConfig {
            key,
            name: format!("Agente {key}"),
            system_prompt: "Você é um consultor.".to_string(),
            provider: Some(LlmProvider::Anthropic),
            model: Some("claude-3-5-haiku-latest".to_string()),
            temperature: 0.5,
            max_tokens: 500,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn agent_configs_upsert_and_list_general_last() {
        let pool = setup_pool().await;
        let repo = SqlAgentConfigRepository::new(pool.clone());

        repo.save(&config(AgentKey::General)).await.expect("save general");
        repo.save(&config(AgentKey::Specialist(ProductCategory::SteelFrame)))
            .await
            .expect("save steel frame");
        repo.save(&config(AgentKey::Specialist(ProductCategory::EnergiaSolar)))
            .await
            .expect("save solar");

        let mut disabled = config(AgentKey::Specialist(ProductCategory::SteelFrame));
        disabled.is_active = false;
        disabled.provider = None;
        repo.save(&disabled).await.expect("update steel frame");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed.iter().map(|c| c.key.as_str()).collect::<Vec<_>>(), vec![
            "energia_solar",
            "steel_frame",
            "general"
        ]);

        let stored = repo
            .find(AgentKey::Specialist(ProductCategory::SteelFrame))
            .await
            .expect("find")
            .expect("exists");
        assert!(!stored.is_active);
        assert_eq!(stored.provider, None);
        assert!((stored.temperature - 0.5).abs() < f32::EPSILON);

        assert!(repo.find(AgentKey::Specialist(ProductCategory::Forros)).await.expect("find").is_none());

        pool.close().await;
    }
}
