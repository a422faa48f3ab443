//! Console configuration: agent prompts, knowledge uploads and system logs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use balcao_core::config::LlmProvider;
use balcao_core::domain::agent::{AgentConfig, AgentKey};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::knowledge::KnowledgeFile;
use balcao_core::domain::log::{LogLevel, SystemLogEntry};
use balcao_db::repositories::{
    AgentConfigRepository, KnowledgeRepository, SqlAgentConfigRepository, SqlKnowledgeRepository,
    SqlSystemLogRepository, SystemLogRepository,
};

use crate::api::{
    bad_request, correlation_id, domain_error, not_found, repository_error, ApiFailure, ApiResult,
    ConsoleState,
};

const DEFAULT_LOG_LIMIT: u32 = 100;
const MAX_LOG_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct AgentConfigUpdate {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub provider: Option<LlmProvider>,
    #[serde(default)]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeUpload {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub limit: Option<u32>,
}

pub fn router(state: ConsoleState) -> Router {
    Router::new()
        .route("/api/v1/agents", get(list_agents))
        .route("/api/v1/agents/{key}", get(get_agent).put(update_agent))
        .route("/api/v1/knowledge", get(list_knowledge).post(upload_knowledge))
        .route("/api/v1/logs", get(list_logs))
        .with_state(state)
}

pub async fn list_agents(State(state): State<ConsoleState>) -> ApiResult<Vec<AgentConfig>> {
    let correlation_id = correlation_id();
    SqlAgentConfigRepository::new(state.db_pool.clone())
        .list()
        .await
        .map(Json)
        .map_err(|error| repository_error(error, &correlation_id))
}

pub async fn get_agent(
    State(state): State<ConsoleState>,
    Path(key): Path<String>,
) -> ApiResult<AgentConfig> {
    let correlation_id = correlation_id();
    let key = parse_key(&key, &correlation_id)?;
    SqlAgentConfigRepository::new(state.db_pool.clone())
        .find(key)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?
        .map(Json)
        .ok_or_else(|| not_found(format!("agent `{key}`"), &correlation_id))
}

/// Creates or replaces the config for one agent key.
pub async fn update_agent(
    State(state): State<ConsoleState>,
    Path(key): Path<String>,
    Json(update): Json<AgentConfigUpdate>,
) -> ApiResult<AgentConfig> {
    let correlation_id = correlation_id();
    let key = parse_key(&key, &correlation_id)?;
    let config = AgentConfig {
        key,
        name: update.name.trim().to_string(),
        system_prompt: update.system_prompt.trim().to_string(),
        provider: update.provider,
        model: update.model.map(|model| model.trim().to_string()).filter(|model| !model.is_empty()),
        temperature: update.temperature,
        max_tokens: update.max_tokens,
        is_active: update.is_active,
        updated_at: Utc::now(),
    };
    config.validate().map_err(|error| domain_error(error, &correlation_id))?;

    SqlAgentConfigRepository::new(state.db_pool.clone())
        .save(&config)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    info!(
        event_name = "admin.agent.updated",
        correlation_id = %correlation_id,
        agent_key = key.as_str(),
        is_active = config.is_active,
        "agent config saved"
    );
    Ok(Json(config))
}

pub async fn list_knowledge(State(state): State<ConsoleState>) -> ApiResult<Vec<KnowledgeFile>> {
    let correlation_id = correlation_id();
    SqlKnowledgeRepository::new(state.db_pool.clone())
        .list_files()
        .await
        .map(Json)
        .map_err(|error| repository_error(error, &correlation_id))
}

/// Stores reference text, split into chunks for retrieval.
pub async fn upload_knowledge(
    State(state): State<ConsoleState>,
    Json(upload): Json<KnowledgeUpload>,
) -> Result<(StatusCode, Json<KnowledgeFile>), ApiFailure> {
    let correlation_id = correlation_id();
    let name = upload.name.trim();
    if name.is_empty() {
        return Err(bad_request("name must not be empty", &correlation_id));
    }
    if upload.content.trim().is_empty() {
        return Err(bad_request("content must not be empty", &correlation_id));
    }
    let category = match upload.category.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            raw.parse::<ProductCategory>()
                .map_err(|error| bad_request(error.to_string(), &correlation_id))?,
        ),
        None => None,
    };

    let file = SqlKnowledgeRepository::new(state.db_pool.clone())
        .create_file(name, category, &upload.content)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    info!(
        event_name = "admin.knowledge.uploaded",
        correlation_id = %correlation_id,
        file_id = %file.id,
        chunks = file.chunk_count,
        "knowledge file stored"
    );
    Ok((StatusCode::CREATED, Json(file)))
}

pub async fn list_logs(
    State(state): State<ConsoleState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Vec<SystemLogEntry>> {
    let correlation_id = correlation_id();
    let level = match query.level.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            raw.parse::<LogLevel>().map_err(|error| bad_request(error.to_string(), &correlation_id))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);

    SqlSystemLogRepository::new(state.db_pool.clone())
        .list(level, limit)
        .await
        .map(Json)
        .map_err(|error| repository_error(error, &correlation_id))
}

fn parse_key(raw: &str, correlation_id: &str) -> Result<AgentKey, ApiFailure> {
    raw.parse::<AgentKey>().map_err(|error| bad_request(error.to_string(), correlation_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        Json,
    };

    use balcao_core::domain::log::SystemLogEntry;
    use balcao_db::repositories::{SqlSystemLogRepository, SystemLogRepository};
    use balcao_db::{seed_defaults, DbPool};

    use super::{
        get_agent, list_agents, list_knowledge, list_logs, update_agent, upload_knowledge,
        AgentConfigUpdate, KnowledgeUpload, LogQuery,
    };
    use crate::api::ConsoleState;
    use crate::pipeline::tests::{setup_pool, RecordingSender};

    fn state(pool: &DbPool) -> State<ConsoleState> {
        State(ConsoleState { db_pool: pool.clone(), sender: Arc::new(RecordingSender::default()) })
    }

    fn update(prompt: &str, temperature: f32) -> Json<AgentConfigUpdate> {
        Json(AgentConfigUpdate {
            name: "Consultor de Forros".into(),
            system_prompt: prompt.into(),
            provider: None,
            model: Some("  ".into()),
            temperature,
            max_tokens: 500,
            is_active: true,
        })
    }

    #[tokio::test]
    async fn agents_can_be_listed_and_replaced() {
        let pool = setup_pool().await;
        seed_defaults(&pool).await.expect("seed");

        let Json(agents) = list_agents(state(&pool)).await.expect("list");
        assert_eq!(agents.len(), 9);

        let Json(saved) =
            update_agent(state(&pool), Path("forros".into()), update("Fale só de forros.", 0.3))
                .await
                .expect("update");
        assert_eq!(saved.model, None);

        let Json(found) = get_agent(state(&pool), Path("forros".into())).await.expect("get");
        assert_eq!(found.system_prompt, "Fale só de forros.");

        let (status, _) =
            update_agent(state(&pool), Path("forros".into()), update("Fale só de forros.", 3.5))
                .await
                .expect_err("temperature out of range");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_agent(state(&pool), Path("madeira".into())).await.expect_err("key");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        pool.close().await;
    }

    #[tokio::test]
    async fn knowledge_upload_is_chunked() {
        let pool = setup_pool().await;

        let (status, Json(file)) = upload_knowledge(
            state(&pool),
            Json(KnowledgeUpload {
                name: "forros.txt".into(),
                category: Some("forros".into()),
                content: "Forro de PVC em réguas.\n\nForro de gesso liso ou com tabica.".into(),
            }),
        )
        .await
        .expect("upload");
        assert_eq!(status, StatusCode::CREATED);
        assert!(file.chunk_count >= 1);

        let Json(files) = list_knowledge(state(&pool)).await.expect("list");
        assert_eq!(files.len(), 1);

        let (status, _) = upload_knowledge(
            state(&pool),
            Json(KnowledgeUpload { name: "x.txt".into(), category: None, content: " ".into() }),
        )
        .await
        .expect_err("empty content");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        pool.close().await;
    }

    #[tokio::test]
    async fn logs_filter_by_level() {
        let pool = setup_pool().await;
        let logs = SqlSystemLogRepository::new(pool.clone());
        logs.append(&SystemLogEntry::error("pipeline", "falhou")).await.expect("append");
        logs.append(&SystemLogEntry::new(
            balcao_core::domain::log::LogLevel::Info,
            "pipeline",
            "ok",
        ))
        .await
        .expect("append");

        let Json(errors) = list_logs(
            state(&pool),
            Query(LogQuery { level: Some("error".into()), limit: None }),
        )
        .await
        .expect("logs");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "falhou");

        let (status, _) = list_logs(
            state(&pool),
            Query(LogQuery { level: Some("loud".into()), limit: None }),
        )
        .await
        .expect_err("bad level");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        pool.close().await;
    }
}
