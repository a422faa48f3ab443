use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use balcao_db::DbPool;
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    send_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub status: &'static str,
    pub detail: String,
}

/// Readiness is decided by the database alone. The agent and WhatsApp
/// probes are informational.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: ProbeResult,
    pub agents: ProbeResult,
    pub whatsapp: ProbeResult,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, send_enabled: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, send_enabled })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = probe_database(&state.db_pool).await;
    let ready = database.status == "ready";
    let agents = if ready {
        probe_agents(&state.db_pool).await
    } else {
        ProbeResult { status: "unknown", detail: "database unavailable".to_string() }
    };
    let whatsapp = if state.send_enabled {
        ProbeResult { status: "ready", detail: "outbound delivery enabled".to_string() }
    } else {
        ProbeResult { status: "disabled", detail: "replies are stored but not sent".to_string() }
    };

    let report = HealthReport {
        status: if ready { "ready" } else { "degraded" },
        database,
        agents,
        whatsapp,
        checked_at: Utc::now().to_rfc3339(),
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

async fn probe_database(pool: &DbPool) -> ProbeResult {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ProbeResult { status: "ready", detail: "sqlite reachable".to_string() },
        Err(error) => {
            ProbeResult { status: "degraded", detail: format!("sqlite query failed: {error}") }
        }
    }
}

async fn probe_agents(pool: &DbPool) -> ProbeResult {
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM agent_configs WHERE is_active = 1",
    )
    .fetch_one(pool)
    .await;

    match active {
        Ok(0) => ProbeResult {
            status: "unconfigured",
            detail: "no active agents, replies fall back to templates".to_string(),
        },
        Ok(count) => ProbeResult { status: "ready", detail: format!("{count} active agents") },
        Err(error) => ProbeResult { status: "unknown", detail: error.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use balcao_db::seed_defaults;

    use crate::health::{health, HealthState};
    use crate::pipeline::tests::setup_pool;

    #[tokio::test]
    async fn seeded_database_reports_ready_agents() {
        let pool = setup_pool().await;
        seed_defaults(&pool).await.expect("seed");

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool.clone(), send_enabled: false })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ready");
        assert_eq!(report.agents.status, "ready");
        assert_eq!(report.agents.detail, "9 active agents");
        assert_eq!(report.whatsapp.status, "disabled");

        pool.close().await;
    }

    #[tokio::test]
    async fn empty_agent_table_is_reported_but_still_ready() {
        let pool = setup_pool().await;

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool.clone(), send_enabled: true })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.agents.status, "unconfigured");
        assert_eq!(report.whatsapp.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_degrades_the_report() {
        let pool = setup_pool().await;
        pool.close().await;

        let (status, Json(report)) =
            health(State(HealthState { db_pool: pool, send_enabled: true })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.database.status, "degraded");
        assert_eq!(report.agents.status, "unknown");
    }
}
