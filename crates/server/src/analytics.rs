use axum::{extract::State, routing::get, Json, Router};

use balcao_db::repositories::{LeadSummary, SqlAnalyticsRepository};

use crate::api::{correlation_id, repository_error, ApiResult, ConsoleState};

pub fn router(state: ConsoleState) -> Router {
    Router::new().route("/api/v1/analytics/leads", get(lead_summary)).with_state(state)
}

pub async fn lead_summary(State(state): State<ConsoleState>) -> ApiResult<LeadSummary> {
    let correlation_id = correlation_id();
    SqlAnalyticsRepository::new(state.db_pool.clone())
        .lead_summary()
        .await
        .map(Json)
        .map_err(|error| repository_error(error, &correlation_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::router;
    use crate::api::ConsoleState;
    use crate::pipeline::tests::{inbound, pipeline_with, setup_pool, RecordingSender};

    #[tokio::test]
    async fn summary_reflects_pipeline_activity() {
        let pool = setup_pool().await;
        let (pipeline, _sender) = pipeline_with(pool.clone(), None);
        pipeline.handle_inbound(&inbound("wamid.IN1", "quero impermeabilizante para a laje")).await;

        let app = router(ConsoleState {
            db_pool: pool.clone(),
            sender: Arc::new(RecordingSender::default()),
        });
        let response = app
            .oneshot(Request::get("/api/v1/analytics/leads").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let summary: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(summary["total_conversations"], 1);
        assert_eq!(summary["by_category"]["impermeabilizacao"], 1);
        assert_eq!(summary["by_status"]["in_bot"], 1);

        pool.close().await;
    }
}
