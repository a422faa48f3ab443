//! Meta webhook endpoints: subscription handshake and event delivery.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use balcao_whatsapp::{
    verify_signature, verify_subscription, InboundEvent, SubscriptionQuery, WebhookPayload,
    SIGNATURE_HEADER,
};

use crate::pipeline::{MessagePipeline, PipelineOutcome};

#[derive(Clone)]
pub struct WebhookState {
    pub pipeline: Arc<MessagePipeline>,
    pub verify_token: SecretString,
    pub app_secret: Option<SecretString>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub messages: u32,
    pub duplicates: u32,
    pub statuses: u32,
    pub ignored: u32,
    pub failures: u32,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook", get(verify).post(receive)).with_state(state)
}

pub async fn verify(
    State(state): State<WebhookState>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    match verify_subscription(&query, state.verify_token.expose_secret()) {
        Ok(challenge) => {
            info!(
                event_name = "webhook.subscription.verified",
                correlation_id = "webhook",
                "webhook subscription verified"
            );
            (StatusCode::OK, challenge).into_response()
        }
        Err(verify_error) => {
            warn!(
                event_name = "webhook.subscription.rejected",
                correlation_id = "webhook",
                error = %verify_error,
                "webhook subscription rejected"
            );
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Processes every event in delivery order. After a valid signature the
/// answer is always 200 so Meta does not redeliver.
pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, StatusCode> {
    if let Some(secret) = &state.app_secret {
        let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if let Err(signature_error) = verify_signature(secret.expose_secret(), &body, header) {
            warn!(
                event_name = "webhook.signature.rejected",
                correlation_id = "webhook",
                error = %signature_error,
                "webhook signature rejected"
            );
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let payload = match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => payload,
        Err(parse_error) => {
            warn!(
                event_name = "webhook.payload.unparseable",
                correlation_id = "webhook",
                error = %parse_error,
                "webhook payload could not be parsed"
            );
            return Ok(Json(WebhookAck::default()));
        }
    };

    let mut ack = WebhookAck::default();
    for event in payload.into_events() {
        match event {
            InboundEvent::Message(message) => {
                match state.pipeline.handle_inbound(&message).await {
                    PipelineOutcome::Duplicate => ack.duplicates += 1,
                    PipelineOutcome::Failed { .. } => ack.failures += 1,
                    PipelineOutcome::Stored { .. } | PipelineOutcome::Replied { .. } => {
                        ack.messages += 1
                    }
                }
            }
            InboundEvent::Status(update) => {
                state.pipeline.apply_status(&update).await;
                ack.statuses += 1;
            }
            InboundEvent::Unsupported { kind, wa_message_id, .. } => {
                info!(
                    event_name = "webhook.message.unsupported",
                    correlation_id = %wa_message_id,
                    kind = %kind,
                    "non-text message ignored"
                );
                ack.ignored += 1;
            }
        }
    }

    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use balcao_whatsapp::verify::sign;

    use super::{router, WebhookState};
    use crate::pipeline::tests::{pipeline_with, setup_pool};

    fn text_payload(id: &str, text: &str) -> String {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA-1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": { "display_phone_number": "554130000000", "phone_number_id": "PN-1" },
                        "contacts": [{ "wa_id": "5541999990000", "profile": { "name": "Marina" } }],
                        "messages": [{
                            "from": "5541999990000",
                            "id": id,
                            "timestamp": "1760000000",
                            "type": "text",
                            "text": { "body": text }
                        }]
                    }
                }]
            }]
        })
        .to_string()
    }

    async fn state(app_secret: Option<&str>) -> (WebhookState, sqlx::SqlitePool) {
        let pool = setup_pool().await;
        let (pipeline, _sender) = pipeline_with(pool.clone(), None);
        let state = WebhookState {
            pipeline: Arc::new(pipeline),
            verify_token: SecretString::from("token-de-teste"),
            app_secret: app_secret.map(SecretString::from),
        };
        (state, pool)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn handshake_echoes_challenge_only_for_matching_token() {
        let (state, pool) = state(None).await;
        let app = router(state);

        let ok = app
            .clone()
            .oneshot(
                Request::get(
                    "/webhook?hub.mode=subscribe&hub.verify_token=token-de-teste&hub.challenge=4242",
                )
                .body(Body::empty())
                .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);
        let bytes = to_bytes(ok.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&bytes[..], b"4242");

        let denied = app
            .oneshot(
                Request::get("/webhook?hub.mode=subscribe&hub.verify_token=outro&hub.challenge=4242")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        pool.close().await;
    }

    #[tokio::test]
    async fn signed_delivery_is_processed() {
        let (state, pool) = state(Some("segredo")).await;
        let app = router(state);
        let body = text_payload("wamid.IN1", "quero porcelanato");

        let response = app
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .header("x-hub-signature-256", sign("segredo", body.as_bytes()))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let ack = json_body(response).await;
        assert_eq!(ack["messages"], 1);
        assert_eq!(ack["failures"], 0);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(stored, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let (state, pool) = state(Some("segredo")).await;
        let body = text_payload("wamid.IN1", "oi");

        let response = router(state)
            .oneshot(
                Request::post("/webhook")
                    .header("x-hub-signature-256", sign("outro-segredo", body.as_bytes()))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
    }

    #[tokio::test]
    async fn garbage_and_redeliveries_still_get_200() {
        let (state, pool) = state(None).await;
        let app = router(state);

        let garbage = app
            .clone()
            .oneshot(Request::post("/webhook").body(Body::from("not json")).expect("request"))
            .await
            .expect("response");
        assert_eq!(garbage.status(), StatusCode::OK);

        let body = text_payload("wamid.IN1", "oi");
        for expected_duplicates in [0, 1] {
            let response = app
                .clone()
                .oneshot(Request::post("/webhook").body(Body::from(body.clone())).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["duplicates"], expected_duplicates);
        }

        pool.close().await;
    }
}
