//! Console inbox: conversation list, detail, human replies and status changes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use balcao_core::domain::context::ProjectContext;
use balcao_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use balcao_core::domain::lead::LeadTemperature;
use balcao_core::domain::log::SystemLogEntry;
use balcao_core::domain::message::{Message, MessageSender};
use balcao_db::repositories::{
    ConversationFilter, ConversationRepository, MessageRepository, ProjectContextRepository,
    SqlConversationRepository, SqlMessageRepository, SqlProjectContextRepository,
    SqlSystemLogRepository, SystemLogRepository,
};

use crate::api::{
    bad_request, correlation_id, domain_error, not_found, repository_error, ApiFailure, ApiResult,
    ConsoleState,
};
use crate::pipeline::Delivery;

const DETAIL_MESSAGE_LIMIT: u32 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    pub status: Option<String>,
    pub temperature: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub context: ProjectContext,
    pub messages: Vec<Message>,
    pub logs: Vec<SystemLogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AgentReplyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

pub fn router(state: ConsoleState) -> Router {
    Router::new()
        .route("/api/v1/conversations", get(list_conversations))
        .route("/api/v1/conversations/{id}", get(conversation_detail))
        .route("/api/v1/conversations/{id}/messages", post(send_agent_reply))
        .route("/api/v1/conversations/{id}/status", post(change_status))
        .with_state(state)
}

pub async fn list_conversations(
    State(state): State<ConsoleState>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Vec<Conversation>> {
    let correlation_id = correlation_id();
    let status = parse_filter::<ConversationStatus>(query.status.as_deref(), &correlation_id)?;
    let temperature = parse_filter::<LeadTemperature>(query.temperature.as_deref(), &correlation_id)?;

    let conversations = SqlConversationRepository::new(state.db_pool.clone())
        .list(&ConversationFilter { status, temperature, limit: query.limit })
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;
    Ok(Json(conversations))
}

pub async fn conversation_detail(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
) -> ApiResult<ConversationDetail> {
    let correlation_id = correlation_id();
    let conversation = load_conversation(&state, &id, &correlation_id).await?;
    let to_api = |error| repository_error(error, &correlation_id);

    let context = SqlProjectContextRepository::new(state.db_pool.clone())
        .find(&conversation.id)
        .await
        .map_err(to_api)?
        .unwrap_or_default();
    let messages = SqlMessageRepository::new(state.db_pool.clone())
        .recent_for_conversation(&conversation.id, DETAIL_MESSAGE_LIMIT)
        .await
        .map_err(to_api)?;
    let logs = SqlSystemLogRepository::new(state.db_pool.clone())
        .list_for_conversation(&conversation.id)
        .await
        .map_err(to_api)?;

    Ok(Json(ConversationDetail { conversation, context, messages, logs }))
}

/// A console user answers the customer. The conversation moves to
/// `with_agent` so the bot stops replying.
pub async fn send_agent_reply(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    Json(request): Json<AgentReplyRequest>,
) -> ApiResult<Message> {
    let correlation_id = correlation_id();
    let body = request.body.trim();
    if body.is_empty() {
        return Err(bad_request("body must not be empty", &correlation_id));
    }

    let mut conversation = load_conversation(&state, &id, &correlation_id).await?;
    if conversation.status != ConversationStatus::WithAgent {
        conversation
            .transition_to(ConversationStatus::WithAgent)
            .map_err(|error| domain_error(error, &correlation_id))?;
    }
    conversation.messages_since_human = 0;
    conversation.last_message_at = Some(Utc::now());
    SqlConversationRepository::new(state.db_pool.clone())
        .update_status(&conversation)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let message = Message::outbound(conversation.id.clone(), MessageSender::Agent, body, Vec::new());
    let delivered = Delivery { db_pool: &state.db_pool, sender: state.sender.as_ref() }
        .deliver(&conversation.wa_id, message)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    info!(
        event_name = "inbox.agent_reply.sent",
        correlation_id = %correlation_id,
        conversation_id = %conversation.id,
        status = delivered.status.as_str(),
        "human reply delivered"
    );
    Ok(Json(delivered))
}

/// Take over (`with_agent`), hand back (`active`) or close a conversation.
pub async fn change_status(
    State(state): State<ConsoleState>,
    Path(id): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Conversation> {
    let correlation_id = correlation_id();
    let next = request
        .status
        .parse::<ConversationStatus>()
        .map_err(|error| bad_request(error.to_string(), &correlation_id))?;

    let mut conversation = load_conversation(&state, &id, &correlation_id).await?;
    let previous = conversation.status;
    conversation.transition_to(next).map_err(|error| domain_error(error, &correlation_id))?;
    if next != previous && (next.bot_replies() || next == ConversationStatus::Closed) {
        conversation.needs_handoff = false;
        conversation.handoff_reason = None;
        conversation.messages_since_human = 0;
    }

    SqlConversationRepository::new(state.db_pool.clone())
        .update_status(&conversation)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    info!(
        event_name = "inbox.status.changed",
        correlation_id = %correlation_id,
        conversation_id = %conversation.id,
        from = previous.as_str(),
        to = next.as_str(),
        "conversation status changed"
    );
    Ok(Json(conversation))
}

async fn load_conversation(
    state: &ConsoleState,
    id: &str,
    correlation_id: &str,
) -> Result<Conversation, ApiFailure> {
    SqlConversationRepository::new(state.db_pool.clone())
        .find_by_id(&ConversationId(id.to_string()))
        .await
        .map_err(|error| repository_error(error, correlation_id))?
        .ok_or_else(|| not_found(format!("conversation `{id}`"), correlation_id))
}

fn parse_filter<T>(raw: Option<&str>, correlation_id: &str) -> Result<Option<T>, ApiFailure>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|error| bad_request(error.to_string(), correlation_id)),
        None => Ok(None),
    }
}
