//! Per-message orchestration: store, classify, extract, score, reply, hand off.
//!
//! [`MessagePipeline::handle_inbound`] never returns an error. Anything that
//! goes wrong is written to `system_logs`, the customer gets the fixed apology
//! and the conversation is flagged for a human.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use balcao_agent::dispatcher::{AgentReply, DispatchFailure, DispatchRequest};
use balcao_agent::guardrails::{HandoffDecision, HandoffInput, HandoffReason};
use balcao_agent::responses::{resolve_numbered_choice, APOLOGY, HANDOFF_NOTICE};
use balcao_agent::runtime::{AgentRuntime, AnalysisInput};
use balcao_core::domain::agent::{AgentConfig, AgentKey};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use balcao_core::domain::lead::LeadTemperature;
use balcao_core::domain::log::{LogLevel, SystemLogEntry};
use balcao_core::domain::message::{DeliveryStatus, Message, MessageDirection, MessageSender};
use balcao_core::errors::DomainError;
use balcao_db::repositories::{
    AgentConfigRepository, ConversationRepository, KnowledgeRepository, MessageRepository,
    ProjectContextRepository, SqlAgentConfigRepository, SqlConversationRepository,
    SqlKnowledgeRepository, SqlMessageRepository, SqlProjectContextRepository,
    SqlSystemLogRepository, SystemLogRepository,
};
use balcao_db::{DbPool, RepositoryError};
use balcao_whatsapp::{InboundMessage, OutboundMessage, StatusUpdate, WhatsAppSender};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOutcome {
    /// The WhatsApp message id was already stored.
    Duplicate,
    /// Stored without a bot reply because a human owns the conversation.
    Stored { conversation_id: ConversationId },
    Replied { conversation_id: ConversationId, reply: AgentReply, handoff: Option<String> },
    /// Processing failed and the apology was sent instead.
    Failed { reply: String },
}

/// Outbound side of a turn, shared by the bot and the console reply endpoint.
pub struct Delivery<'a> {
    pub db_pool: &'a DbPool,
    pub sender: &'a dyn WhatsAppSender,
}

impl Delivery<'_> {
    /// Persists the message first, then sends it and records the outcome.
    /// Send failures are logged and leave the row as `failed`.
    pub async fn deliver(&self, wa_id: &str, mut message: Message) -> Result<Message, RepositoryError> {
        let messages = SqlMessageRepository::new(self.db_pool.clone());
        messages.save(&message).await?;

        let outbound = OutboundMessage::text(wa_id, message.body.clone())
            .with_quick_replies(message.quick_replies.clone());
        match self.sender.send(&outbound).await {
            Ok(receipt) => {
                messages
                    .mark_sent(&message.id, receipt.wa_message_id.as_deref(), DeliveryStatus::Sent)
                    .await?;
                message.wa_message_id = receipt.wa_message_id;
                message.status = DeliveryStatus::Sent;
            }
            Err(send_error) => {
                warn!(
                    event_name = "pipeline.send.failed",
                    correlation_id = %message.conversation_id,
                    error = %send_error,
                    "whatsapp send failed"
                );
                messages.mark_sent(&message.id, None, DeliveryStatus::Failed).await?;
                message.status = DeliveryStatus::Failed;
                let entry = SystemLogEntry::error("whatsapp", send_error.to_string())
                    .for_conversation(&message.conversation_id)
                    .with_details(json!({ "message_id": message.id.0, "to": wa_id }));
                SqlSystemLogRepository::new(self.db_pool.clone()).append(&entry).await?;
            }
        }
        Ok(message)
    }
}

pub struct MessagePipeline {
    db_pool: DbPool,
    runtime: Arc<AgentRuntime>,
    sender: Arc<dyn WhatsAppSender>,
}

impl MessagePipeline {
    pub fn new(db_pool: DbPool, runtime: Arc<AgentRuntime>, sender: Arc<dyn WhatsAppSender>) -> Self {
        Self { db_pool, runtime, sender }
    }

    pub async fn handle_inbound(&self, inbound: &InboundMessage) -> PipelineOutcome {
        match self.process(inbound).await {
            Ok(outcome) => outcome,
            Err(pipeline_error) => self.recover(inbound, pipeline_error).await,
        }
    }

    /// Applies a delivery receipt to the stored outbound message.
    pub async fn apply_status(&self, update: &StatusUpdate) {
        let messages = SqlMessageRepository::new(self.db_pool.clone());
        match messages.apply_receipt(&update.wa_message_id, update.status).await {
            Ok(applied) => info!(
                event_name = "pipeline.receipt.applied",
                correlation_id = %update.wa_message_id,
                status = update.status.as_str(),
                applied,
                "delivery receipt processed"
            ),
            Err(receipt_error) => warn!(
                event_name = "pipeline.receipt.failed",
                correlation_id = %update.wa_message_id,
                error = %receipt_error,
                "delivery receipt could not be stored"
            ),
        }

        if let Some(reason) = &update.error {
            let entry = SystemLogEntry::new(LogLevel::Warn, "whatsapp", "message delivery failed")
                .with_details(json!({
                    "wa_message_id": update.wa_message_id,
                    "recipient": update.recipient,
                    "error": reason,
                }));
            self.log(entry).await;
        }
    }

    async fn process(&self, inbound: &InboundMessage) -> Result<PipelineOutcome, PipelineError> {
        let conversations = SqlConversationRepository::new(self.db_pool.clone());
        let messages = SqlMessageRepository::new(self.db_pool.clone());
        let contexts = SqlProjectContextRepository::new(self.db_pool.clone());
        let correlation_id = inbound.wa_message_id.as_str();

        if messages.wa_message_exists(&inbound.wa_message_id).await? {
            info!(
                event_name = "pipeline.inbound.duplicate",
                correlation_id,
                "duplicate webhook delivery ignored"
            );
            return Ok(PipelineOutcome::Duplicate);
        }

        let opened = conversations
            .open_for_wa_id(&inbound.wa_id, inbound.contact_name.as_deref())
            .await?;
        let mut conversation = conversations
            .record_inbound(&opened.id, inbound.contact_name.as_deref(), Utc::now())
            .await?;
        messages
            .save(&Message::inbound(
                conversation.id.clone(),
                inbound.text.clone(),
                Some(inbound.wa_message_id.clone()),
            ))
            .await?;

        if !conversation.bot_owns() {
            info!(
                event_name = "pipeline.inbound.stored_for_human",
                correlation_id,
                conversation_id = %conversation.id,
                status = conversation.status.as_str(),
                needs_handoff = conversation.needs_handoff,
                "conversation owned by a human; bot stays silent"
            );
            return Ok(PipelineOutcome::Stored { conversation_id: conversation.id });
        }

        let history = messages
            .recent_for_conversation(&conversation.id, self.runtime.history_limit())
            .await?;
        let latest = resolve_latest(&history, &inbound.text);
        let mut customer_text = messages.customer_text(&conversation.id).await?.join("\n");
        if latest != inbound.text {
            customer_text.push('\n');
            customer_text.push_str(&latest);
        }

        let prior_context = contexts.find(&conversation.id).await?.unwrap_or_default();
        let analysis = self
            .runtime
            .analyze(&AnalysisInput {
                latest_message: &latest,
                customer_text: &customer_text,
                current_category: Some(conversation.category),
                prior_context: &prior_context,
                message_count: conversation.message_count,
            })
            .await;

        if let Some(reason) = &analysis.classification.error {
            let entry = SystemLogEntry::new(LogLevel::Warn, "classifier", "classification fell back")
                .for_conversation(&conversation.id)
                .with_details(json!({ "error": reason }));
            self.log(entry).await;
        }
        if analysis.classification.category.is_defined() {
            conversation.category = analysis.classification.category;
        }

        let agents: HashMap<AgentKey, AgentConfig> = SqlAgentConfigRepository::new(self.db_pool.clone())
            .list()
            .await?
            .into_iter()
            .map(|agent| (agent.key, agent))
            .collect();
        let knowledge = SqlKnowledgeRepository::new(self.db_pool.clone())
            .candidate_chunks(conversation.category)
            .await?;
        let customer_name =
            analysis.context.customer_name.as_deref().or(conversation.contact_name.as_deref());

        let dispatch = self
            .runtime
            .respond(&DispatchRequest {
                category: conversation.category,
                latest_message: &latest,
                history: &history,
                context: &analysis.context,
                customer_name,
                agents: &agents,
                knowledge: &knowledge,
                correlation_id,
            })
            .await;
        for failure in &dispatch.failures {
            self.log(failure_entry(&conversation.id, failure)).await;
        }

        let decision = self.runtime.evaluate_handoff(&HandoffInput {
            lead_score: analysis.score.score,
            context: &analysis.context,
            messages_since_human: conversation.messages_since_human,
            latest_message: &latest,
        });
        let turn = BotTurn {
            category: conversation.category,
            lead_score: analysis.score.score,
            lead_temperature: analysis.score.temperature,
            handoff: match decision {
                HandoffDecision::Handoff(reason) => Some(reason),
                HandoffDecision::StayWithBot => None,
            },
        };

        contexts.save(&conversation.id, &analysis.context).await?;
        let conversation_id = conversation.id.clone();
        let Some(conversation) = self.commit_turn(&conversations, conversation, &turn).await? else {
            info!(
                event_name = "pipeline.turn.superseded",
                correlation_id,
                conversation_id = %conversation_id,
                "conversation left the bot during the turn; reply dropped"
            );
            return Ok(PipelineOutcome::Stored { conversation_id });
        };

        let mut reply = dispatch.reply;
        let handoff = turn.handoff.as_ref().map(|reason| {
            reply.text = format!("{}\n\n{HANDOFF_NOTICE}", reply.text);
            reply.quick_replies.clear();
            reason.code().to_string()
        });

        let outbound = Message::outbound(
            conversation.id.clone(),
            MessageSender::Bot,
            reply.text.clone(),
            reply.quick_replies.clone(),
        );
        Delivery { db_pool: &self.db_pool, sender: self.sender.as_ref() }
            .deliver(&conversation.wa_id, outbound)
            .await?;

        info!(
            event_name = "pipeline.turn.completed",
            correlation_id,
            conversation_id = %conversation.id,
            category = conversation.category.as_str(),
            confidence = analysis.classification.confidence,
            lead_score = conversation.lead_score,
            source = reply.source.as_str(),
            handoff = handoff.as_deref().unwrap_or("none"),
            "bot turn completed"
        );

        Ok(PipelineOutcome::Replied { conversation_id: conversation.id, reply, handoff })
    }

    /// Writes the turn on top of the latest row. A concurrent bot turn is
    /// merged; a takeover or close made meanwhile wins and yields `None`.
    async fn commit_turn(
        &self,
        conversations: &SqlConversationRepository,
        mut base: Conversation,
        turn: &BotTurn,
    ) -> Result<Option<Conversation>, PipelineError> {
        for _ in 0..COMMIT_ATTEMPTS {
            let expected = base.status;
            let mut updated = base.clone();
            turn.apply(&mut updated)?;
            if conversations.apply_bot_turn(&updated, expected).await? {
                return Ok(Some(updated));
            }
            match conversations.find_by_id(&base.id).await? {
                Some(fresh) if fresh.bot_owns() => base = fresh,
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    async fn recover(&self, inbound: &InboundMessage, pipeline_error: PipelineError) -> PipelineOutcome {
        error!(
            event_name = "pipeline.turn.failed",
            correlation_id = %inbound.wa_message_id,
            error = %pipeline_error,
            "bot turn failed; sending apology"
        );

        let conversations = SqlConversationRepository::new(self.db_pool.clone());
        let conversation = match conversations.find_by_wa_id(&inbound.wa_id).await {
            Ok(found) => found,
            Err(lookup_error) => {
                warn!(
                    event_name = "pipeline.recover.lookup_failed",
                    correlation_id = %inbound.wa_message_id,
                    error = %lookup_error,
                    "conversation lookup failed during recovery"
                );
                None
            }
        };

        let mut entry = SystemLogEntry::error("pipeline", pipeline_error.to_string())
            .with_details(json!({ "wa_message_id": inbound.wa_message_id, "wa_id": inbound.wa_id }));
        if let Some(conversation) = &conversation {
            entry = entry.for_conversation(&conversation.id);
        }
        self.log(entry).await;

        match conversation {
            Some(mut conversation) => {
                flag_handoff(&mut conversation, &HandoffReason::PipelineFailure);
                conversation.updated_at = Utc::now();
                if let Err(save_error) = conversations.update_status(&conversation).await {
                    warn!(
                        event_name = "pipeline.recover.flag_failed",
                        correlation_id = %inbound.wa_message_id,
                        error = %save_error,
                        "could not flag conversation for handoff"
                    );
                }
                let apology =
                    Message::outbound(conversation.id.clone(), MessageSender::Bot, APOLOGY, Vec::new());
                let delivery = Delivery { db_pool: &self.db_pool, sender: self.sender.as_ref() };
                if let Err(deliver_error) = delivery.deliver(&conversation.wa_id, apology).await {
                    warn!(
                        event_name = "pipeline.recover.deliver_failed",
                        correlation_id = %inbound.wa_message_id,
                        error = %deliver_error,
                        "apology could not be stored"
                    );
                }
            }
            None => {
                if let Err(send_error) =
                    self.sender.send(&OutboundMessage::text(&inbound.wa_id, APOLOGY)).await
                {
                    warn!(
                        event_name = "pipeline.recover.send_failed",
                        correlation_id = %inbound.wa_message_id,
                        error = %send_error,
                        "apology could not be sent"
                    );
                }
            }
        }

        PipelineOutcome::Failed { reply: APOLOGY.to_string() }
    }

    /// Writes a `system_logs` row; a failing write only reaches tracing.
    async fn log(&self, entry: SystemLogEntry) {
        if let Err(log_error) = SqlSystemLogRepository::new(self.db_pool.clone()).append(&entry).await {
            warn!(
                event_name = "pipeline.system_log.failed",
                source = %entry.source,
                message = %entry.message,
                error = %log_error,
                "system log row could not be written"
            );
        }
    }
}

/// A bare number answering the previous quick replies stands for that option.
fn resolve_latest(history: &[Message], text: &str) -> String {
    let offered = history
        .iter()
        .rev()
        .find(|message| {
            message.direction == MessageDirection::Outbound && message.sender == MessageSender::Bot
        })
        .map(|message| message.quick_replies.as_slice())
        .unwrap_or_default();
    resolve_numbered_choice(text, offered).unwrap_or_else(|| text.to_string())
}

const COMMIT_ATTEMPTS: usize = 3;

/// What a bot turn decided, applied to whichever row version is current.
struct BotTurn {
    category: ProductCategory,
    lead_score: u8,
    lead_temperature: LeadTemperature,
    handoff: Option<HandoffReason>,
}

impl BotTurn {
    fn apply(&self, conversation: &mut Conversation) -> Result<(), DomainError> {
        conversation.category = self.category;
        conversation.lead_score = self.lead_score;
        conversation.lead_temperature = self.lead_temperature;
        match &self.handoff {
            Some(reason) => flag_handoff(conversation, reason),
            None => {
                if conversation.lead_temperature == LeadTemperature::Hot
                    && conversation.status.can_transition_to(ConversationStatus::Qualified)
                {
                    conversation.transition_to(ConversationStatus::Qualified)?;
                }
            }
        }
        conversation.updated_at = Utc::now();
        Ok(())
    }
}

/// Waiting has no path to `transferred`; the pending flag alone keeps the
/// bot silent there.
fn flag_handoff(conversation: &mut Conversation, reason: &HandoffReason) {
    conversation.needs_handoff = true;
    conversation.handoff_reason = Some(reason.describe());
    if conversation.status.can_transition_to(ConversationStatus::Transferred) {
        conversation.status = ConversationStatus::Transferred;
    }
}

fn failure_entry(conversation_id: &ConversationId, failure: &DispatchFailure) -> SystemLogEntry {
    SystemLogEntry::error("dispatcher", format!("{} step failed", failure.step.as_str()))
        .for_conversation(conversation_id)
        .with_details(json!({
            "step": failure.step.as_str(),
            "agent_key": failure.agent_key.map(|key| key.as_str()),
            "error": failure.error,
        }))
}
