use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use balcao_core::config::{CompanyConfig, LlmProvider};
use balcao_core::domain::agent::{AgentConfig, AgentKey};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use balcao_core::domain::knowledge::{rank_chunks, KnowledgeChunk};
use balcao_core::domain::message::Message;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::prompts::{history_messages, PromptBuilder, PromptInput};
use crate::responses::{TemplateResponder, APOLOGY};

const LAST_RESORT_PROMPT: &str = "Você é o atendente virtual de uma loja de materiais de construção. \
Responda em português do Brasil, em até duas frases, de forma cordial. \
Se não souber a resposta, diga que um consultor vai retornar em breve.";
const LAST_RESORT_HISTORY: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    SpecialistAgent,
    GeneralAgent,
    LastResort,
    Template,
    Apology,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecialistAgent => "specialist_agent",
            Self::GeneralAgent => "general_agent",
            Self::LastResort => "last_resort",
            Self::Template => "template",
            Self::Apology => "apology",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentReply {
    pub text: String,
    pub quick_replies: Vec<String>,
    pub source: ReplySource,
}

/// One step of the fallback chain that did not produce a reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub step: ReplySource,
    pub agent_key: Option<AgentKey>,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub reply: AgentReply,
    pub failures: Vec<DispatchFailure>,
}

pub struct DispatchRequest<'a> {
    pub category: ProductCategory,
    pub latest_message: &'a str,
    pub history: &'a [Message],
    pub context: &'a ProjectContext,
    pub customer_name: Option<&'a str>,
    pub agents: &'a HashMap<AgentKey, AgentConfig>,
    pub knowledge: &'a [KnowledgeChunk],
    pub correlation_id: &'a str,
}

/// Picks who answers: specialist agent, general agent, a last-resort prompt
/// on the default model, canned templates and finally a static apology.
pub struct AgentDispatcher {
    llm: Option<Arc<dyn LlmClient>>,
    llm_provider: LlmProvider,
    prompts: PromptBuilder,
    templates: TemplateResponder,
    company: CompanyConfig,
    knowledge_limit: usize,
}

impl AgentDispatcher {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        llm_provider: LlmProvider,
        prompts: PromptBuilder,
        company: CompanyConfig,
        knowledge_limit: usize,
    ) -> Self {
        Self {
            llm,
            llm_provider,
            prompts,
            templates: TemplateResponder::new(),
            company,
            knowledge_limit,
        }
    }

    pub async fn dispatch(&self, request: &DispatchRequest<'_>) -> DispatchOutcome {
        let mut failures = Vec::new();
        let mut attempted_llm = false;

        if let Some(llm) = &self.llm {
            let mut chain = Vec::with_capacity(2);
            if request.category.is_defined() {
                chain.push((AgentKey::Specialist(request.category), ReplySource::SpecialistAgent));
            }
            chain.push((AgentKey::General, ReplySource::GeneralAgent));

            for (key, source) in chain {
                let Some(agent) = request.agents.get(&key).filter(|agent| agent.is_active) else {
                    continue;
                };
                attempted_llm = true;
                match self.ask_agent(llm.as_ref(), agent, request).await {
                    Ok(text) => return self.finish(request, text, source, failures),
                    Err(error) => {
                        warn!(
                            event_name = "dispatch.agent.failed",
                            correlation_id = request.correlation_id,
                            agent_key = key.as_str(),
                            error = %error,
                            "agent reply failed"
                        );
                        failures.push(DispatchFailure { step: source, agent_key: Some(key), error });
                    }
                }
            }

            if attempted_llm {
                match self.ask_last_resort(llm.as_ref(), request).await {
                    Ok(text) => {
                        return self.finish(request, text, ReplySource::LastResort, failures);
                    }
                    Err(error) => {
                        warn!(
                            event_name = "dispatch.last_resort.failed",
                            correlation_id = request.correlation_id,
                            error = %error,
                            "last-resort reply failed"
                        );
                        failures.push(DispatchFailure {
                            step: ReplySource::LastResort,
                            agent_key: None,
                            error,
                        });
                    }
                }
            }
        }

        let canned = self.templates.respond(request.category, request.latest_message, request.context);
        if !canned.text.trim().is_empty() {
            return DispatchOutcome {
                reply: AgentReply {
                    text: canned.text,
                    quick_replies: canned.quick_replies,
                    source: ReplySource::Template,
                },
                failures,
            };
        }

        failures.push(DispatchFailure {
            step: ReplySource::Template,
            agent_key: None,
            error: "template produced an empty reply".to_string(),
        });
        DispatchOutcome { reply: apology(), failures }
    }

    fn finish(
        &self,
        request: &DispatchRequest<'_>,
        text: String,
        source: ReplySource,
        failures: Vec<DispatchFailure>,
    ) -> DispatchOutcome {
        info!(
            event_name = "dispatch.reply.ready",
            correlation_id = request.correlation_id,
            source = source.as_str(),
            category = request.category.as_str(),
            "reply generated"
        );
        DispatchOutcome { reply: AgentReply { text, quick_replies: Vec::new(), source }, failures }
    }

    async fn ask_agent(
        &self,
        llm: &dyn LlmClient,
        agent: &AgentConfig,
        request: &DispatchRequest<'_>,
    ) -> Result<String, String> {
        let query = format!("{} {}", request.latest_message, request.category.display_name());
        let knowledge = rank_chunks(&query, request.knowledge, self.knowledge_limit);

        let system = self
            .prompts
            .system_prompt(&PromptInput {
                agent,
                company: &self.company,
                category: request.category,
                customer_name: request.customer_name,
                context: request.context,
                knowledge: &knowledge,
            })
            .map_err(|error| error.to_string())?;

        // Model names only make sense for the provider they were written for.
        let model = match agent.provider {
            Some(provider) if provider != self.llm_provider => None,
            _ => agent.model.clone(),
        };

        let completion = CompletionRequest::new(system, conversation_turns(request, usize::MAX))
            .with_model(model)
            .with_sampling(agent.temperature, agent.max_tokens);
        llm.complete(&completion).await.map_err(|error| error.to_string())
    }

    async fn ask_last_resort(
        &self,
        llm: &dyn LlmClient,
        request: &DispatchRequest<'_>,
    ) -> Result<String, String> {
        let completion = CompletionRequest::new(
            LAST_RESORT_PROMPT,
            conversation_turns(request, LAST_RESORT_HISTORY),
        )
        .with_sampling(0.3, 300);
        llm.complete(&completion).await.map_err(|error| error.to_string())
    }
}

pub fn apology() -> AgentReply {
    AgentReply { text: APOLOGY.to_string(), quick_replies: Vec::new(), source: ReplySource::Apology }
}

/// History as chat turns, making sure the latest customer message is last.
fn conversation_turns(request: &DispatchRequest<'_>, keep_last: usize) -> Vec<ChatMessage> {
    let mut turns = history_messages(request.history);
    let latest = request.latest_message.trim();
    let ends_with_latest = turns
        .last()
        .map(|turn| turn.role == crate::llm::ChatRole::User && turn.content.ends_with(latest))
        .unwrap_or(false);
    if !ends_with_latest && !latest.is_empty() {
        match turns.last_mut() {
            Some(turn) if turn.role == crate::llm::ChatRole::User => {
                turn.content.push('\n');
                turn.content.push_str(latest);
            }
            _ => turns.push(ChatMessage::user(latest)),
        }
    }

    if turns.len() > keep_last {
        let mut tail = turns.split_off(turns.len() - keep_last);
        // Providers expect the conversation to open with a user turn.
        if tail.first().map(|turn| turn.role != crate::llm::ChatRole::User).unwrap_or(false) {
            tail.remove(0);
        }
        return tail;
    }
    turns
}
