use tera::{Context, Tera};
use thiserror::Error;

use balcao_core::config::CompanyConfig;
use balcao_core::domain::agent::AgentConfig;
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use balcao_core::domain::knowledge::KnowledgeChunk;
use balcao_core::domain::message::{Message, MessageSender};

use crate::llm::{ChatMessage, ChatRole};
use crate::responses::{next_missing_field, MissingField};

const SYSTEM_TEMPLATE: &str = "agent_system";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptInput<'a> {
    pub agent: &'a AgentConfig,
    pub company: &'a CompanyConfig,
    pub category: ProductCategory,
    pub customer_name: Option<&'a str>,
    pub context: &'a ProjectContext,
    pub knowledge: &'a [&'a KnowledgeChunk],
}

/// Renders agent system prompts from the embedded Tera template.
pub struct PromptBuilder {
    tera: Tera,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            SYSTEM_TEMPLATE,
            include_str!("../../../templates/prompts/agent_system.tera"),
        )?;
        Ok(Self { tera })
    }

    pub fn system_prompt(&self, input: &PromptInput<'_>) -> Result<String, PromptError> {
        let missing = next_missing_field(input.category, input.context).map(|field| match field {
            MissingField::Area => "metragem da área em m²",
            MissingField::City => "cidade da obra",
            MissingField::Budget => "orçamento previsto",
        });
        let knowledge: Vec<&str> =
            input.knowledge.iter().map(|chunk| chunk.content.as_str()).collect();

        let mut context = Context::new();
        context.insert("agent_prompt", input.agent.system_prompt.trim());
        context.insert("company_name", &input.company.name);
        context.insert("company_website", &input.company.website);
        context.insert("business_hours", &input.company.business_hours);
        context.insert("company_facts", &input.company.facts);
        context.insert("category", input.category.display_name());
        context.insert("customer_name", &input.customer_name);
        context.insert("context_lines", &input.context.summary_lines());
        context.insert("missing_field", &missing);
        context.insert("knowledge", &knowledge);

        Ok(self.tera.render(SYSTEM_TEMPLATE, &context)?.trim().to_string())
    }
}

/// Turns stored messages into the chat list sent to the model. Customer rows
/// become user turns, bot and human replies become assistant turns, runs of
/// the same role are joined and the list always opens with a user turn.
pub fn history_messages(history: &[Message]) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    for message in history {
        let body = message.body.trim();
        if body.is_empty() {
            continue;
        }
        let role = match message.sender {
            MessageSender::Customer => ChatRole::User,
            MessageSender::Bot | MessageSender::Agent => ChatRole::Assistant,
        };
        if let Some(last) = messages.last_mut() {
            if last.role == role {
                last.content.push('\n');
                last.content.push_str(body);
                continue;
            }
        }
        if messages.is_empty() && role == ChatRole::Assistant {
            continue;
        }
        messages.push(ChatMessage { role, content: body.to_string() });
    }
    messages
}
