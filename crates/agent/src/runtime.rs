use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use balcao_core::classifier::{ClassificationResult, KeywordClassifier, KeywordTable, KeywordTableError};
use balcao_core::config::{AppConfig, ClassifierMode};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use balcao_core::domain::lead::LeadScore;
use balcao_core::scoring::LeadScorer;

use crate::dispatcher::{AgentDispatcher, DispatchOutcome, DispatchRequest};
use crate::extraction::ContextExtractor;
use crate::guardrails::{HandoffDecision, HandoffInput, HandoffPolicy};
use crate::intent::{IntentClassifier, LlmIntentClassifier};
use crate::llm::LlmClient;
use crate::prompts::{PromptBuilder, PromptError};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Keywords(#[from] KeywordTableError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// What the bot learned from one customer message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnAnalysis {
    pub classification: ClassificationResult,
    pub context: ProjectContext,
    pub score: LeadScore,
}

pub struct AnalysisInput<'a> {
    pub latest_message: &'a str,
    /// Every customer message of the conversation, oldest first.
    pub customer_text: &'a str,
    pub current_category: Option<ProductCategory>,
    pub prior_context: &'a ProjectContext,
    pub message_count: u32,
}

/// Classifier, extractor, scorer, dispatcher and handoff policy wired from
/// one [`AppConfig`]. Holds no conversation state.
pub struct AgentRuntime {
    classifier: IntentClassifier,
    extractor: ContextExtractor,
    scorer: LeadScorer,
    dispatcher: AgentDispatcher,
    handoff: HandoffPolicy,
    history_limit: u32,
}

impl AgentRuntime {
    pub fn from_config(
        config: &AppConfig,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self, RuntimeError> {
        let table = match &config.routing.keywords_path {
            Some(path) => KeywordTable::load(path)?,
            None => KeywordTable::default(),
        };
        let keyword = KeywordClassifier::new(table);

        let classifier = match (config.routing.classifier, &llm) {
            (ClassifierMode::Llm, Some(client)) => {
                IntentClassifier::Llm(LlmIntentClassifier::new(client.clone(), None))
            }
            (ClassifierMode::Llm, None) => {
                warn!(
                    event_name = "runtime.classifier.degraded",
                    "llm classifier requested without an llm client, using keywords"
                );
                IntentClassifier::Keyword(keyword)
            }
            (ClassifierMode::Keyword, _) => IntentClassifier::Keyword(keyword),
        };

        let dispatcher = AgentDispatcher::new(
            llm,
            config.llm.provider,
            PromptBuilder::new()?,
            config.company.clone(),
            config.routing.knowledge_chunks,
        );

        info!(
            event_name = "runtime.ready",
            classifier = classifier.mode(),
            handoff_score = config.routing.handoff_score,
            "agent runtime ready"
        );

        Ok(Self::new(
            classifier,
            LeadScorer::default(),
            dispatcher,
            HandoffPolicy::from_routing(&config.routing),
            config.routing.history_limit,
        ))
    }

    pub fn new(
        classifier: IntentClassifier,
        scorer: LeadScorer,
        dispatcher: AgentDispatcher,
        handoff: HandoffPolicy,
        history_limit: u32,
    ) -> Self {
        Self {
            classifier,
            extractor: ContextExtractor::new(),
            scorer,
            dispatcher,
            handoff,
            history_limit,
        }
    }

    pub fn classifier_mode(&self) -> &'static str {
        self.classifier.mode()
    }

    /// How many stored messages the pipeline loads as history.
    pub fn history_limit(&self) -> u32 {
        self.history_limit
    }

    pub async fn analyze(&self, input: &AnalysisInput<'_>) -> TurnAnalysis {
        let classification =
            self.classifier.classify(input.latest_message, input.current_category).await;
        let context = self.extractor.extract(input.customer_text, input.prior_context);
        let score = self.scorer.score(&context, input.message_count);
        TurnAnalysis { classification, context, score }
    }

    pub async fn respond(&self, request: &DispatchRequest<'_>) -> DispatchOutcome {
        self.dispatcher.dispatch(request).await
    }

    pub fn evaluate_handoff(&self, input: &HandoffInput<'_>) -> HandoffDecision {
        self.handoff.evaluate(input)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use balcao_core::config::AppConfig;
    use balcao_core::domain::category::ProductCategory;
    use balcao_core::domain::context::{ProjectContext, Urgency};
    use balcao_core::domain::lead::LeadTemperature;

    use super::{AgentRuntime, AnalysisInput};
    use crate::dispatcher::{DispatchRequest, ReplySource};
    use crate::guardrails::{HandoffDecision, HandoffInput, HandoffReason};

    fn runtime() -> AgentRuntime {
        AgentRuntime::from_config(&AppConfig::default(), None).expect("runtime")
    }

    #[tokio::test]
    async fn analysis_classifies_extracts_and_scores() {
        let runtime = runtime();
        let text = "Quero telha shingle para minha casa em Curitiba, é urgente. \
                    Meu nome é Carla, telefone (41) 99876-5432, orçamento de R$ 20 mil";
        let analysis = runtime
            .analyze(&AnalysisInput {
                latest_message: text,
                customer_text: text,
                current_category: None,
                prior_context: &ProjectContext::default(),
                message_count: 1,
            })
            .await;

        assert_eq!(analysis.classification.category, ProductCategory::TelhaShingle);
        assert_eq!(analysis.context.customer_name.as_deref(), Some("Carla"));
        assert_eq!(analysis.context.phone.as_deref(), Some("5541998765432"));
        assert_eq!(analysis.context.urgency, Some(Urgency::High));
        assert_eq!(analysis.score.temperature, LeadTemperature::Hot);

        let decision = runtime.evaluate_handoff(&HandoffInput {
            lead_score: analysis.score.score,
            context: &analysis.context,
            messages_since_human: 1,
            latest_message: text,
        });
        assert_eq!(decision, HandoffDecision::Handoff(HandoffReason::UrgentWithPhone));
    }

    #[tokio::test]
    async fn offline_runtime_answers_from_templates() {
        let runtime = runtime();
        assert_eq!(runtime.classifier_mode(), "keyword");

        let outcome = runtime
            .respond(&DispatchRequest {
                category: ProductCategory::Indefinido,
                latest_message: "oi",
                history: &[],
                context: &ProjectContext::default(),
                customer_name: None,
                agents: &HashMap::new(),
                knowledge: &[],
                correlation_id: "test",
            })
            .await;
        assert_eq!(outcome.reply.source, ReplySource::Template);
        assert!(outcome.reply.text.starts_with("Olá!"));
    }
}
