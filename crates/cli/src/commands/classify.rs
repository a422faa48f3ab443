use balcao_agent::runtime::{AgentRuntime, AnalysisInput, TurnAnalysis};
use balcao_core::config::{AppConfig, LoadOptions};
use balcao_core::domain::category::ProductCategory;
use balcao_core::domain::context::ProjectContext;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ClassifyReport<'a> {
    command: &'static str,
    status: &'static str,
    classifier: &'static str,
    message: &'a str,
    #[serde(flatten)]
    analysis: TurnAnalysis,
}

/// Runs the keyword classifier, the project extractor and the lead scorer on
/// one message. No LLM client is built, so `llm` mode falls back to keywords.
pub fn run(message: &str, current_category: Option<&str>) -> CommandResult {
    let current_category = match current_category.map(str::parse::<ProductCategory>).transpose() {
        Ok(category) => category,
        Err(error) => {
            return CommandResult::failure("classify", "invalid_category", error.to_string(), 2);
        }
    };
    if message.trim().is_empty() {
        return CommandResult::failure("classify", "invalid_message", "message is empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "classify",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let agent_runtime = match AgentRuntime::from_config(&config, None) {
        Ok(agent_runtime) => agent_runtime,
        Err(error) => {
            return CommandResult::failure("classify", "runtime_init", error.to_string(), 3);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "classify",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let prior_context = ProjectContext::default();
    let analysis = runtime.block_on(agent_runtime.analyze(&AnalysisInput {
        latest_message: message,
        customer_text: message,
        current_category,
        prior_context: &prior_context,
        message_count: 1,
    }));

    let report = ClassifyReport {
        command: "classify",
        status: "ok",
        classifier: agent_runtime.classifier_mode(),
        message,
        analysis,
    };
    CommandResult::report(0, &report)
}
