use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use balcao_core::classifier::{ClassificationResult, KeywordClassifier, RETAINED_CONFIDENCE};
use balcao_core::domain::category::ProductCategory;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient};

/// Routes a customer message to a product category.
pub enum IntentClassifier {
    Keyword(KeywordClassifier),
    Llm(LlmIntentClassifier),
}

impl IntentClassifier {
    pub async fn classify(
        &self,
        text: &str,
        current: Option<ProductCategory>,
    ) -> ClassificationResult {
        match self {
            Self::Keyword(classifier) => classifier.classify(text, current),
            Self::Llm(classifier) => classifier.classify(text, current).await,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword",
            Self::Llm(_) => "llm",
        }
    }
}

/// Asks the model for `{"category": ..., "confidence": ...}`. Any failure
/// yields [`ClassificationResult::fallback`].
pub struct LlmIntentClassifier {
    client: Arc<dyn LlmClient>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    category: String,
    #[serde(default)]
    confidence: f32,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<dyn LlmClient>, model: Option<String>) -> Self {
        Self { client, model }
    }

    pub async fn classify(
        &self,
        text: &str,
        current: Option<ProductCategory>,
    ) -> ClassificationResult {
        let request = CompletionRequest::new(classification_prompt(), vec![ChatMessage::user(text)])
            .with_model(self.model.clone())
            .with_sampling(0.0, 60);

        let raw = match self.client.complete(&request).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(event_name = "classifier.llm.failed", error = %error, "llm classification failed");
                return ClassificationResult::fallback(error.to_string());
            }
        };

        match parse_verdict(&raw) {
            Ok((category, confidence)) => finish(category, confidence, current),
            Err(reason) => {
                warn!(event_name = "classifier.llm.unparseable", reason = %reason, "llm classification unparseable");
                ClassificationResult::fallback(reason)
            }
        }
    }
}

fn classification_prompt() -> String {
    let categories: Vec<String> = ProductCategory::ALL
        .iter()
        .map(|category| format!("- {} ({})", category.as_str(), category.display_name()))
        .collect();
    format!(
        "Classifique a mensagem do cliente de uma loja de materiais de construção em uma das \
         categorias abaixo. Use `indefinido` quando não houver produto claro.\n{}\n\n\
         Responda somente com JSON no formato {{\"category\": \"<categoria>\", \"confidence\": <0 a 1>}}.",
        categories.join("\n")
    )
}

pub(crate) fn parse_verdict(raw: &str) -> Result<(ProductCategory, f32), String> {
    let start = raw.find('{').ok_or_else(|| "llm reply has no JSON object".to_string())?;
    let end = raw.rfind('}').filter(|end| *end > start).ok_or_else(|| {
        "llm reply has an unterminated JSON object".to_string()
    })?;

    let verdict: LlmVerdict = serde_json::from_str(&raw[start..=end])
        .map_err(|error| format!("llm reply is not a verdict: {error}"))?;
    let category = verdict
        .category
        .parse::<ProductCategory>()
        .map_err(|error| format!("llm reply names {error}"))?;

    let confidence = if verdict.confidence.is_finite() {
        verdict.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok((category, confidence))
}

fn finish(
    category: ProductCategory,
    confidence: f32,
    current: Option<ProductCategory>,
) -> ClassificationResult {
    if category.is_defined() {
        return ClassificationResult {
            category,
            confidence,
            matched_keywords: Vec::new(),
            retained_previous: false,
            error: None,
        };
    }

    match current.filter(ProductCategory::is_defined) {
        Some(previous) => ClassificationResult {
            category: previous,
            confidence: RETAINED_CONFIDENCE,
            matched_keywords: Vec::new(),
            retained_previous: true,
            error: None,
        },
        None => ClassificationResult {
            category: ProductCategory::Indefinido,
            confidence: 0.0,
            matched_keywords: Vec::new(),
            retained_previous: false,
            error: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use balcao_core::classifier::KeywordClassifier;
    use balcao_core::domain::category::ProductCategory;

    use super::{parse_verdict, IntentClassifier, LlmIntentClassifier};
    use crate::llm::{CompletionRequest, LlmClient, LlmError};

    struct CannedLlm(Result<String, LlmError>);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            self.0.clone()
        }
    }

    fn llm_classifier(reply: Result<String, LlmError>) -> IntentClassifier {
        IntentClassifier::Llm(LlmIntentClassifier::new(Arc::new(CannedLlm(reply)), None))
    }

    #[test]
    fn verdict_tolerates_surrounding_prose() {
        let (category, confidence) = parse_verdict(
            "Claro! ```json\n{\"category\": \"steel_frame\", \"confidence\": 1.7}\n```",
        )
        .expect("verdict");
        assert_eq!(category, ProductCategory::SteelFrame);
        assert_eq!(confidence, 1.0);

        assert!(parse_verdict("não sei").is_err());
        assert!(parse_verdict("{\"category\": \"madeira\"}").is_err());
    }

    #[tokio::test]
    async fn llm_verdict_is_used() {
        let classifier = llm_classifier(Ok(r#"{"category":"forros","confidence":0.8}"#.into()));
        let result = classifier.classify("forro de pvc para a sala", None).await;
        assert_eq!(result.category, ProductCategory::Forros);
        assert!((result.confidence - 0.8).abs() < f32::EPSILON);
        assert!(result.error.is_none());
        assert_eq!(classifier.mode(), "llm");
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_indefinido() {
        let classifier = llm_classifier(Err(LlmError::Transport("connection refused".into())));
        let result = classifier.classify("quero telha", Some(ProductCategory::TelhaShingle)).await;
        assert_eq!(result.category, ProductCategory::Indefinido);
        assert_eq!(result.confidence, 0.0);
        assert!(result.error.as_deref().unwrap_or_default().contains("connection refused"));
    }

    #[tokio::test]
    async fn undefined_llm_verdict_keeps_current_category() {
        let classifier =
            llm_classifier(Ok(r#"{"category":"indefinido","confidence":0.2}"#.into()));
        let result = classifier.classify("ok, obrigado", Some(ProductCategory::Forros)).await;
        assert_eq!(result.category, ProductCategory::Forros);
        assert!(result.retained_previous);
    }

    #[tokio::test]
    async fn keyword_mode_delegates_to_table() {
        let classifier = IntentClassifier::Keyword(KeywordClassifier::default());
        let result = classifier.classify("quero painel solar", None).await;
        assert_eq!(result.category, ProductCategory::EnergiaSolar);
        assert_eq!(classifier.mode(), "keyword");
    }
}
