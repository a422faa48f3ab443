use balcao_core::config::RoutingConfig;
use balcao_core::domain::context::{ProjectContext, Urgency};
use balcao_core::text::{contains_word, normalize};

const HUMAN_REQUEST_PHRASES: [&str; 12] = [
    "atendente",
    "humano",
    "vendedor",
    "vendedora",
    "consultor",
    "consultora",
    "pessoa de verdade",
    "falar com alguem",
    "falar com uma pessoa",
    "gerente",
    "representante",
    "ligar pra mim",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandoffReason {
    CustomerRequest { phrase: String },
    UrgentWithPhone,
    HotLead { score: u8 },
    MessageLimit { count: u32 },
    PipelineFailure,
}

impl HandoffReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CustomerRequest { .. } => "customer_request",
            Self::UrgentWithPhone => "urgent_with_phone",
            Self::HotLead { .. } => "hot_lead",
            Self::MessageLimit { .. } => "message_limit",
            Self::PipelineFailure => "pipeline_failure",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::CustomerRequest { phrase } => format!("customer asked for a human (`{phrase}`)"),
            Self::UrgentWithPhone => "high urgency with a phone number".to_string(),
            Self::HotLead { score } => format!("lead score {score} reached the handoff threshold"),
            Self::MessageLimit { count } => format!("{count} customer messages without a human"),
            Self::PipelineFailure => "bot pipeline failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandoffDecision {
    StayWithBot,
    Handoff(HandoffReason),
}

impl HandoffDecision {
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Handoff(_))
    }
}

pub struct HandoffInput<'a> {
    pub lead_score: u8,
    pub context: &'a ProjectContext,
    /// Customer messages the bot answered since a human last spoke.
    pub messages_since_human: u32,
    pub latest_message: &'a str,
}

/// Decides when the bot must hand a conversation to a human.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandoffPolicy {
    pub handoff_score: u8,
    pub max_bot_messages: u32,
    pub human_request_phrases: Vec<String>,
}

impl Default for HandoffPolicy {
    fn default() -> Self {
        Self {
            handoff_score: 70,
            max_bot_messages: 12,
            human_request_phrases: HUMAN_REQUEST_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl HandoffPolicy {
    pub fn from_routing(routing: &RoutingConfig) -> Self {
        Self {
            handoff_score: routing.handoff_score,
            max_bot_messages: routing.max_bot_messages,
            ..Self::default()
        }
    }

    pub fn evaluate(&self, input: &HandoffInput<'_>) -> HandoffDecision {
        let normalized = normalize(input.latest_message);
        if let Some(phrase) =
            self.human_request_phrases.iter().find(|phrase| contains_word(&normalized, phrase))
        {
            return HandoffDecision::Handoff(HandoffReason::CustomerRequest {
                phrase: phrase.clone(),
            });
        }

        if input.context.urgency == Some(Urgency::High) && input.context.phone.is_some() {
            return HandoffDecision::Handoff(HandoffReason::UrgentWithPhone);
        }

        if input.lead_score >= self.handoff_score {
            return HandoffDecision::Handoff(HandoffReason::HotLead { score: input.lead_score });
        }

        if self.max_bot_messages > 0 && input.messages_since_human >= self.max_bot_messages {
            return HandoffDecision::Handoff(HandoffReason::MessageLimit {
                count: input.messages_since_human,
            });
        }

        HandoffDecision::StayWithBot
    }
}

#[cfg(test)]
mod tests {
    use balcao_core::domain::context::{ProjectContext, Urgency};

    use super::{HandoffDecision, HandoffInput, HandoffPolicy, HandoffReason};

    fn input<'a>(score: u8, context: &'a ProjectContext, count: u32, text: &'a str) -> HandoffInput<'a> {
        HandoffInput {
            lead_score: score,
            context,
            messages_since_human: count,
            latest_message: text,
        }
    }

    #[test]
    fn cold_short_conversation_stays_with_bot() {
        let policy = HandoffPolicy::default();
        let context = ProjectContext::default();
        assert_eq!(policy.evaluate(&input(20, &context, 2, "quero piso")), HandoffDecision::StayWithBot);
    }

    #[test]
    fn asking_for_a_person_hands_off() {
        let policy = HandoffPolicy::default();
        let context = ProjectContext::default();
        let decision = policy.evaluate(&input(0, &context, 1, "Quero falar com um Atendente, por favor"));
        assert_eq!(
            decision,
            HandoffDecision::Handoff(HandoffReason::CustomerRequest { phrase: "atendente".into() })
        );
        assert!(decision.requires_human());
    }

    #[test]
    fn urgency_needs_a_phone_to_hand_off() {
        let policy = HandoffPolicy::default();
        let urgent = ProjectContext { urgency: Some(Urgency::High), ..ProjectContext::default() };
        assert_eq!(policy.evaluate(&input(30, &urgent, 2, "é urgente")), HandoffDecision::StayWithBot);

        let reachable = ProjectContext { phone: Some("5541999990000".into()), ..urgent };
        assert_eq!(
            policy.evaluate(&input(30, &reachable, 2, "é urgente")),
            HandoffDecision::Handoff(HandoffReason::UrgentWithPhone)
        );
    }

    #[test]
    fn score_and_message_thresholds_are_inclusive() {
        let policy = HandoffPolicy::default();
        let context = ProjectContext::default();
        assert_eq!(
            policy.evaluate(&input(70, &context, 1, "ok")),
            HandoffDecision::Handoff(HandoffReason::HotLead { score: 70 })
        );
        assert_eq!(policy.evaluate(&input(69, &context, 11, "ok")), HandoffDecision::StayWithBot);
        assert_eq!(
            policy.evaluate(&input(69, &context, 12, "ok")),
            HandoffDecision::Handoff(HandoffReason::MessageLimit { count: 12 })
        );
    }
}
