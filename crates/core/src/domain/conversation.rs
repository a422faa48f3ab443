use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::category::ProductCategory;
use crate::domain::lead::LeadTemperature;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(format!("CONV-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Waiting,
    Active,
    InBot,
    WithAgent,
    Qualified,
    Transferred,
    Closed,
}

impl ConversationStatus {
    pub const ALL: [ConversationStatus; 7] = [
        Self::Waiting,
        Self::Active,
        Self::InBot,
        Self::WithAgent,
        Self::Qualified,
        Self::Transferred,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::InBot => "in_bot",
            Self::WithAgent => "with_agent",
            Self::Qualified => "qualified",
            Self::Transferred => "transferred",
            Self::Closed => "closed",
        }
    }

    /// Whether the bot still answers customer messages in this status.
    pub fn bot_replies(&self) -> bool {
        matches!(self, Self::InBot | Self::Active | Self::Qualified | Self::Waiting)
    }

    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        use ConversationStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (InBot | Active, Qualified | Transferred | WithAgent | Waiting)
                | (Qualified, Transferred | WithAgent)
                | (Transferred | Waiting, WithAgent)
                | (WithAgent, Active)
                | (Waiting, InBot)
                | (Closed, InBot)
                | (_, Closed)
        )
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "conversation status",
                value: normalized,
            })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub wa_id: String,
    pub contact_name: Option<String>,
    pub status: ConversationStatus,
    pub category: ProductCategory,
    pub lead_score: u8,
    pub lead_temperature: LeadTemperature,
    pub needs_handoff: bool,
    pub handoff_reason: Option<String>,
    pub message_count: u32,
    /// Customer messages since a human last spoke or handed the chat back.
    #[serde(default)]
    pub messages_since_human: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(wa_id: impl Into<String>, contact_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            wa_id: wa_id.into(),
            contact_name,
            status: ConversationStatus::InBot,
            category: ProductCategory::Indefinido,
            lead_score: 0,
            lead_temperature: LeadTemperature::Cold,
            needs_handoff: false,
            handoff_reason: None,
            message_count: 0,
            messages_since_human: 0,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The bot answers only while the status allows it and no handoff is pending.
    pub fn bot_owns(&self) -> bool {
        self.status.bot_replies() && !self.needs_handoff
    }

    pub fn transition_to(&mut self, next: ConversationStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidConversationTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, ConversationStatus};
    use crate::errors::DomainError;

    #[test]
    fn new_conversations_start_with_the_bot() {
        let conversation = Conversation::new("5511999990000", None);
        assert_eq!(conversation.status, ConversationStatus::InBot);
        assert!(conversation.status.bot_replies());
        assert!(conversation.id.0.starts_with("CONV-"));
    }

    #[test]
    fn handoff_path_reaches_a_human() {
        let mut conversation = Conversation::new("5511999990000", None);
        conversation.transition_to(ConversationStatus::Transferred).expect("in_bot -> transferred");
        conversation.transition_to(ConversationStatus::WithAgent).expect("transferred -> with_agent");
        assert!(!conversation.status.bot_replies());
    }

    #[test]
    fn closed_conversations_reopen_with_the_bot() {
        let mut conversation = Conversation::new("5511999990000", None);
        conversation.transition_to(ConversationStatus::Closed).expect("any -> closed");
        conversation.transition_to(ConversationStatus::InBot).expect("closed -> in_bot");
        assert_eq!(conversation.status, ConversationStatus::InBot);
    }

    #[test]
    fn blocks_skipping_from_closed_to_human() {
        let mut conversation = Conversation::new("5511999990000", None);
        conversation.transition_to(ConversationStatus::Closed).expect("any -> closed");
        let error = conversation
            .transition_to(ConversationStatus::WithAgent)
            .expect_err("closed -> with_agent should fail");
        assert!(matches!(error, DomainError::InvalidConversationTransition { .. }));
    }

    #[test]
    fn pending_handoff_silences_the_bot_while_waiting() {
        let mut conversation = Conversation::new("5511999990000", None);
        conversation.transition_to(ConversationStatus::Waiting).expect("in_bot -> waiting");
        assert!(conversation.bot_owns());

        conversation.needs_handoff = true;
        assert!(conversation.status.bot_replies());
        assert!(!conversation.bot_owns());
    }

    #[test]
    fn status_round_trips_through_wire_name() {
        for status in ConversationStatus::ALL {
            assert_eq!(status.as_str().parse::<ConversationStatus>().expect("parse"), status);
        }
    }
}
