use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(format!("MSG-{}", uuid::Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Customer,
    Bot,
    Agent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Received,
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(DomainError::UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

wire_enum!(MessageDirection, "message direction", {
    Inbound => "inbound",
    Outbound => "outbound",
});

wire_enum!(MessageSender, "message sender", {
    Customer => "customer",
    Bot => "bot",
    Agent => "agent",
});

wire_enum!(DeliveryStatus, "delivery status", {
    Received => "received",
    Pending => "pending",
    Sent => "sent",
    Delivered => "delivered",
    Read => "read",
    Failed => "failed",
});

impl DeliveryStatus {
    /// Delivery receipts can arrive out of order; a status never moves backwards.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Received | Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub direction: MessageDirection,
    pub sender: MessageSender,
    pub body: String,
    pub wa_message_id: Option<String>,
    pub status: DeliveryStatus,
    pub quick_replies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn inbound(
        conversation_id: ConversationId,
        body: impl Into<String>,
        wa_message_id: Option<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            direction: MessageDirection::Inbound,
            sender: MessageSender::Customer,
            body: body.into(),
            wa_message_id,
            status: DeliveryStatus::Received,
            quick_replies: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn outbound(
        conversation_id: ConversationId,
        sender: MessageSender,
        body: impl Into<String>,
        quick_replies: Vec<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            conversation_id,
            direction: MessageDirection::Outbound,
            sender,
            body: body.into(),
            wa_message_id: None,
            status: DeliveryStatus::Pending,
            quick_replies,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeliveryStatus, MessageSender};

    #[test]
    fn delivery_rank_orders_receipts() {
        assert!(DeliveryStatus::Read.rank() > DeliveryStatus::Delivered.rank());
        assert!(DeliveryStatus::Delivered.rank() > DeliveryStatus::Sent.rank());
    }

    #[test]
    fn wire_names_parse_case_insensitively() {
        assert_eq!("Agent".parse::<MessageSender>().expect("parse"), MessageSender::Agent);
        assert_eq!("read".parse::<DeliveryStatus>().expect("parse"), DeliveryStatus::Read);
        assert!("bounced".parse::<DeliveryStatus>().is_err());
    }
}
