use serde::Deserialize;

use balcao_core::domain::message::DeliveryStatus;

/// Top-level body of a Cloud API webhook delivery.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WaMessage {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
    #[serde(default)]
    pub button: Option<ButtonBody>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Interactive {
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ButtonBody {
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WaStatus {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub errors: Vec<WaError>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WaError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub title: String,
}

/// Normalized view of one webhook item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Status(StatusUpdate),
    Unsupported { kind: String, wa_message_id: String, wa_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub wa_id: String,
    pub contact_name: Option<String>,
    pub wa_message_id: String,
    pub text: String,
    pub timestamp: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub wa_message_id: String,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

impl WebhookPayload {
    /// Flattens every entry and change into events, in delivery order.
    /// Statuses with an unknown name are skipped.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        for change in self.entry.into_iter().flat_map(|entry| entry.changes) {
            if !change.field.is_empty() && change.field != "messages" {
                continue;
            }
            let value = change.value;

            for message in value.messages {
                let contact_name = value
                    .contacts
                    .iter()
                    .find(|contact| contact.wa_id == message.from)
                    .or_else(|| value.contacts.first())
                    .and_then(|contact| contact.profile.as_ref())
                    .and_then(|profile| profile.name.clone());
                events.push(normalize_message(message, contact_name));
            }

            for status in value.statuses {
                let Some(delivery) = delivery_status(&status.status) else {
                    continue;
                };
                let error = status
                    .errors
                    .first()
                    .map(|error| format!("{} ({})", error.title, error.code));
                events.push(InboundEvent::Status(StatusUpdate {
                    wa_message_id: status.id,
                    recipient: status.recipient_id,
                    status: delivery,
                    error,
                }));
            }
        }
        events
    }
}

fn normalize_message(message: WaMessage, contact_name: Option<String>) -> InboundEvent {
    let text = match message.kind.as_str() {
        "text" => message.text.map(|text| text.body),
        "interactive" => message.interactive.and_then(|interactive| {
            interactive.button_reply.or(interactive.list_reply).map(|reply| reply.title)
        }),
        "button" => message.button.map(|button| button.text),
        _ => None,
    };

    match text.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()) {
        Some(text) => InboundEvent::Message(InboundMessage {
            wa_id: message.from,
            contact_name,
            wa_message_id: message.id,
            text,
            timestamp: message.timestamp.parse().ok(),
        }),
        None => InboundEvent::Unsupported {
            kind: message.kind,
            wa_message_id: message.id,
            wa_id: message.from,
        },
    }
}

fn delivery_status(value: &str) -> Option<DeliveryStatus> {
    match value {
        "sent" => Some(DeliveryStatus::Sent),
        "delivered" => Some(DeliveryStatus::Delivered),
        "read" => Some(DeliveryStatus::Read),
        "failed" => Some(DeliveryStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use balcao_core::domain::message::DeliveryStatus;

    use super::{InboundEvent, WebhookPayload};

    fn parse(raw: &str) -> Vec<InboundEvent> {
        serde_json::from_str::<WebhookPayload>(raw).expect("payload").into_events()
    }

    #[test]
    fn text_message_is_normalized_with_contact_name() {
        let events = parse(
            r#"{
              "object": "whatsapp_business_account",
              "entry": [{
                "id": "102290129340398",
                "changes": [{
                  "field": "messages",
                  "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550783881", "phone_number_id": "106540352242922"},
                    "contacts": [{"profile": {"name": "Sheena Nelson"}, "wa_id": "5541999990000"}],
                    "messages": [{
                      "from": "5541999990000",
                      "id": "wamid.HBgLMTY1MDM4Nzk0MzkVAgASGBQzQTRBNjU5OUFFRTAzODEwMTQ0RgA=",
                      "timestamp": "1749416383",
                      "type": "text",
                      "text": {"body": "  Quero orçamento de drywall  "}
                    }]
                  }
                }]
              }]
            }"#,
        );

        assert_eq!(events.len(), 1);
        let InboundEvent::Message(message) = &events[0] else {
            panic!("expected message event, got {:?}", events[0]);
        };
        assert_eq!(message.wa_id, "5541999990000");
        assert_eq!(message.contact_name.as_deref(), Some("Sheena Nelson"));
        assert_eq!(message.text, "Quero orçamento de drywall");
        assert_eq!(message.timestamp, Some(1_749_416_383));
    }

    #[test]
    fn button_replies_use_their_title_as_text() {
        let events = parse(
            r#"{"entry": [{"changes": [{"field": "messages", "value": {
                "messages": [{
                  "from": "5511900000000", "id": "wamid.B1", "type": "interactive",
                  "interactive": {"type": "button_reply", "button_reply": {"id": "qr_0", "title": "Sim, quero"}}
                }]
            }}]}]}"#,
        );

        assert!(matches!(&events[0], InboundEvent::Message(message) if message.text == "Sim, quero"));
    }

    #[test]
    fn statuses_and_media_are_separated() {
        let events = parse(
            r#"{"entry": [{"changes": [{"field": "messages", "value": {
                "messages": [{"from": "5511900000000", "id": "wamid.IMG", "type": "image", "image": {"id": "123"}}],
                "statuses": [
                  {"id": "wamid.OUT", "status": "delivered", "recipient_id": "5511900000000", "timestamp": "1"},
                  {"id": "wamid.OUT", "status": "deleted", "recipient_id": "5511900000000", "timestamp": "2"},
                  {"id": "wamid.OUT2", "status": "failed", "recipient_id": "5511900000000",
                   "errors": [{"code": 131047, "title": "Re-engagement message"}]}
                ]
            }}]}]}"#,
        );

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], InboundEvent::Unsupported { kind, .. } if kind == "image"));
        assert!(matches!(
            &events[1],
            InboundEvent::Status(update) if update.status == DeliveryStatus::Delivered
        ));
        assert!(matches!(
            &events[2],
            InboundEvent::Status(update)
                if update.error.as_deref() == Some("Re-engagement message (131047)")
        ));
    }

    #[test]
    fn empty_payload_has_no_events() {
        assert!(parse("{}").is_empty());
    }
}
