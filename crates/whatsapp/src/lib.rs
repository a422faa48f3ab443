//! WhatsApp Cloud API integration
//!
//! This crate is the WhatsApp side of balcao:
//! - **Verification** (`verify`) - subscription handshake and `X-Hub-Signature-256` checks
//! - **Payloads** (`payload`) - webhook JSON normalized into inbound events
//! - **Outbound** (`outbound`) - reply builder and the Cloud API sender
//!
//! # Flow
//!
//! ```text
//! Meta webhook → verify → WebhookPayload::into_events → pipeline
//!                                                         ↓
//!                       WhatsAppSender::send ← reply + quick replies
//! ```

pub mod outbound;
pub mod payload;
pub mod verify;

pub use outbound::{
    CloudApiSender, NoopSender, OutboundMessage, RetryPolicy, SendError, SendReceipt,
    WhatsAppSender,
};
pub use payload::{InboundEvent, InboundMessage, StatusUpdate, WebhookPayload};
pub use verify::{
    constant_time_eq, verify_signature, verify_subscription, SubscriptionQuery, SIGNATURE_HEADER,
};
