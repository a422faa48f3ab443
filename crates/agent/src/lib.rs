//! Bot brain for the WhatsApp pipeline
//!
//! Everything here is pure with respect to storage: callers hand in the
//! conversation state and persist what comes back.
//!
//! - `intent` - keyword or LLM classification into a product category
//! - `extraction` - regex battery that fills the project context
//! - `responses` - canned Portuguese decision tree and quick replies
//! - `prompts` - Tera system prompt and chat history for LLM agents
//! - `dispatcher` - specialist → general → last resort → template → apology
//! - `guardrails` - when a human has to take over
//! - `runtime` - the pieces above wired from `AppConfig`
//!
//! # Safety Principle
//!
//! The LLM only writes reply text. Category routing fallbacks, scoring and
//! handoff decisions stay deterministic.

pub mod dispatcher;
pub mod extraction;
pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod prompts;
pub mod responses;
pub mod runtime;

pub use dispatcher::{AgentDispatcher, AgentReply, DispatchFailure, DispatchOutcome, DispatchRequest, ReplySource};
pub use extraction::ContextExtractor;
pub use guardrails::{HandoffDecision, HandoffInput, HandoffPolicy, HandoffReason};
pub use llm::{HttpLlmClient, LlmClient, LlmError};
pub use runtime::{AgentRuntime, AnalysisInput, RuntimeError, TurnAnalysis};
