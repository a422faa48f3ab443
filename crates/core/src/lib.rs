pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod scoring;
pub mod text;

pub use classifier::{ClassificationResult, KeywordClassifier, KeywordTable};
pub use domain::agent::{AgentConfig, AgentKey};
pub use domain::category::ProductCategory;
pub use domain::context::{BudgetRange, ProjectContext, ProjectType, Urgency};
pub use domain::conversation::{Conversation, ConversationId, ConversationStatus};
pub use domain::lead::{LeadScore, LeadTemperature};
pub use domain::message::{DeliveryStatus, Message, MessageDirection, MessageId, MessageSender};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use scoring::LeadScorer;
