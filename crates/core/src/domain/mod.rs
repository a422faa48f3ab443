pub mod agent;
pub mod category;
pub mod context;
pub mod conversation;
pub mod knowledge;
pub mod lead;
pub mod log;
pub mod message;
