//! Pipeline stages, one responsibility each

pub mod agent;
pub mod build_messages;
pub mod filter_results;
pub mod responder;
pub mod search;
pub mod validate;

pub use agent::AgentStage;
pub use build_messages::BuildMessagesStage;
pub use filter_results::FilterResultsStage;
pub use responder::ResponderStage;
pub use search::SearchStage;
pub use validate::ValidateStage;
