//! quarry pipeline
//!
//! The staged request pipeline behind both wire surfaces:
//! validate -> agent -> search -> filter-results -> build-messages ->
//! responder, with parallel fan-out and safety filtering inside the agent,
//! search, and filter stages, and streaming events translated by the two
//! emitters.

pub mod agent;
pub mod emit;
pub mod messages;
pub mod pipeline;
pub mod stages;

pub use agent::{AgentRunner, AgentView};
pub use emit::{error_envelope, ChatCompletionsEmitter, FrameSender, ResponsesEmitter};
pub use messages::{build_responder_messages, render_search_block, CITATION_INSTRUCTION};
pub use pipeline::{Pipeline, PipelineConfig, Stage};
pub use stages::{
    AgentStage, BuildMessagesStage, FilterResultsStage, ResponderStage, SearchStage,
    ValidateStage,
};
