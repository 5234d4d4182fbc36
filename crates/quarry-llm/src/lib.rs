//! quarry LLM transport
//!
//! OpenAI-compatible transport used for every upstream model call: the
//! agent's typed Responses stream, the safeguard classifier's constrained
//! completions, and the responder's streaming/non-streaming completions.

pub mod client;
pub mod sse;
pub mod types;

pub use client::{CallOptions, HttpLlmClient, LlmClient, LlmResult};
pub use sse::{sse_events, SseEvent, SseParser};
pub use types::{
    ChatChunk, Choice, ChoiceMessage, CompletionRequest, CompletionResponse, OutputItem,
    ResponseEvent, ResponsesRequest, WireMessage,
};
