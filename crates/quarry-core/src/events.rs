//! Streaming event surface
//!
//! Stages report progress through an [`EventEmitter`]; implementations
//! translate the events into a concrete wire format (Chat Completions SSE or
//! Responses API SSE). Keeping the trait here leaves the pipeline
//! format-agnostic.

use crate::error::{Error, Result};
use crate::types::Annotation;
use async_trait::async_trait;

/// Status of a `web_search_call` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCallStatus {
    InProgress,
    Searching,
    Completed,
    Failed,
    Blocked,
}

impl SearchCallStatus {
    /// Wire-format string for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Searching => "searching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

/// A search lifecycle event
#[derive(Debug, Clone)]
pub struct SearchCallEvent {
    /// Search id, stable within the request
    pub id: String,
    pub status: SearchCallStatus,

    /// The query, present for `in_progress`/`searching`/`blocked`
    pub query: Option<String>,

    /// Block or failure reason
    pub reason: Option<String>,

    pub created: u64,
    pub model: String,
}

/// The one-shot metadata event emitted before any content chunk
#[derive(Debug, Clone)]
pub struct MetadataEvent {
    pub id: String,
    pub created: u64,
    pub model: String,
    pub annotations: Vec<Annotation>,

    /// Agent search reasoning for display
    pub reasoning: String,
}

/// Serialises internal pipeline events to a wire format.
///
/// One emitter lives for the duration of one streaming request and is only
/// ever driven from that request's task, so implementations may keep simple
/// interior state (sequence numbers, output indices).
///
/// The three Responses-API lifecycle methods default to no-ops; the Chat
/// Completions emitter leaves them that way.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Emit a search lifecycle event
    async fn emit_search_call(&self, event: &SearchCallEvent) -> Result<()>;

    /// Emit the metadata event (annotations + agent reasoning).
    /// Called at most once per request, strictly before any content chunk.
    async fn emit_metadata(&self, event: &MetadataEvent) -> Result<()>;

    /// Relay one upstream completion chunk verbatim
    async fn emit_chunk(&self, raw: &serde_json::Value) -> Result<()>;

    /// Write an error event into the open stream
    async fn emit_error(&self, error: &Error) -> Result<()>;

    /// Terminate the stream. Called exactly once per successful request.
    async fn emit_done(&self) -> Result<()>;

    /// Responses API: `response.created` / `response.in_progress`
    async fn emit_response_start(&self, _id: &str, _created: u64, _model: &str) -> Result<()> {
        Ok(())
    }

    /// Responses API: open the terminal message item
    async fn emit_message_start(&self, _item_id: &str) -> Result<()> {
        Ok(())
    }

    /// Responses API: close the terminal message item with the full text and
    /// its annotations
    async fn emit_message_end(&self, _text: &str, _annotations: &[Annotation]) -> Result<()> {
        Ok(())
    }
}
