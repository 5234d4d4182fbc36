//! Event emitters
//!
//! Two implementations of the [`quarry_core::EventEmitter`] seam: Chat
//! Completions SSE frames and Responses API typed events. Both write
//! ready-to-send frames into an mpsc channel the HTTP layer drains into the
//! response body.

pub mod chat;
pub mod responses;

pub use chat::ChatCompletionsEmitter;
pub use responses::ResponsesEmitter;

use bytes::Bytes;
use quarry_core::{Error, Result};
use serde_json::{json, Value};

/// Sink for serialized SSE frames
pub type FrameSender = tokio::sync::mpsc::Sender<Bytes>;

pub(crate) async fn send_frame(tx: &FrameSender, frame: String) -> Result<()> {
    tx.send(Bytes::from(frame))
        .await
        .map_err(|_| Error::api("client disconnected"))
}

/// `data: <json>\n\n`
pub(crate) fn data_frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// Public error body for a failed request. Validation errors surface their
/// message; responder errors pass the structured upstream body through;
/// everything else collapses to a generic envelope with internals
/// suppressed.
pub fn error_envelope(error: &Error) -> Value {
    match error.unwrap_stage() {
        Error::Validation { field, message } => json!({
            "error": {"type": "validation_error", "field": field, "message": message}
        }),
        Error::Responder(upstream) => match &upstream.body {
            Some(body) => body.clone(),
            None => json!({
                "error": {"type": "responder_error", "message": "responder request failed"}
            }),
        },
        inner => json!({
            "error": {"type": inner.kind_str(), "message": generic_message(inner)}
        }),
    }
}

fn generic_message(error: &Error) -> &'static str {
    match error {
        Error::Agent(_) => "agent request failed",
        Error::Timeout => "request timed out",
        _ => "internal error",
    }
}
