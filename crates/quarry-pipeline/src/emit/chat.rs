//! Chat Completions SSE emitter
//!
//! Every event is a `data: <json>\n\n` frame. The `web_search_call` event is
//! dressed as a `chat.completion.chunk` envelope with an empty `choices`
//! array so OpenAI-compatible client SDKs tolerate it. The stream terminates
//! with `data: [DONE]\n\n`.

use crate::emit::{data_frame, error_envelope, send_frame, FrameSender};
use async_trait::async_trait;
use quarry_core::{Error, EventEmitter, MetadataEvent, Result, SearchCallEvent};
use serde_json::{json, Value};

pub struct ChatCompletionsEmitter {
    tx: FrameSender,
}

impl ChatCompletionsEmitter {
    pub fn new(tx: FrameSender) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventEmitter for ChatCompletionsEmitter {
    async fn emit_search_call(&self, event: &SearchCallEvent) -> Result<()> {
        let mut call = json!({"status": event.status.as_str()});
        if let Some(query) = &event.query {
            call["query"] = json!(query);
        }
        if let Some(reason) = &event.reason {
            call["reason"] = json!(reason);
        }

        let frame = json!({
            "id": event.id,
            "object": "chat.completion.chunk",
            "created": event.created,
            "model": event.model,
            "choices": [],
            "web_search_call": call,
        });
        send_frame(&self.tx, data_frame(&frame)).await
    }

    async fn emit_metadata(&self, event: &MetadataEvent) -> Result<()> {
        let frame = json!({
            "id": event.id,
            "object": "chat.completion.chunk",
            "created": event.created,
            "model": event.model,
            "choices": [{
                "index": 0,
                "delta": {
                    "annotations": event.annotations,
                    "search_reasoning": event.reasoning,
                },
                "finish_reason": null,
            }],
        });
        send_frame(&self.tx, data_frame(&frame)).await
    }

    async fn emit_chunk(&self, raw: &Value) -> Result<()> {
        send_frame(&self.tx, data_frame(raw)).await
    }

    async fn emit_error(&self, error: &Error) -> Result<()> {
        send_frame(&self.tx, data_frame(&error_envelope(error))).await
    }

    async fn emit_done(&self) -> Result<()> {
        send_frame(&self.tx, "data: [DONE]\n\n".to_string()).await
    }
}
