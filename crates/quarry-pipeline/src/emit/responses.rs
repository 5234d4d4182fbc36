//! Responses API SSE emitter
//!
//! Emits typed events as `event: <type>\ndata: <json>\n\n` frames, each
//! carrying a strictly increasing `sequence_number`. Lifecycle:
//! `response.created` -> `response.in_progress` -> per search an
//! `output_item.added` / `web_search_call.*` / `output_item.done` group with
//! its own `output_index` -> the message item with its content part and
//! `output_text.delta`s -> `response.completed` carrying the accumulated
//! output array.

use crate::emit::{error_envelope, send_frame, FrameSender};
use async_trait::async_trait;
use quarry_core::{
    Annotation, Error, EventEmitter, MetadataEvent, Result, SearchCallEvent, SearchCallStatus,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct SearchItem {
    output_index: usize,
    query: String,
}

#[derive(Debug, Clone)]
struct MessageItem {
    item_id: String,
    output_index: usize,
}

#[derive(Debug, Default)]
struct EmitterState {
    sequence: u64,
    next_output_index: usize,
    response_id: String,
    created: u64,
    model: String,
    searches: HashMap<String, SearchItem>,
    message: Option<MessageItem>,
    reasoning: String,
    /// Completed output items, replayed in `response.completed`
    output: Vec<Value>,
}

impl EmitterState {
    fn response_snapshot(&self, status: &str, output: Value) -> Value {
        json!({
            "id": self.response_id,
            "object": "response",
            "created_at": self.created,
            "status": status,
            "model": self.model,
            "output": output,
        })
    }
}

pub struct ResponsesEmitter {
    tx: FrameSender,
    state: Mutex<EmitterState>,
}

impl ResponsesEmitter {
    pub fn new(tx: FrameSender) -> Self {
        Self {
            tx,
            state: Mutex::new(EmitterState::default()),
        }
    }

    async fn send_event(
        &self,
        state: &mut EmitterState,
        name: &str,
        mut data: Value,
    ) -> Result<()> {
        data["sequence_number"] = json!(state.sequence);
        state.sequence += 1;
        send_frame(&self.tx, format!("event: {name}\ndata: {data}\n\n")).await
    }

    /// Open the terminal message item if it is not open yet
    async fn ensure_message_open(
        &self,
        state: &mut EmitterState,
        item_id: Option<String>,
    ) -> Result<MessageItem> {
        if let Some(message) = &state.message {
            return Ok(message.clone());
        }

        let message = MessageItem {
            item_id: item_id
                .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4().simple())),
            output_index: state.next_output_index,
        };
        state.next_output_index += 1;
        state.message = Some(message.clone());

        self.send_event(
            state,
            "response.output_item.added",
            json!({
                "output_index": message.output_index,
                "item": {
                    "id": message.item_id,
                    "type": "message",
                    "status": "in_progress",
                    "role": "assistant",
                    "content": [],
                },
            }),
        )
        .await?;
        self.send_event(
            state,
            "response.content_part.added",
            json!({
                "item_id": message.item_id,
                "output_index": message.output_index,
                "content_index": 0,
                "part": {"type": "output_text", "text": "", "annotations": []},
            }),
        )
        .await?;
        Ok(message)
    }

    async fn finish_search_item(
        &self,
        state: &mut EmitterState,
        event: &SearchCallEvent,
        status: &str,
    ) -> Result<()> {
        let Some(search) = state.searches.get(&event.id).cloned() else {
            // completed/failed without a preceding in_progress; nothing to close
            return Ok(());
        };

        if status == "completed" {
            self.send_event(
                state,
                "response.web_search_call.completed",
                json!({
                    "item_id": event.id,
                    "output_index": search.output_index,
                }),
            )
            .await?;
        }

        let mut item = json!({
            "id": event.id,
            "type": "web_search_call",
            "status": status,
            "action": {"type": "search", "query": search.query},
        });
        if let Some(reason) = &event.reason {
            item["reason"] = json!(reason);
        }

        self.send_event(
            state,
            "response.output_item.done",
            json!({
                "output_index": search.output_index,
                "item": item.clone(),
            }),
        )
        .await?;
        state.output.push(item);
        Ok(())
    }
}

#[async_trait]
impl EventEmitter for ResponsesEmitter {
    async fn emit_response_start(&self, id: &str, created: u64, model: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.response_id = id.to_string();
        state.created = created;
        state.model = model.to_string();

        let snapshot = state.response_snapshot("in_progress", json!([]));
        self.send_event(
            &mut state,
            "response.created",
            json!({"response": snapshot}),
        )
        .await?;
        let snapshot = state.response_snapshot("in_progress", json!([]));
        self.send_event(
            &mut state,
            "response.in_progress",
            json!({"response": snapshot}),
        )
        .await
    }

    async fn emit_search_call(&self, event: &SearchCallEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        match event.status {
            SearchCallStatus::InProgress => {
                let search = SearchItem {
                    output_index: state.next_output_index,
                    query: event.query.clone().unwrap_or_default(),
                };
                state.next_output_index += 1;
                state.searches.insert(event.id.clone(), search.clone());

                self.send_event(
                    &mut state,
                    "response.output_item.added",
                    json!({
                        "output_index": search.output_index,
                        "item": {
                            "id": event.id,
                            "type": "web_search_call",
                            "status": "in_progress",
                        },
                    }),
                )
                .await?;
                self.send_event(
                    &mut state,
                    "response.web_search_call.in_progress",
                    json!({"item_id": event.id, "output_index": search.output_index}),
                )
                .await?;
                self.send_event(
                    &mut state,
                    "response.web_search_call.searching",
                    json!({"item_id": event.id, "output_index": search.output_index}),
                )
                .await
            }
            SearchCallStatus::Searching => {
                let Some(search) = state.searches.get(&event.id).cloned() else {
                    return Ok(());
                };
                self.send_event(
                    &mut state,
                    "response.web_search_call.searching",
                    json!({"item_id": event.id, "output_index": search.output_index}),
                )
                .await
            }
            SearchCallStatus::Completed => self.finish_search_item(&mut state, event, "completed").await,
            SearchCallStatus::Failed => self.finish_search_item(&mut state, event, "failed").await,
            SearchCallStatus::Blocked => {
                let output_index = state.next_output_index;
                state.next_output_index += 1;

                let mut item = json!({
                    "id": event.id,
                    "type": "web_search_call",
                    "status": "blocked",
                    "action": {
                        "type": "search",
                        "query": event.query.clone().unwrap_or_default(),
                    },
                });
                if let Some(reason) = &event.reason {
                    item["reason"] = json!(reason);
                }

                self.send_event(
                    &mut state,
                    "response.output_item.added",
                    json!({"output_index": output_index, "item": item.clone()}),
                )
                .await?;
                self.send_event(
                    &mut state,
                    "response.output_item.done",
                    json!({"output_index": output_index, "item": item.clone()}),
                )
                .await?;
                state.output.push(item);
                Ok(())
            }
        }
    }

    async fn emit_metadata(&self, event: &MetadataEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        state.reasoning = event.reasoning.clone();
        // Annotations arrive on the wire at message end; opening the message
        // item here keeps the metadata -> first delta ordering.
        self.ensure_message_open(&mut state, None).await?;
        Ok(())
    }

    async fn emit_chunk(&self, raw: &Value) -> Result<()> {
        let delta = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if delta.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        let message = self.ensure_message_open(&mut state, None).await?;
        self.send_event(
            &mut state,
            "response.output_text.delta",
            json!({
                "item_id": message.item_id,
                "output_index": message.output_index,
                "content_index": 0,
                "delta": delta,
            }),
        )
        .await
    }

    async fn emit_message_start(&self, item_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.ensure_message_open(&mut state, Some(item_id.to_string()))
            .await?;
        Ok(())
    }

    async fn emit_message_end(&self, text: &str, annotations: &[Annotation]) -> Result<()> {
        let mut state = self.state.lock().await;
        let message = self.ensure_message_open(&mut state, None).await?;

        for (index, annotation) in annotations.iter().enumerate() {
            self.send_event(
                &mut state,
                "response.output_text.annotation.added",
                json!({
                    "item_id": message.item_id,
                    "output_index": message.output_index,
                    "content_index": 0,
                    "annotation_index": index,
                    "annotation": annotation,
                }),
            )
            .await?;
        }

        self.send_event(
            &mut state,
            "response.output_text.done",
            json!({
                "item_id": message.item_id,
                "output_index": message.output_index,
                "content_index": 0,
                "text": text,
            }),
        )
        .await?;

        let part = json!({
            "type": "output_text",
            "text": text,
            "annotations": annotations,
            "search_reasoning": state.reasoning,
        });
        self.send_event(
            &mut state,
            "response.content_part.done",
            json!({
                "item_id": message.item_id,
                "output_index": message.output_index,
                "content_index": 0,
                "part": part.clone(),
            }),
        )
        .await?;

        let item = json!({
            "id": message.item_id,
            "type": "message",
            "status": "completed",
            "role": "assistant",
            "content": [part],
        });
        self.send_event(
            &mut state,
            "response.output_item.done",
            json!({
                "output_index": message.output_index,
                "item": item.clone(),
            }),
        )
        .await?;
        state.output.push(item);
        Ok(())
    }

    async fn emit_error(&self, error: &Error) -> Result<()> {
        let mut state = self.state.lock().await;
        let envelope = error_envelope(error);
        self.send_event(&mut state, "error", envelope).await
    }

    async fn emit_done(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let output = Value::Array(state.output.clone());
        let snapshot = state.response_snapshot("completed", output);
        self.send_event(
            &mut state,
            "response.completed",
            json!({"response": snapshot}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectedEvent {
        name: String,
        data: Value,
    }

    fn emitter() -> (ResponsesEmitter, tokio::sync::mpsc::Receiver<bytes::Bytes>) {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        (ResponsesEmitter::new(tx), rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<bytes::Bytes>) -> Vec<CollectedEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let text = std::str::from_utf8(&frame).unwrap();
            let mut name = String::new();
            let mut data = Value::Null;
            for line in text.lines() {
                if let Some(v) = line.strip_prefix("event: ") {
                    name = v.to_string();
                } else if let Some(v) = line.strip_prefix("data: ") {
                    data = serde_json::from_str(v).unwrap();
                }
            }
            events.push(CollectedEvent { name, data });
        }
        events
    }

    async fn run_full_lifecycle(emitter: &ResponsesEmitter) {
        emitter.emit_response_start("resp_1", 42, "m").await.unwrap();
        emitter
            .emit_search_call(&SearchCallEvent {
                id: "ws_blocked".to_string(),
                status: SearchCallStatus::Blocked,
                query: Some("secret".to_string()),
                reason: Some("identifier".to_string()),
                created: 42,
                model: "m".to_string(),
            })
            .await
            .unwrap();
        emitter
            .emit_search_call(&SearchCallEvent {
                id: "ws_1".to_string(),
                status: SearchCallStatus::InProgress,
                query: Some("launches".to_string()),
                reason: None,
                created: 42,
                model: "m".to_string(),
            })
            .await
            .unwrap();
        emitter
            .emit_search_call(&SearchCallEvent {
                id: "ws_1".to_string(),
                status: SearchCallStatus::Completed,
                query: None,
                reason: None,
                created: 42,
                model: "m".to_string(),
            })
            .await
            .unwrap();
        emitter
            .emit_metadata(&MetadataEvent {
                id: "resp_1".to_string(),
                created: 42,
                model: "m".to_string(),
                annotations: vec![Annotation::url_citation("https://a", "A")],
                reasoning: "looked it up".to_string(),
            })
            .await
            .unwrap();
        emitter
            .emit_chunk(&json!({"choices": [{"delta": {"content": "It "}}]}))
            .await
            .unwrap();
        emitter
            .emit_chunk(&json!({"choices": [{"delta": {"content": "launched."}}]}))
            .await
            .unwrap();
        emitter
            .emit_message_end(
                "It launched.",
                &[Annotation::url_citation("https://a", "A")],
            )
            .await
            .unwrap();
        emitter.emit_done().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_event_order() {
        let (emitter, mut rx) = emitter();
        run_full_lifecycle(&emitter).await;

        let events = drain(&mut rx);
        let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "response.created",
                "response.in_progress",
                "response.output_item.added", // blocked
                "response.output_item.done",
                "response.output_item.added", // executed search
                "response.web_search_call.in_progress",
                "response.web_search_call.searching",
                "response.web_search_call.completed",
                "response.output_item.done",
                "response.output_item.added", // message
                "response.content_part.added",
                "response.output_text.delta",
                "response.output_text.delta",
                "response.output_text.annotation.added",
                "response.output_text.done",
                "response.content_part.done",
                "response.output_item.done",
                "response.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_increase() {
        let (emitter, mut rx) = emitter();
        run_full_lifecycle(&emitter).await;

        let events = drain(&mut rx);
        let sequences: Vec<u64> = events
            .iter()
            .map(|e| e.data["sequence_number"].as_u64().unwrap())
            .collect();
        for pair in sequences.windows(2) {
            assert!(pair[1] > pair[0], "sequence went {} -> {}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_output_indices_distinct_per_item() {
        let (emitter, mut rx) = emitter();
        run_full_lifecycle(&emitter).await;

        let events = drain(&mut rx);
        let added_indices: Vec<u64> = events
            .iter()
            .filter(|e| e.name == "response.output_item.added")
            .map(|e| e.data["output_index"].as_u64().unwrap())
            .collect();
        assert_eq!(added_indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_completed_response_replays_output_items() {
        let (emitter, mut rx) = emitter();
        run_full_lifecycle(&emitter).await;

        let events = drain(&mut rx);
        let completed = events.last().unwrap();
        let output = completed.data["response"]["output"].as_array().unwrap();
        assert_eq!(output.len(), 3);
        assert_eq!(output[0]["status"], "blocked");
        assert_eq!(output[1]["status"], "completed");
        assert_eq!(output[1]["action"]["query"], "launches");
        assert_eq!(output[2]["type"], "message");
        assert_eq!(output[2]["content"][0]["text"], "It launched.");
        assert_eq!(output[2]["content"][0]["search_reasoning"], "looked it up");
    }

    #[tokio::test]
    async fn test_role_only_chunks_produce_no_delta() {
        let (emitter, mut rx) = emitter();
        emitter.emit_response_start("resp_1", 42, "m").await.unwrap();
        emitter
            .emit_chunk(&json!({"choices": [{"delta": {"role": "assistant"}}]}))
            .await
            .unwrap();

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .all(|e| e.name != "response.output_text.delta"));
    }
}
