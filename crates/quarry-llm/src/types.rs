//! Wire types for upstream LLM calls

use quarry_core::types::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message as sent upstream. Content is the raw payload, forwarded
/// verbatim so multimodal parts survive the trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Value,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

impl WireMessage {
    /// Create a plain-text wire message
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
        }
    }
}

/// Request body for `/chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    /// JSON-schema output constraint, used by the safeguard checker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

impl CompletionRequest {
    /// Create a non-streaming completion request
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
            response_format: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Constrain the reply to a JSON schema
    pub fn with_json_schema(mut self, name: &str, schema: Value) -> Self {
        self.response_format = Some(serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": true,
            }
        }));
        self
    }
}

/// Request body for the `/responses` agent call
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,

    /// A string or an array of `{role, content}` items
    pub input: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Non-streaming `/chat/completions` response
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_object")]
    pub object: String,

    #[serde(default)]
    pub created: u64,

    #[serde(default)]
    pub model: String,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Value>,
}

fn default_object() -> String {
    "chat.completion".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: Option<String>,
}

impl CompletionResponse {
    /// First-choice content, or empty when the upstream sent none
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }
}

/// A streaming chat-completion chunk.
///
/// The raw JSON value is retained so the pipeline can relay chunks verbatim;
/// the accessors give parsed views for the few fields quarry reads.
#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub raw: Value,
}

impl ChatChunk {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Whether the chunk carries at least one choice
    pub fn has_choice(&self) -> bool {
        self.raw
            .get("choices")
            .and_then(Value::as_array)
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    /// Content delta of the first choice, if any
    pub fn content(&self) -> Option<&str> {
        self.raw
            .get("choices")?
            .get(0)?
            .get("delta")?
            .get("content")?
            .as_str()
    }

    /// Finish reason of the first choice, if present
    pub fn finish_reason(&self) -> Option<&str> {
        self.raw
            .get("choices")?
            .get(0)?
            .get("finish_reason")?
            .as_str()
    }
}

/// An output item in the agent's Responses stream
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    FunctionCall {
        id: String,
        name: String,
        arguments: String,
    },
    Message {
        id: String,
    },
    Reasoning {
        id: String,
    },
    Other,
}

impl OutputItem {
    /// Parse an item object from an `output_item` event payload
    pub fn from_value(item: &Value) -> Self {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match item.get("type").and_then(Value::as_str) {
            Some("function_call") => Self::FunctionCall {
                id,
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: item
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("message") => Self::Message { id },
            Some("reasoning") => Self::Reasoning { id },
            _ => Self::Other,
        }
    }
}

/// Typed events from the agent's streaming Responses call
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    OutputItemAdded { item: OutputItem },
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    OutputItemDone { item: OutputItem },
    ReasoningDelta { delta: String },
    OutputTextDelta { delta: String },
    Completed,
}
