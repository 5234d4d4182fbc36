//! Core types for quarry

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which wire surface a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiFormat {
    /// OpenAI Chat Completions (`/v1/chat/completions`)
    ChatCompletions,
    /// OpenAI Responses API (`/v1/responses`)
    Responses,
}

/// Message sender role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire-format string for this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A chat message in the conversation.
///
/// Content is kept as the raw JSON payload the client sent: a plain string or
/// a structured multimodal part array. The responder receives it verbatim;
/// only agent and safety operations look at the extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,

    /// Content payload, preserved opaquely
    pub content: Value,

    /// Citations attached by earlier assistant turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Annotation>>,
}

impl ChatMessage {
    /// Create a new chat message with plain-text content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Value::String(content.into()),
            annotations: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a message with a raw content payload
    pub fn with_content(role: Role, content: Value) -> Self {
        Self {
            role,
            content,
            annotations: None,
        }
    }

    /// Attach annotations to this message
    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Extract the plain text of this message.
    ///
    /// A string payload is used as-is; a part array contributes the `text`
    /// field of every `text`-typed part, concatenated in order; anything else
    /// yields the empty string.
    pub fn text(&self) -> String {
        extract_text(&self.content)
    }
}

/// Extract plain text from an opaque content payload
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let mut out = String::new();
            for part in parts {
                let is_text = part
                    .get("type")
                    .and_then(Value::as_str)
                    .map(|t| t == "text")
                    .unwrap_or(false);
                if is_text {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        out.push_str(text);
                    }
                }
            }
            out
        }
        _ => String::new(),
    }
}

/// A URL citation attached to responder output.
///
/// Start/end indices refer to character positions in the responder's output
/// text and are zero when not computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Always `url_citation`
    #[serde(rename = "type")]
    pub kind: String,

    pub url: String,
    pub title: String,

    #[serde(default)]
    pub start_index: usize,

    #[serde(default)]
    pub end_index: usize,
}

impl Annotation {
    /// Create a `url_citation` annotation with uncomputed indices
    pub fn url_citation(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: "url_citation".to_string(),
            url: url.into(),
            title: title.into(),
            start_index: 0,
            end_index: 0,
        }
    }
}

/// A search query the agent proposed and the PII filter allowed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSearch {
    /// Stable within a request; appears in streaming events
    pub id: String,
    pub query: String,
}

/// A search query the PII filter rejected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedQuery {
    pub id: String,
    pub query: String,
    /// The safeguard checker's rationale
    pub reason: String,
}

/// A search that actually ran against the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedSearch {
    pub id: String,
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// A search whose provider call failed; recorded for the response output,
/// never fatal to the request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSearch {
    pub id: String,
    pub query: String,
    pub reason: String,
}

/// A single ranked result from the search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// May be long
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl SearchResult {
    /// Create a result with only the required fields
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            published_date: None,
            favicon: None,
        }
    }
}

/// Output of the agent stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    pub pending_searches: Vec<PendingSearch>,
    pub blocked_queries: Vec<BlockedQuery>,

    /// Human-readable explanation of the agent's search decision
    pub search_reasoning: String,
}

/// Per-request feature switches.
///
/// Everything defaults off; the wire layer flips a flag only when the client
/// opted in, so the proxy stays transparent for clients not using search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub web_search: bool,
    pub pii_check: bool,
    pub injection_check: bool,
}

/// A parsed proxy request, immutable after construction
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Responder model identifier
    pub model: String,

    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,

    /// Alternate single-string input form (Responses API)
    pub input: Option<String>,

    pub stream: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub format: ApiFormat,
    pub features: FeatureFlags,
}

impl ProxyRequest {
    /// Create a minimal Chat Completions request
    pub fn chat(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            input: None,
            stream: false,
            temperature: None,
            max_tokens: None,
            format: ApiFormat::ChatCompletions,
            features: FeatureFlags::default(),
        }
    }

    /// Create a minimal Responses API request
    pub fn responses(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            input: Some(input.into()),
            stream: false,
            temperature: None,
            max_tokens: None,
            format: ApiFormat::Responses,
            features: FeatureFlags::default(),
        }
    }
}

/// Non-streaming responder output, stored on the context for the HTTP
/// handler to render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderOutput {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    /// First choice content
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}
