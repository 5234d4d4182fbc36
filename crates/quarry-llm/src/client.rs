//! LLM client trait and the OpenAI-compatible HTTP implementation

use crate::sse::{sse_events, SseEvent};
use crate::types::{
    ChatChunk, CompletionRequest, CompletionResponse, OutputItem, ResponseEvent, ResponsesRequest,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use quarry_core::UpstreamError;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Result type for transport calls. Stages convert into the pipeline error
/// kind for the call that failed (agent, responder, safeguard).
pub type LlmResult<T> = Result<T, UpstreamError>;

/// Per-call options threaded from the request context
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Full `Authorization` header value forwarded from the client, e.g.
    /// `Bearer sk-...`. Falls back to the configured service key when absent.
    pub bearer_token: Option<String>,
}

impl CallOptions {
    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
        }
    }
}

/// Transport to an OpenAI-compatible upstream.
///
/// Three RPCs: one-shot chat completion, streaming chat completion, and the
/// typed Responses event stream the agent consumes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue a non-streaming chat completion
    async fn chat_completion(
        &self,
        request: &CompletionRequest,
        opts: &CallOptions,
    ) -> LlmResult<CompletionResponse>;

    /// Issue a streaming chat completion; the stream ends at `[DONE]`
    async fn stream_chat_completion(
        &self,
        request: &CompletionRequest,
        opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ChatChunk>>>;

    /// Issue a streaming Responses call, yielding typed tool/reasoning/content
    /// events
    async fn responses_stream(
        &self,
        request: &ResponsesRequest,
        opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ResponseEvent>>>;

    /// Issue a completion constrained to a JSON schema and return the raw
    /// reply content for the caller to parse
    async fn json_completion(
        &self,
        request: CompletionRequest,
        schema_name: &str,
        schema: Value,
        opts: &CallOptions,
    ) -> LlmResult<String> {
        let constrained = request.with_json_schema(schema_name, schema);
        let response = self.chat_completion(&constrained, opts).await?;
        Ok(response.content().to_string())
    }
}

/// reqwest-backed client against an OpenAI-compatible base URL
pub struct HttpLlmClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpLlmClient {
    /// Create a client for `base_url` (e.g. `https://api.example.com/v1`)
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| UpstreamError::message(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    /// Create a client reusing an existing connection pool
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        }
    }

    fn auth_header(&self, opts: &CallOptions) -> Option<String> {
        opts.bearer_token
            .clone()
            .or_else(|| self.api_key.as_ref().map(|key| format!("Bearer {key}")))
    }

    async fn post(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        opts: &CallOptions,
    ) -> LlmResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "issuing upstream request");

        let mut builder = self.http.post(&url).json(body);
        if let Some(auth) = self.auth_header(opts) {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::message(format!("upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_response(status.as_u16(), &body_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_completion(
        &self,
        request: &CompletionRequest,
        opts: &CallOptions,
    ) -> LlmResult<CompletionResponse> {
        let response = self.post("/chat/completions", request, opts).await?;
        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| UpstreamError::message(format!("failed to parse completion: {e}")))
    }

    async fn stream_chat_completion(
        &self,
        request: &CompletionRequest,
        opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ChatChunk>>> {
        let mut streaming = request.clone();
        streaming.stream = true;

        let response = self.post("/chat/completions", &streaming, opts).await?;
        let chunks = sse_events(response)
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.is_done());
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(e) if e.data.is_empty() => None,
                    Ok(e) => match serde_json::from_str::<Value>(&e.data) {
                        Ok(raw) => Some(Ok(ChatChunk::new(raw))),
                        Err(err) => Some(Err(UpstreamError::message(format!(
                            "failed to parse chunk: {err}"
                        )))),
                    },
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed();
        Ok(chunks)
    }

    async fn responses_stream(
        &self,
        request: &ResponsesRequest,
        opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ResponseEvent>>> {
        let mut streaming = request.clone();
        streaming.stream = true;

        let response = self.post("/responses", &streaming, opts).await?;
        let events = sse_events(response)
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.is_done());
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(e) => parse_response_event(&e),
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed();
        Ok(events)
    }
}

/// Map a named SSE event onto the typed agent-stream vocabulary.
/// Unknown event types are skipped.
fn parse_response_event(event: &SseEvent) -> Option<LlmResult<ResponseEvent>> {
    let name = event.event.as_deref()?;
    if event.data.is_empty() {
        return None;
    }

    let data: Value = match serde_json::from_str(&event.data) {
        Ok(v) => v,
        Err(e) => {
            return Some(Err(UpstreamError::message(format!(
                "failed to parse {name} event: {e}"
            ))))
        }
    };

    let str_field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match name {
        "response.output_item.added" => Some(Ok(ResponseEvent::OutputItemAdded {
            item: OutputItem::from_value(data.get("item").unwrap_or(&Value::Null)),
        })),
        "response.output_item.done" => Some(Ok(ResponseEvent::OutputItemDone {
            item: OutputItem::from_value(data.get("item").unwrap_or(&Value::Null)),
        })),
        "response.function_call_arguments.delta" => {
            Some(Ok(ResponseEvent::FunctionCallArgumentsDelta {
                item_id: str_field("item_id"),
                delta: str_field("delta"),
            }))
        }
        "response.output_text.delta" => Some(Ok(ResponseEvent::OutputTextDelta {
            delta: str_field("delta"),
        })),
        "response.reasoning_text.delta" | "response.reasoning_summary_text.delta" => {
            Some(Ok(ResponseEvent::ReasoningDelta {
                delta: str_field("delta"),
            }))
        }
        "response.completed" => Some(Ok(ResponseEvent::Completed)),
        _ => None,
    }
}
