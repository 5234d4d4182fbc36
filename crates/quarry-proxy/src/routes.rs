//! HTTP routes and handlers
//!
//! Both wire surfaces run the same pipeline; everything format-specific
//! lives here (request parsing, non-streaming response shaping) and in the
//! emitters (streaming).

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use quarry_core::{
    Annotation, ApiFormat, ChatMessage, Error, EventEmitter, FeatureFlags, ProxyRequest,
    RequestContext, RequestOptions, Role,
};
use quarry_pipeline::{error_envelope, ChatCompletionsEmitter, ResponsesEmitter};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.pipeline.max_body_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/responses", post(responses))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "quarry",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "search-augmented chat completion proxy",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics_endpoint(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// A handler panic becomes a generic 500, never a dropped connection
fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    error!("handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": {"type": "api_error", "message": "internal error"}})),
    )
        .into_response()
}

// =============================================================================
// Wire schemas
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    model: String,

    #[serde(default)]
    messages: Vec<IncomingMessage>,

    #[serde(default)]
    stream: bool,

    #[serde(default)]
    temperature: Option<f32>,

    #[serde(default)]
    max_tokens: Option<u32>,

    /// Presence enables web search
    #[serde(default)]
    web_search_options: Option<Value>,

    /// Presence enables the PII query filter
    #[serde(default)]
    pii_check_options: Option<Value>,

    /// Presence enables the injection result filter
    #[serde(default)]
    injection_check_options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,

    #[serde(default)]
    content: Value,

    #[serde(default)]
    annotations: Option<Vec<Annotation>>,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    model: String,

    #[serde(default)]
    input: Option<String>,

    #[serde(default)]
    stream: bool,

    #[serde(default)]
    temperature: Option<f32>,

    #[serde(default)]
    max_output_tokens: Option<u32>,

    /// A `web_search` entry enables search
    #[serde(default)]
    tools: Vec<Value>,

    #[serde(default)]
    pii_check_options: Option<Value>,

    #[serde(default)]
    injection_check_options: Option<Value>,
}

fn parse_messages(incoming: Vec<IncomingMessage>) -> Result<Vec<ChatMessage>, AppError> {
    incoming
        .into_iter()
        .map(|msg| {
            let role = match msg.role.as_str() {
                "system" => Role::System,
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => {
                    return Err(AppError(Error::validation(
                        "messages",
                        format!("unsupported role '{other}'"),
                    )))
                }
            };
            let mut message = ChatMessage::with_content(role, msg.content);
            if let Some(annotations) = msg.annotations {
                message = message.with_annotations(annotations);
            }
            Ok(message)
        })
        .collect()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// =============================================================================
// Handlers
// =============================================================================

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatCompletionBody>,
) -> Result<Response, AppError> {
    info!(model = %body.model, stream = body.stream, "chat completion request");
    metrics::counter!("quarry_requests_total", "route" => "chat_completions").increment(1);

    let features = FeatureFlags {
        web_search: body.web_search_options.is_some(),
        pii_check: body.pii_check_options.is_some(),
        injection_check: body.injection_check_options.is_some(),
    };
    let request = ProxyRequest {
        model: body.model,
        messages: parse_messages(body.messages)?,
        input: None,
        stream: body.stream,
        temperature: body.temperature,
        max_tokens: body.max_tokens,
        format: ApiFormat::ChatCompletions,
        features,
    };
    let options = RequestOptions {
        bearer_token: bearer_token(&headers),
        pii_check_enabled: features.pii_check,
    };

    if request.stream {
        return Ok(stream_response(state, request, options));
    }

    let parent = CancellationToken::new();
    let (ctx, result) = state.pipeline.execute(request, options, None, &parent).await;
    ctx.cancel();
    result.map_err(AppError)?;

    let body = shape_chat_response(&ctx)?;
    Ok(Json(body).into_response())
}

async fn responses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ResponsesBody>,
) -> Result<Response, AppError> {
    info!(model = %body.model, stream = body.stream, "responses request");
    metrics::counter!("quarry_requests_total", "route" => "responses").increment(1);

    let web_search = body.tools.iter().any(|tool| {
        tool.get("type").and_then(Value::as_str) == Some("web_search")
    });
    let features = FeatureFlags {
        web_search,
        pii_check: body.pii_check_options.is_some(),
        injection_check: body.injection_check_options.is_some(),
    };
    let request = ProxyRequest {
        model: body.model,
        messages: Vec::new(),
        input: body.input,
        stream: body.stream,
        temperature: body.temperature,
        max_tokens: body.max_output_tokens,
        format: ApiFormat::Responses,
        features,
    };
    let options = RequestOptions {
        bearer_token: bearer_token(&headers),
        pii_check_enabled: features.pii_check,
    };

    if request.stream {
        return Ok(stream_response(state, request, options));
    }

    let parent = CancellationToken::new();
    let (ctx, result) = state.pipeline.execute(request, options, None, &parent).await;
    ctx.cancel();
    result.map_err(AppError)?;

    let body = shape_responses_response(&ctx)?;
    Ok(Json(body).into_response())
}

/// Spawn the pipeline behind an SSE channel and hand the channel to the
/// client as the response body.
fn stream_response(state: AppState, request: ProxyRequest, options: RequestOptions) -> Response {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(64);
    let emitter: Arc<dyn EventEmitter> = match request.format {
        ApiFormat::ChatCompletions => Arc::new(ChatCompletionsEmitter::new(tx)),
        ApiFormat::Responses => Arc::new(ResponsesEmitter::new(tx)),
    };

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let parent = CancellationToken::new();
        let (ctx, result) = pipeline
            .execute(request, options, Some(emitter.clone()), &parent)
            .await;
        if let Err(err) = result {
            error!(error = %err, "streaming request failed");
            // best effort: the client may already be gone
            let _ = emitter.emit_error(&err).await;
        }
        ctx.cancel();
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

// =============================================================================
// Non-streaming response shaping
// =============================================================================

fn shape_chat_response(ctx: &RequestContext) -> Result<Value, AppError> {
    let Some(output) = &ctx.responder_result else {
        return Err(AppError(Error::api("responder produced no output")));
    };

    let (reasoning, blocked) = agent_fields(ctx);
    Ok(json!({
        "id": output.id,
        "object": "chat.completion",
        "created": output.created,
        "model": output.model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": output.content,
                "annotations": ctx.annotations(),
                "search_reasoning": reasoning,
                "blocked_searches": blocked,
            },
            "finish_reason": "stop",
        }],
        "usage": output.usage,
    }))
}

fn shape_responses_response(ctx: &RequestContext) -> Result<Value, AppError> {
    let Some(output) = &ctx.responder_result else {
        return Err(AppError(Error::api("responder produced no output")));
    };

    let (reasoning, blocked) = agent_fields(ctx);

    let mut entries: Vec<Value> = Vec::new();
    for query in blocked {
        entries.push(json!({
            "id": query.id,
            "type": "web_search_call",
            "status": "blocked",
            "action": {"type": "search", "query": query.query},
            "reason": query.reason,
        }));
    }
    for failed in &ctx.failed_searches {
        entries.push(json!({
            "id": failed.id,
            "type": "web_search_call",
            "status": "failed",
            "action": {"type": "search", "query": failed.query},
            "reason": failed.reason,
        }));
    }
    for search in &ctx.search_results {
        entries.push(json!({
            "id": search.id,
            "type": "web_search_call",
            "status": "completed",
            "action": {"type": "search", "query": search.query},
        }));
    }
    entries.push(json!({
        "id": format!("msg_{}", uuid::Uuid::new_v4().simple()),
        "type": "message",
        "status": "completed",
        "role": "assistant",
        "content": [{
            "type": "output_text",
            "text": output.content,
            "annotations": ctx.annotations(),
            "search_reasoning": reasoning,
        }],
    }));

    Ok(json!({
        "id": ctx.id,
        "object": "response",
        "created_at": ctx.created,
        "status": "completed",
        "model": output.model,
        "output": entries,
        "usage": output.usage,
    }))
}

fn agent_fields(ctx: &RequestContext) -> (String, Vec<quarry_core::BlockedQuery>) {
    match &ctx.agent_result {
        Some(result) => (
            result.search_reasoning.clone(),
            result.blocked_queries.clone(),
        ),
        None => (String::new(), Vec::new()),
    }
}

// =============================================================================
// Error mapping
// =============================================================================

/// Wrapper turning pipeline errors into HTTP responses
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(error_envelope(&self.0))).into_response()
    }
}
