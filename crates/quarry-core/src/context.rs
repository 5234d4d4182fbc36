//! Request-scoped pipeline context

use crate::events::EventEmitter;
use crate::state::StateTracker;
use crate::types::{
    AgentResult, ApiFormat, ChatMessage, ExecutedSearch, FailedSearch, ProxyRequest,
    ResponderOutput,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Per-request values forwarded to downstream LLM calls
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// The client's `Authorization: Bearer` credential, forwarded verbatim
    /// to responder calls and never stored beyond the request
    pub bearer_token: Option<String>,

    /// Whether the agent applies the PII pre-filter to proposed queries
    pub pii_check_enabled: bool,
}

/// Mutable record tied to one request's trip through the pipeline.
///
/// The pipeline exclusively owns the context for the request's lifetime;
/// stages mutate it sequentially. Parallel work inside a single stage
/// coordinates through local synchronisation and funnels its aggregate
/// result back in before the stage returns.
pub struct RequestContext {
    /// Completion id, stable across all events of this request
    pub id: String,

    /// Unix-epoch creation timestamp (seconds)
    pub created: u64,

    pub request: ProxyRequest,
    pub options: RequestOptions,

    /// Most recent user query, set by the validate stage
    pub user_query: Option<String>,

    /// Agent stage output
    pub agent_result: Option<AgentResult>,

    /// Executed searches, appended by the search stage and pruned by the
    /// filter-results stage
    pub search_results: Vec<ExecutedSearch>,

    /// Searches whose provider call failed
    pub failed_searches: Vec<FailedSearch>,

    /// Messages assembled for the responder
    pub responder_messages: Vec<ChatMessage>,

    /// Populated iff the request is non-streaming
    pub responder_result: Option<ResponderOutput>,

    pub state: StateTracker,

    /// Non-nil iff the request is streaming
    pub emitter: Option<Arc<dyn EventEmitter>>,

    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context for a non-streaming request
    pub fn new(request: ProxyRequest, options: RequestOptions) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let id = match request.format {
            ApiFormat::ChatCompletions => format!("chatcmpl-{}", simple_id()),
            ApiFormat::Responses => format!("resp_{}", simple_id()),
        };

        Self {
            id,
            created,
            request,
            options,
            user_query: None,
            agent_result: None,
            search_results: Vec::new(),
            failed_searches: Vec::new(),
            responder_messages: Vec::new(),
            responder_result: None,
            state: StateTracker::new(),
            emitter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a streaming event emitter
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Replace the cancellation token; the pipeline installs a
    /// deadline-bounded child of the caller's token here
    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// A clone of this request's cancellation token
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all in-flight work for this request. The caller must invoke
    /// this when it is done with the returned context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the request has been cancelled or timed out
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether streaming output was requested
    pub fn is_streaming(&self) -> bool {
        self.emitter.is_some()
    }

    /// Citation annotations derived from the executed search results
    pub fn annotations(&self) -> Vec<crate::types::Annotation> {
        self.search_results
            .iter()
            .flat_map(|search| search.results.iter())
            .map(|result| crate::types::Annotation::url_citation(&result.url, &result.title))
            .collect()
    }
}

/// Hex id from the current epoch nanos; unique enough for completion ids
fn simple_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{nanos:x}")
}
