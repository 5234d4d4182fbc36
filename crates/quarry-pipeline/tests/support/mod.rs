//! Shared mocks for pipeline integration tests

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use quarry_core::{Result, SearchResult};
use quarry_llm::{
    CallOptions, ChatChunk, CompletionRequest, CompletionResponse, LlmClient, LlmResult,
    ResponseEvent, ResponsesRequest,
};
use quarry_pipeline::{
    AgentRunner, AgentStage, BuildMessagesStage, FilterResultsStage, Pipeline, PipelineConfig,
    ResponderStage, SearchStage, ValidateStage,
};
use quarry_safeguard::{Policy, SafeguardChecker, Verdict};
use quarry_search::SearchProvider;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Transport serving both the agent stream and the responder
pub struct MockLlm {
    /// Events replayed for the agent's responses stream
    pub agent_events: Vec<ResponseEvent>,
    /// Responder reply text
    pub responder_content: String,
    /// Every responder request received, for verbatim-passthrough asserts
    pub responder_requests: Mutex<Vec<CompletionRequest>>,
    /// How many times the agent stream was opened
    pub agent_calls: AtomicUsize,
}

impl MockLlm {
    pub fn new(agent_events: Vec<ResponseEvent>, responder_content: &str) -> Self {
        Self {
            agent_events,
            responder_content: responder_content.to_string(),
            responder_requests: Mutex::new(Vec::new()),
            agent_calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(responder_content: &str) -> Self {
        Self::new(vec![ResponseEvent::Completed], responder_content)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat_completion(
        &self,
        request: &CompletionRequest,
        _opts: &CallOptions,
    ) -> LlmResult<CompletionResponse> {
        self.responder_requests.lock().unwrap().push(request.clone());
        Ok(serde_json::from_value(json!({
            "id": "chatcmpl-upstream",
            "object": "chat.completion",
            "created": 1700000000,
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": self.responder_content},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        }))
        .expect("mock response must deserialize"))
    }

    async fn stream_chat_completion(
        &self,
        request: &CompletionRequest,
        _opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ChatChunk>>> {
        self.responder_requests.lock().unwrap().push(request.clone());

        let mut chunks = vec![ChatChunk::new(json!({
            "id": "chatcmpl-upstream",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}],
        }))];
        for piece in self.responder_content.split_inclusive(' ') {
            chunks.push(ChatChunk::new(json!({
                "id": "chatcmpl-upstream",
                "object": "chat.completion.chunk",
                "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}],
            })));
        }
        chunks.push(ChatChunk::new(json!({
            "id": "chatcmpl-upstream",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        })));

        let items: Vec<LlmResult<ChatChunk>> = chunks.into_iter().map(Ok).collect();
        Ok(futures::stream::iter(items).boxed())
    }

    async fn responses_stream(
        &self,
        _request: &ResponsesRequest,
        _opts: &CallOptions,
    ) -> LlmResult<BoxStream<'static, LlmResult<ResponseEvent>>> {
        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        let events: Vec<LlmResult<ResponseEvent>> =
            self.agent_events.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(events).boxed())
    }
}

/// Agent stream proposing the given search queries
pub fn agent_proposing(queries: &[&str]) -> Vec<ResponseEvent> {
    let mut events: Vec<ResponseEvent> = queries
        .iter()
        .enumerate()
        .map(|(i, query)| ResponseEvent::OutputItemDone {
            item: quarry_llm::OutputItem::FunctionCall {
                id: format!("fc_{i}"),
                name: "search".to_string(),
                arguments: format!("{{\"query\": \"{query}\"}}"),
            },
        })
        .collect();
    events.push(ResponseEvent::Completed);
    events
}

/// Provider scripted by query content
pub struct MockSearch {
    pub results: Vec<SearchResult>,
}

impl MockSearch {
    pub fn with_results(results: Vec<SearchResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        if query.contains("unreachable") {
            return Err(quarry_core::Error::search("backend unavailable"));
        }
        Ok(self.results.clone())
    }
}

/// Checker flagging PII on "SSN" and injection on the canonical override
pub struct MockChecker;

#[async_trait]
impl SafeguardChecker for MockChecker {
    async fn check(&self, policy: &Policy, content: &str) -> Result<Verdict> {
        let violation = match policy.name {
            "pii-leakage" => content.contains("SSN"),
            "prompt-injection" => content.contains("Ignore previous instructions"),
            _ => false,
        };
        Ok(Verdict {
            violation,
            rationale: if violation {
                format!("matched {} pattern (SSN or identifier)", policy.name)
            } else {
                "clean".to_string()
            },
        })
    }
}

/// The production stage order with mock collaborators
pub fn build_pipeline(
    llm: Arc<MockLlm>,
    search: Arc<dyn SearchProvider>,
    checker: Option<Arc<dyn SafeguardChecker>>,
) -> Pipeline {
    let runner = Arc::new(AgentRunner::new(
        llm.clone(),
        checker.clone(),
        "agent-model",
    ));
    Pipeline::new(PipelineConfig::default())
        .add_stage(Box::new(ValidateStage))
        .add_stage(Box::new(AgentStage::new(runner)))
        .add_stage(Box::new(SearchStage::new(search)))
        .add_stage(Box::new(FilterResultsStage::new(checker)))
        .add_stage(Box::new(BuildMessagesStage))
        .add_stage(Box::new(ResponderStage::new(llm)))
}
