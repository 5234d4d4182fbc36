//! Agent runner
//!
//! Drives a single-shot tool-using call against the agent model, extracts
//! `search(query)` invocations, and applies the PII pre-filter to the
//! extracted queries.

use quarry_core::{AgentResult, BlockedQuery, Error, PendingSearch, Result};
use quarry_llm::{CallOptions, LlmClient, OutputItem, ResponseEvent, ResponsesRequest};
use quarry_safeguard::{SafeguardChecker, PII_LEAKAGE};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Name of the one tool the agent model is offered
const SEARCH_TOOL: &str = "search";

/// Standing instructions for the agent model
const AGENT_INSTRUCTIONS: &str = "\
You decide whether answering the user requires current information from the \
web. If it does, call the `search` tool with one or more focused queries. \
If the conversation can be answered from general knowledge, answer directly \
without calling any tool. Never put private or personally-identifying \
details into a search query.";

/// The agent's view of the conversation: system text collapsed into one
/// prompt, everything else as plain `{role, text}` pairs.
#[derive(Debug, Clone, Default)]
pub struct AgentView {
    pub system_prompt: String,
    pub messages: Vec<(String, String)>,
}

/// Accumulates one function-call item across its streamed events
#[derive(Debug)]
struct FunctionCallState {
    item_id: String,
    name: String,
    arguments: String,
}

/// Runs the agent tool-call loop
pub struct AgentRunner {
    client: Arc<dyn LlmClient>,
    checker: Option<Arc<dyn SafeguardChecker>>,
    model: String,
}

impl AgentRunner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        checker: Option<Arc<dyn SafeguardChecker>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            checker,
            model: model.into(),
        }
    }

    /// Drive one agent call and return the classified queries plus any
    /// reasoning the model emitted.
    pub async fn run(
        &self,
        view: AgentView,
        pii_check: bool,
        cancel: &CancellationToken,
    ) -> Result<AgentResult> {
        let request = self.build_request(&view);

        // Agent calls authenticate with the service key, not the client's
        // forwarded credential.
        let mut stream = self
            .client
            .responses_stream(&request, &CallOptions::default())
            .await
            .map_err(|e| Error::agent(format!("agent call failed: {e}")))?;

        let mut calls: Vec<FunctionCallState> = Vec::new();
        let mut reasoning = String::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Timeout),
                event = futures::StreamExt::next(&mut stream) => event,
            };

            let event = match event {
                None => break,
                Some(Err(e)) => return Err(Error::agent(format!("agent stream failed: {e}"))),
                Some(Ok(event)) => event,
            };

            match event {
                ResponseEvent::OutputItemAdded { item } => match item {
                    OutputItem::FunctionCall {
                        id,
                        name,
                        arguments,
                    } => calls.push(FunctionCallState {
                        item_id: id,
                        name,
                        arguments,
                    }),
                    // Assistant content starting means "no search needed";
                    // stop reading so the rest of the message is never
                    // generated. Normal completion, not an error.
                    OutputItem::Message { .. } => break,
                    _ => {}
                },
                ResponseEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                    if let Some(call) = calls.iter_mut().find(|c| c.item_id == item_id) {
                        call.arguments.push_str(&delta);
                    }
                }
                ResponseEvent::OutputItemDone { item } => {
                    if let OutputItem::FunctionCall {
                        id,
                        name,
                        arguments,
                    } = item
                    {
                        // The done item carries the complete argument string;
                        // prefer it over whatever the deltas accumulated.
                        match calls.iter_mut().find(|c| c.item_id == id) {
                            Some(call) if !arguments.is_empty() => call.arguments = arguments,
                            Some(_) => {}
                            None => calls.push(FunctionCallState {
                                item_id: id,
                                name,
                                arguments,
                            }),
                        }
                    }
                }
                ResponseEvent::ReasoningDelta { delta } => reasoning.push_str(&delta),
                ResponseEvent::OutputTextDelta { .. } => break,
                ResponseEvent::Completed => break,
            }
        }
        drop(stream);

        let queries = extract_queries(&calls);
        debug!(count = queries.len(), "agent proposed queries");

        let (pending_searches, blocked_queries) = self.filter_queries(queries, pii_check).await;

        Ok(AgentResult {
            pending_searches,
            blocked_queries,
            search_reasoning: reasoning,
        })
    }

    fn build_request(&self, view: &AgentView) -> ResponsesRequest {
        let instructions = if view.system_prompt.is_empty() {
            AGENT_INSTRUCTIONS.to_string()
        } else {
            format!("{AGENT_INSTRUCTIONS}\n\n{}", view.system_prompt)
        };

        let input: Vec<Value> = view
            .messages
            .iter()
            .map(|(role, text)| json!({"role": role, "content": text}))
            .collect();

        ResponsesRequest {
            model: self.model.clone(),
            input: Value::Array(input),
            instructions: Some(instructions),
            tools: vec![search_tool()],
            stream: true,
            temperature: None,
        }
    }

    /// Classify extracted queries into pending and blocked. The PII check is
    /// advisory: a checker error admits the query.
    async fn filter_queries(
        &self,
        queries: Vec<String>,
        pii_check: bool,
    ) -> (Vec<PendingSearch>, Vec<BlockedQuery>) {
        let ids: Vec<String> = queries.iter().map(|_| search_id()).collect();

        let checker = match (&self.checker, pii_check, queries.is_empty()) {
            (Some(checker), true, false) => checker,
            _ => {
                let pending = ids
                    .into_iter()
                    .zip(queries)
                    .map(|(id, query)| PendingSearch { id, query })
                    .collect();
                return (pending, Vec::new());
            }
        };

        let verdicts = checker.check_items(&PII_LEAKAGE, &queries).await;

        let mut pending = Vec::new();
        let mut blocked = Vec::new();
        for item in verdicts {
            let id = ids[item.index].clone();
            let query = queries[item.index].clone();
            match item.verdict {
                Ok(verdict) if verdict.violation => {
                    metrics::counter!("quarry_queries_blocked_total").increment(1);
                    blocked.push(BlockedQuery {
                        id,
                        query,
                        reason: verdict.rationale,
                    });
                }
                Ok(_) => pending.push(PendingSearch { id, query }),
                Err(e) => {
                    warn!(query = %query, error = %e, "pii check failed, allowing query");
                    pending.push(PendingSearch { id, query });
                }
            }
        }
        (pending, blocked)
    }
}

/// Parse accumulated call arguments into trimmed queries. Non-`search` tools
/// and empty queries are dropped.
fn extract_queries(calls: &[FunctionCallState]) -> Vec<String> {
    let mut queries = Vec::new();
    for call in calls {
        if call.name != SEARCH_TOOL {
            continue;
        }
        let args: Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(item_id = %call.item_id, error = %e, "unparseable tool arguments");
                continue;
            }
        };
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if !query.is_empty() {
            queries.push(query.to_string());
        }
    }
    queries
}

fn search_id() -> String {
    format!("ws_{}", uuid::Uuid::new_v4().simple())
}

fn search_tool() -> Value {
    json!({
        "type": "function",
        "name": SEARCH_TOOL,
        "description": "Search the web for current information.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"},
            },
            "required": ["query"],
            "additionalProperties": false,
        },
    })
}
