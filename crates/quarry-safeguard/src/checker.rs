//! Safeguard checker
//!
//! Evaluates text against a named policy through a dedicated classifier LLM
//! call. The call runs at temperature 0 with the policy as the system prompt
//! and a JSON-schema constraint on the output, so the verdict always parses;
//! an unparseable reply is a checker error, which callers treat as fail-open.

use crate::policy::Policy;
use async_trait::async_trait;
use futures::future::join_all;
use quarry_core::{Error, Result};
use quarry_llm::{CallOptions, CompletionRequest, LlmClient, WireMessage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Classifier decision for one piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub violation: bool,
    pub rationale: String,
}

/// Per-item result from a fan-out check. `verdict` is an `Err` when the
/// classifier call itself failed, so callers can distinguish classification
/// errors from policy violations.
#[derive(Debug)]
pub struct ItemVerdict {
    pub index: usize,
    pub verdict: Result<Verdict>,
}

/// Evaluates content against a named policy
#[async_trait]
pub trait SafeguardChecker: Send + Sync {
    /// Classify one piece of content
    async fn check(&self, policy: &Policy, content: &str) -> Result<Verdict>;

    /// Classify many items in parallel. Results are index-aligned with the
    /// input regardless of completion order.
    async fn check_items(&self, policy: &Policy, items: &[String]) -> Vec<ItemVerdict> {
        let checks = items.iter().enumerate().map(|(index, content)| async move {
            ItemVerdict {
                index,
                verdict: self.check(policy, content).await,
            }
        });
        join_all(checks).await
    }
}

/// JSON schema every classifier reply must satisfy
fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "violation": {"type": "boolean"},
            "rationale": {"type": "string"},
        },
        "required": ["violation", "rationale"],
        "additionalProperties": false,
    })
}

/// Checker backed by a classifier LLM
pub struct LlmSafeguardChecker {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl LlmSafeguardChecker {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SafeguardChecker for LlmSafeguardChecker {
    async fn check(&self, policy: &Policy, content: &str) -> Result<Verdict> {
        let request = CompletionRequest::new(
            &self.model,
            vec![
                WireMessage::text("system", policy.prompt),
                WireMessage::text("user", content),
            ],
        )
        .with_temperature(0.0);

        // Safeguard calls authenticate with the service key, never the
        // client's forwarded credential.
        let reply = self
            .client
            .json_completion(
                request,
                "safeguard_verdict",
                verdict_schema(),
                &CallOptions::default(),
            )
            .await
            .map_err(|e| Error::safeguard(format!("{} check failed: {e}", policy.name)))?;

        let verdict: Verdict = serde_json::from_str(&reply).map_err(|e| {
            Error::safeguard(format!("{} verdict did not parse: {e}", policy.name))
        })?;

        debug!(
            policy = policy.name,
            violation = verdict.violation,
            "safeguard verdict"
        );
        Ok(verdict)
    }
}
