//! Agent stage

use crate::agent::{AgentRunner, AgentView};
use crate::pipeline::Stage;
use async_trait::async_trait;
use quarry_core::{RequestContext, RequestState, Result, Role};
use std::sync::Arc;
use tracing::debug;

/// Asks the agent model whether to search and classifies the proposed
/// queries. Skipped entirely when web search is off; the responder then
/// answers with no augmentation.
pub struct AgentStage {
    runner: Arc<AgentRunner>,
}

impl AgentStage {
    pub fn new(runner: Arc<AgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for AgentStage {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        ctx.state.transition(RequestState::Processing)?;

        if !ctx.request.features.web_search {
            debug!("web search disabled, skipping agent");
            return Ok(());
        }

        let view = build_view(ctx);
        let cancel = ctx.cancel_token();
        let result = self
            .runner
            .run(view, ctx.options.pii_check_enabled, &cancel)
            .await?;

        debug!(
            pending = result.pending_searches.len(),
            blocked = result.blocked_queries.len(),
            "agent finished"
        );
        ctx.agent_result = Some(result);
        Ok(())
    }
}

/// Project the conversation into the agent's view: system text collapsed
/// into one prompt, everything else as `{role, text}` pairs.
fn build_view(ctx: &RequestContext) -> AgentView {
    let system_prompt = ctx
        .request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join("\n");

    let mut messages: Vec<(String, String)> = ctx
        .request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| (m.role.as_str().to_string(), m.text()))
        .collect();

    // Responses-format requests may carry no history at all; the agent still
    // needs the user's question.
    if messages.is_empty() {
        if let Some(query) = &ctx.user_query {
            messages.push(("user".to_string(), query.clone()));
        }
    }

    AgentView {
        system_prompt,
        messages,
    }
}
