//! Build-messages stage

use crate::messages::build_responder_messages;
use crate::pipeline::Stage;
use async_trait::async_trait;
use quarry_core::{RequestContext, Result};

/// Assembles the responder's input from the original conversation and the
/// cleaned search results.
pub struct BuildMessagesStage;

#[async_trait]
impl Stage for BuildMessagesStage {
    fn name(&self) -> &'static str {
        "build-messages"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        ctx.responder_messages = build_responder_messages(
            &ctx.request,
            ctx.user_query.as_deref(),
            &ctx.search_results,
        );
        Ok(())
    }
}
