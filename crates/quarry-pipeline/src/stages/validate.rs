//! Validate stage

use crate::pipeline::Stage;
use async_trait::async_trait;
use quarry_core::{ApiFormat, Error, RequestContext, Result, Role};

/// Checks the request shape and pins down the user query. No side effects
/// beyond `user_query`.
pub struct ValidateStage;

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        if ctx.request.model.trim().is_empty() {
            return Err(Error::validation("model", "model is required"));
        }

        let user_query = match ctx.request.format {
            ApiFormat::ChatCompletions => ctx
                .request
                .messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::User)
                .map(|m| m.text())
                .find(|text| !text.trim().is_empty())
                .ok_or_else(|| Error::validation("messages", "no user message found"))?,
            ApiFormat::Responses => {
                let input = ctx.request.input.as_deref().unwrap_or("");
                if input.trim().is_empty() {
                    return Err(Error::validation("input", "input is required"));
                }
                input.to_string()
            }
        };

        ctx.user_query = Some(user_query);
        Ok(())
    }
}
