//! Responder stage

use crate::pipeline::Stage;
use async_trait::async_trait;
use futures::StreamExt;
use quarry_core::{
    Error, MetadataEvent, RequestContext, RequestState, ResponderOutput, Result,
};
use quarry_llm::{CallOptions, CompletionRequest, LlmClient, WireMessage};
use std::sync::Arc;
use tracing::debug;

/// Issues the final completion against the responder model, streaming or
/// whole.
pub struct ResponderStage {
    client: Arc<dyn LlmClient>,
}

impl ResponderStage {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_request(&self, ctx: &RequestContext) -> CompletionRequest {
        let messages = ctx.responder_messages.iter().map(WireMessage::from).collect();
        let mut request = CompletionRequest::new(&ctx.request.model, messages);
        if let Some(temperature) = ctx.request.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = ctx.request.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    async fn respond_streaming(
        &self,
        ctx: &mut RequestContext,
        emitter: Arc<dyn quarry_core::EventEmitter>,
    ) -> Result<()> {
        let request = self.build_request(ctx);
        let opts = CallOptions {
            bearer_token: ctx.options.bearer_token.clone(),
        };

        let mut stream = self
            .client
            .stream_chat_completion(&request, &opts)
            .await
            .map_err(Error::Responder)?;

        let annotations = ctx.annotations();
        let reasoning = ctx
            .agent_result
            .as_ref()
            .map(|r| r.search_reasoning.clone())
            .unwrap_or_default();

        let cancel = ctx.cancel_token();
        let mut metadata_sent = false;
        let mut full_text = String::new();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Timeout),
                chunk = stream.next() => chunk,
            };

            let chunk = match chunk {
                None => break,
                Some(Err(e)) => return Err(Error::Responder(e)),
                Some(Ok(chunk)) => chunk,
            };

            // Exactly one metadata event, before the first content chunk
            if !metadata_sent && chunk.has_choice() {
                emitter
                    .emit_metadata(&MetadataEvent {
                        id: ctx.id.clone(),
                        created: ctx.created,
                        model: ctx.request.model.clone(),
                        annotations: annotations.clone(),
                        reasoning: reasoning.clone(),
                    })
                    .await?;
                metadata_sent = true;
            }

            if let Some(content) = chunk.content() {
                full_text.push_str(content);
            }
            emitter.emit_chunk(&chunk.raw).await?;
        }

        emitter.emit_message_end(&full_text, &annotations).await?;
        emitter.emit_done().await?;
        debug!(chars = full_text.len(), "responder stream finished");
        Ok(())
    }

    async fn respond_whole(&self, ctx: &mut RequestContext) -> Result<()> {
        let request = self.build_request(ctx);
        let opts = CallOptions {
            bearer_token: ctx.options.bearer_token.clone(),
        };

        let response = self
            .client
            .chat_completion(&request, &opts)
            .await
            .map_err(Error::Responder)?;

        ctx.responder_result = Some(ResponderOutput {
            id: response.id.clone(),
            object: response.object.clone(),
            created: response.created,
            model: response.model.clone(),
            content: response.content().to_string(),
            usage: response.usage.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl Stage for ResponderStage {
    fn name(&self) -> &'static str {
        "responder"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        ctx.state.transition(RequestState::Responding)?;

        if let Some(emitter) = ctx.emitter.clone() {
            self.respond_streaming(ctx, emitter).await?;
        } else {
            self.respond_whole(ctx).await?;
        }

        ctx.state.transition(RequestState::Completed)?;
        Ok(())
    }
}
