//! Ordered stage execution
//!
//! The pipeline runs its stages strictly sequentially against one
//! request-scoped context. The first stage error transitions the request to
//! `Failed` (recording the stage name), wraps the error with stage context,
//! and returns, together with the context, so the caller can inspect
//! partial state and release resources.

use async_trait::async_trait;
use quarry_core::{
    Error, EventEmitter, ProxyRequest, RequestContext, RequestOptions, RequestState, Result,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// One pipeline stage, one responsibility
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, used in error wrapping and state metadata
    fn name(&self) -> &'static str;

    /// Run this stage against the context
    async fn execute(&self, ctx: &mut RequestContext) -> Result<()>;
}

/// Pipeline execution settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Hard deadline for the whole request
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// An ordered sequence of stages
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Append a stage
    pub fn add_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run the request through every stage in order.
    ///
    /// A deadline-bounded child of `parent` is installed on the context; the
    /// returned context still owns it, and the caller must invoke
    /// `ctx.cancel()` once it is done with the context so in-flight
    /// downstream work terminates promptly.
    pub async fn execute(
        &self,
        request: ProxyRequest,
        options: RequestOptions,
        emitter: Option<Arc<dyn EventEmitter>>,
        parent: &CancellationToken,
    ) -> (RequestContext, Result<()>) {
        let mut ctx = RequestContext::new(request, options);
        if let Some(emitter) = emitter {
            ctx = ctx.with_emitter(emitter);
        }

        let cancel = parent.child_token();
        ctx.set_cancel_token(cancel.clone());

        let deadline = {
            let token = cancel.clone();
            let timeout = self.config.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("pipeline deadline elapsed, cancelling request");
                token.cancel();
            })
        };

        // The Responses lifecycle opens before any stage runs; a no-op for
        // Chat Completions.
        if let Some(emitter) = ctx.emitter.clone() {
            if let Err(err) = emitter
                .emit_response_start(&ctx.id, ctx.created, &ctx.request.model)
                .await
            {
                deadline.abort();
                let wrapped = Error::stage("emit", err);
                self.fail(&mut ctx, "emit", &wrapped);
                return (ctx, Err(wrapped));
            }
        }

        let result = self.run_stages(&mut ctx, &cancel).await;
        deadline.abort();

        (ctx, result)
    }

    async fn run_stages(&self, ctx: &mut RequestContext, cancel: &CancellationToken) -> Result<()> {
        for stage in &self.stages {
            let start = Instant::now();
            debug!(stage = stage.name(), "executing stage");

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Timeout),
                r = stage.execute(ctx) => r,
            };

            metrics::histogram!("quarry_stage_latency_us", "stage" => stage.name())
                .record(start.elapsed().as_micros() as f64);

            if let Err(err) = result {
                let wrapped = Error::stage(stage.name(), err);
                self.fail(ctx, stage.name(), &wrapped);
                return Err(wrapped);
            }
        }
        Ok(())
    }

    fn fail(&self, ctx: &mut RequestContext, stage: &'static str, err: &Error) {
        metrics::counter!("quarry_requests_total", "outcome" => "failed").increment(1);

        let metadata = json!({
            "stage": stage,
            "error": err.unwrap_stage().to_string(),
        });
        // Every live state may fail; a rejected transition here means the
        // machine is already terminal, which is an implementation bug.
        if ctx.state.current() != RequestState::Failed {
            if let Err(transition_err) = ctx
                .state
                .transition_with(RequestState::Failed, Some(metadata))
            {
                error!(stage, %transition_err, "could not record failure transition");
            }
        }
    }
}
