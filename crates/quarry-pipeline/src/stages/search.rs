//! Search stage

use crate::pipeline::Stage;
use async_trait::async_trait;
use futures::future::join_all;
use quarry_core::{
    ExecutedSearch, FailedSearch, RequestContext, Result, SearchCallEvent, SearchCallStatus,
};
use quarry_search::SearchProvider;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Results requested per query
const RESULT_CAP: usize = 5;

/// Runs every pending search against the provider, in parallel.
///
/// Blocked queries are announced before anything else, even when there are
/// no pending searches, so the client always sees what was refused.
/// Individual provider errors are recovered per-query; partial results are a
/// legitimate outcome and the stage itself does not fail on them.
pub struct SearchStage {
    provider: Arc<dyn SearchProvider>,
}

impl SearchStage {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for SearchStage {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn execute(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(agent_result) = &ctx.agent_result else {
            return Ok(());
        };

        if let Some(emitter) = &ctx.emitter {
            for blocked in &agent_result.blocked_queries {
                emitter
                    .emit_search_call(&SearchCallEvent {
                        id: blocked.id.clone(),
                        status: SearchCallStatus::Blocked,
                        query: Some(blocked.query.clone()),
                        reason: Some(blocked.reason.clone()),
                        created: ctx.created,
                        model: ctx.request.model.clone(),
                    })
                    .await?;
            }
        }

        if agent_result.pending_searches.is_empty() {
            return Ok(());
        }

        let executed: Mutex<Vec<ExecutedSearch>> = Mutex::new(Vec::new());
        let failed: Mutex<Vec<FailedSearch>> = Mutex::new(Vec::new());
        let emitter = ctx.emitter.clone();
        let created = ctx.created;
        let model = ctx.request.model.clone();

        let searches = agent_result.pending_searches.iter().map(|pending| {
            let provider = self.provider.clone();
            let emitter = emitter.clone();
            let executed = &executed;
            let failed = &failed;
            let model = model.clone();
            async move {
                let event = |status: SearchCallStatus, query: Option<String>, reason| {
                    SearchCallEvent {
                        id: pending.id.clone(),
                        status,
                        query,
                        reason,
                        created,
                        model: model.clone(),
                    }
                };

                if let Some(emitter) = &emitter {
                    emitter
                        .emit_search_call(&event(
                            SearchCallStatus::InProgress,
                            Some(pending.query.clone()),
                            None,
                        ))
                        .await?;
                }

                match provider.search(&pending.query, RESULT_CAP).await {
                    Ok(results) => {
                        debug!(query = %pending.query, count = results.len(), "search completed");
                        metrics::counter!("quarry_searches_total", "outcome" => "completed")
                            .increment(1);
                        executed.lock().await.push(ExecutedSearch {
                            id: pending.id.clone(),
                            query: pending.query.clone(),
                            results,
                        });
                        if let Some(emitter) = &emitter {
                            emitter
                                .emit_search_call(&event(SearchCallStatus::Completed, None, None))
                                .await?;
                        }
                    }
                    Err(e) => {
                        warn!(query = %pending.query, error = %e, "search failed");
                        metrics::counter!("quarry_searches_total", "outcome" => "failed")
                            .increment(1);
                        failed.lock().await.push(FailedSearch {
                            id: pending.id.clone(),
                            query: pending.query.clone(),
                            reason: e.to_string(),
                        });
                        if let Some(emitter) = &emitter {
                            emitter
                                .emit_search_call(&event(
                                    SearchCallStatus::Failed,
                                    None,
                                    Some(e.to_string()),
                                ))
                                .await?;
                        }
                    }
                }
                Ok::<(), quarry_core::Error>(())
            }
        });

        for outcome in join_all(searches).await {
            outcome?;
        }

        ctx.search_results = executed.into_inner();
        ctx.failed_searches = failed.into_inner();
        Ok(())
    }
}
