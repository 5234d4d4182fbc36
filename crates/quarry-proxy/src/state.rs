//! Application state shared across requests

use crate::config::ProxyConfig;
use crate::security::validate_upstream_url;
use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use quarry_llm::{HttpLlmClient, LlmClient};
use quarry_pipeline::{
    AgentRunner, AgentStage, BuildMessagesStage, FilterResultsStage, Pipeline, PipelineConfig,
    ResponderStage, SearchStage, ValidateStage,
};
use quarry_safeguard::{LlmSafeguardChecker, SafeguardChecker};
use quarry_search::{HttpSearchProvider, SearchProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub pipeline: Arc<Pipeline>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Initialize state: validate upstreams, build clients, assemble the
    /// standard stage order.
    pub fn new(config: ProxyConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        validate_upstream_url(&config.llm.base_url, config.development)
            .context("invalid llm base_url")?;
        validate_upstream_url(&config.search.endpoint, config.development)
            .context("invalid search endpoint")?;

        let llm: Arc<dyn LlmClient> = Arc::new(
            HttpLlmClient::new(&config.llm.base_url, config.llm.api_key.clone())
                .map_err(|e| anyhow::anyhow!("failed to build llm client: {e}"))?,
        );

        let search: Arc<dyn SearchProvider> = Arc::new(HttpSearchProvider::new(
            &config.search.endpoint,
            config.search.api_key.clone(),
        )?);

        let checker: Arc<dyn SafeguardChecker> = Arc::new(LlmSafeguardChecker::new(
            llm.clone(),
            &config.llm.safeguard_model,
        ));

        let runner = Arc::new(AgentRunner::new(
            llm.clone(),
            Some(checker.clone()),
            &config.llm.agent_model,
        ));

        let pipeline = Pipeline::new(PipelineConfig {
            timeout: Duration::from_secs(config.pipeline.timeout_secs),
        })
        .add_stage(Box::new(ValidateStage))
        .add_stage(Box::new(AgentStage::new(runner)))
        .add_stage(Box::new(SearchStage::new(search)))
        .add_stage(Box::new(FilterResultsStage::new(Some(checker))))
        .add_stage(Box::new(BuildMessagesStage))
        .add_stage(Box::new(ResponderStage::new(llm)));

        info!(stages = pipeline.stage_count(), "pipeline assembled");

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            metrics_handle,
        })
    }
}
