//! quarry proxy binary
//!
//! Augments a client-chosen responder LLM with real-time web search: a small
//! agent model decides whether to search, queries are PII-filtered, results
//! are injection-filtered, and the cleaned results are folded into the
//! responder's prompt.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use quarry_proxy::config::ProxyConfig;
use quarry_proxy::state::AppState;
use quarry_proxy::{routes, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting quarry proxy");

    let config = ProxyConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded");
    info!("LLM upstream: {}", config.llm.base_url);
    info!("Agent model: {}", config.llm.agent_model);
    info!("Safeguard model: {}", config.llm.safeguard_model);
    info!("Search endpoint: {}", config.search.endpoint);

    let metrics_handle = init_metrics()?;

    let app_state = AppState::new(config, metrics_handle)?;
    let app = routes::create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cli.listen, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Proxy listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("quarry=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!("quarry_requests_total", "Requests by route and outcome");
    metrics::describe_counter!(
        "quarry_searches_total",
        "Executed searches by outcome (completed, failed)"
    );
    metrics::describe_counter!(
        "quarry_queries_blocked_total",
        "Search queries blocked by the PII filter"
    );
    metrics::describe_counter!(
        "quarry_results_filtered_total",
        "Search results dropped by the injection filter"
    );
    metrics::describe_histogram!(
        "quarry_stage_latency_us",
        metrics::Unit::Microseconds,
        "Pipeline stage latency in microseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
