//! quarry proxy
//!
//! OpenAI-compatible HTTP server fronting the search-augmentation pipeline.
//! The binary in `main.rs` wires these modules to a listener; tests build
//! the router directly.

pub mod config;
pub mod routes;
pub mod security;
pub mod state;

use clap::Parser;

/// Command-line interface
#[derive(Parser, Debug)]
#[command(name = "quarry-proxy")]
#[command(about = "Search-augmented chat completion proxy", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// OpenAI-compatible LLM base URL
    #[arg(long, env = "QUARRY_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Service API key for LLM calls
    #[arg(long, env = "QUARRY_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Web-search endpoint URL
    #[arg(long, env = "QUARRY_SEARCH_ENDPOINT")]
    pub search_endpoint: Option<String>,

    /// API key for the search backend
    #[arg(long, env = "QUARRY_SEARCH_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Allow http/localhost upstreams
    #[arg(long)]
    pub development: bool,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    pub port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
