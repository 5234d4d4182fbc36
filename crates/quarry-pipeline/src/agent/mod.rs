//! Agent model integration

pub mod runner;

pub use runner::{AgentRunner, AgentView};
