//! quarry search
//!
//! One-shot web-search provider: `search(query, k)` against an external
//! ranked-results API.

pub mod provider;

pub use provider::{HttpSearchProvider, SearchProvider};
