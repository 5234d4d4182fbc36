//! quarry core
//!
//! Types, traits, and utilities shared across quarry components:
//! - Request/message/search entities and the text-extraction rule
//! - Error types and result handling
//! - The request lifecycle state machine
//! - The request-scoped pipeline context
//! - The event-emitter seam between pipeline and wire formats

pub mod context;
pub mod error;
pub mod events;
pub mod state;
pub mod types;

pub use context::{RequestContext, RequestOptions};
pub use error::{Error, Result, UpstreamError};
pub use events::{EventEmitter, MetadataEvent, SearchCallEvent, SearchCallStatus};
pub use state::{RequestState, StateTracker};
pub use types::{
    AgentResult, Annotation, ApiFormat, BlockedQuery, ChatMessage, ExecutedSearch, FailedSearch,
    FeatureFlags, PendingSearch, ProxyRequest, ResponderOutput, Role, SearchResult,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{RequestContext, RequestOptions};
    pub use crate::error::{Error, Result};
    pub use crate::events::{EventEmitter, SearchCallStatus};
    pub use crate::state::RequestState;
    pub use crate::types::{
        AgentResult, Annotation, ApiFormat, BlockedQuery, ChatMessage, ExecutedSearch,
        FeatureFlags, PendingSearch, ProxyRequest, Role, SearchResult,
    };
}
