//! Error types for quarry

use crate::state::RequestState;

/// Result type alias using quarry's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by an upstream LLM call.
///
/// Keeps the structured error body (when the upstream sent one) so streaming
/// responses can pass it through on the wire instead of a generic envelope.
#[derive(Debug, Clone)]
pub struct UpstreamError {
    /// Human-readable message
    pub message: String,

    /// HTTP status from the upstream, if the call got that far
    pub status: Option<u16>,

    /// Raw `{"error": {...}}` body from the upstream, if it parsed
    pub body: Option<serde_json::Value>,
}

impl UpstreamError {
    /// Create an upstream error carrying only a message
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            status: None,
            body: None,
        }
    }

    /// Create an upstream error from an HTTP status and response body
    pub fn from_response(status: u16, body_text: &str) -> Self {
        let body = serde_json::from_str::<serde_json::Value>(body_text)
            .ok()
            .filter(|v| v.get("error").is_some());
        Self {
            message: format!("upstream returned status {status}"),
            status: Some(status),
            body,
        }
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Core error type for quarry operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request failed validation; surfaces to the client as a 400
    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Agent LLM call failed or its stream erred
    #[error("agent error: {0}")]
    Agent(String),

    /// Responder LLM call failed
    #[error("responder error: {0}")]
    Responder(UpstreamError),

    /// Search provider call failed (recovered per-query in the search stage)
    #[error("search error: {0}")]
    Search(String),

    /// Safeguard classifier call failed (fail-open at call sites)
    #[error("safeguard error: {0}")]
    Safeguard(String),

    /// Generic internal API error
    #[error("api error: {0}")]
    Api(String),

    /// A pipeline stage failed; wraps the underlying error with the stage name
    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A state transition outside the allowed table was attempted
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: RequestState,
        to: RequestState,
    },

    /// The pipeline deadline elapsed or the caller cancelled the request
    #[error("request timed out or was cancelled")]
    Timeout,

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new agent error
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Create a new responder error carrying only a message
    pub fn responder(msg: impl Into<String>) -> Self {
        Self::Responder(UpstreamError::message(msg))
    }

    /// Create a new search error
    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Create a new safeguard error
    pub fn safeguard(msg: impl Into<String>) -> Self {
        Self::Safeguard(msg.into())
    }

    /// Create a new api error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Wrap an error with the name of the stage it came from
    pub fn stage(stage: &'static str, source: Error) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// The name of the failing stage, when this is a stage wrapper
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Strip the stage wrapper, returning the underlying error.
    ///
    /// The HTTP layer maps status codes off the inner kind; the wrapper only
    /// feeds logging and state-transition metadata.
    pub fn unwrap_stage(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.unwrap_stage(),
            other => other,
        }
    }

    /// Public error `type` string for the wire. Internal kinds collapse to
    /// `api_error`.
    pub fn kind_str(&self) -> &'static str {
        match self.unwrap_stage() {
            Self::Validation { .. } => "validation_error",
            Self::Agent(_) => "agent_error",
            Self::Responder(_) => "responder_error",
            _ => "api_error",
        }
    }
}
