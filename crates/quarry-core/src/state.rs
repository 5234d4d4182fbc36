//! Request lifecycle state machine
//!
//! Allowed transitions:
//! `Received -> {Processing, Failed}`,
//! `Processing -> {Responding, Failed}`,
//! `Responding -> {Completed, Failed}`;
//! `Completed` and `Failed` are terminal.

use crate::error::{Error, Result};
use serde::Serialize;
use std::time::SystemTime;

/// Lifecycle state of a request inside the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Received,
    Processing,
    Responding,
    Completed,
    Failed,
}

impl RequestState {
    /// Whether the transition table allows moving from `self` to `next`
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Processing)
                | (Received, Failed)
                | (Processing, Responding)
                | (Processing, Failed)
                | (Responding, Completed)
                | (Responding, Failed)
        )
    }

    /// Whether no further transitions are allowed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single recorded transition
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: RequestState,
    pub to: RequestState,
    pub at: SystemTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Tracks the current state and the full transition history of a request.
///
/// Illegal transitions fail loudly; callers must not absorb the error.
#[derive(Debug)]
pub struct StateTracker {
    current: RequestState,
    history: Vec<StateTransition>,
}

impl StateTracker {
    /// Create a tracker in the `Received` state
    pub fn new() -> Self {
        Self {
            current: RequestState::Received,
            history: Vec::new(),
        }
    }

    /// The current state
    pub fn current(&self) -> RequestState {
        self.current
    }

    /// All recorded transitions, oldest first
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Transition to `next` with no metadata
    pub fn transition(&mut self, next: RequestState) -> Result<()> {
        self.transition_with(next, None)
    }

    /// Transition to `next`, recording optional metadata with the transition
    pub fn transition_with(
        &mut self,
        next: RequestState,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.current,
                to: next,
            });
        }

        self.history.push(StateTransition {
            from: self.current,
            to: next,
            at: SystemTime::now(),
            metadata,
        });
        self.current = next;
        Ok(())
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_happy_path() {
        let mut tracker = StateTracker::new();
        tracker.transition(RequestState::Processing).unwrap();
        tracker.transition(RequestState::Responding).unwrap();
        tracker.transition(RequestState::Completed).unwrap();

        assert_eq!(tracker.current(), RequestState::Completed);
        assert!(tracker.current().is_terminal());
        assert_eq!(tracker.history().len(), 3);
    }

    #[test]
    fn test_failure_allowed_from_every_live_state() {
        for path in [
            vec![],
            vec![RequestState::Processing],
            vec![RequestState::Processing, RequestState::Responding],
        ] {
            let mut tracker = StateTracker::new();
            for state in path {
                tracker.transition(state).unwrap();
            }
            tracker.transition(RequestState::Failed).unwrap();
            assert_eq!(tracker.current(), RequestState::Failed);
        }
    }

    #[test]
    fn test_illegal_transition_is_loud() {
        let mut tracker = StateTracker::new();
        let err = tracker.transition(RequestState::Completed).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidStateTransition {
                from: RequestState::Received,
                to: RequestState::Completed,
            }
        ));
        // state must be unchanged after a rejected transition
        assert_eq!(tracker.current(), RequestState::Received);
        assert!(tracker.history().is_empty());
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut tracker = StateTracker::new();
        tracker.transition(RequestState::Failed).unwrap();
        for next in [
            RequestState::Received,
            RequestState::Processing,
            RequestState::Responding,
            RequestState::Completed,
            RequestState::Failed,
        ] {
            assert!(tracker.transition(next).is_err());
        }
    }

    #[test]
    fn test_transition_metadata_recorded() {
        let mut tracker = StateTracker::new();
        tracker
            .transition_with(
                RequestState::Failed,
                Some(json!({"stage": "validate", "error": "no user message found"})),
            )
            .unwrap();

        let last = tracker.history().last().unwrap();
        assert_eq!(last.metadata.as_ref().unwrap()["stage"], "validate");
    }
}
