//! Error taxonomy of the tracking engine.

use thiserror::Error;

use crate::session::SessionState;

/// Lifecycle operation names, used in transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Stop,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
        };
        write!(f, "{}", name)
    }
}

/// Errors surfaced by the tracker.
///
/// `PermissionDenied`, `FixUnavailable` and `InvalidTransition` are returned
/// to callers. `SubscriptionFailure` and `CaptureFailure` describe degraded
/// conditions that are logged while the session carries on.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Initial fix unavailable: {0}")]
    FixUnavailable(String),

    #[error("Invalid transition: cannot {action} while {state}")]
    InvalidTransition {
        action: Action,
        state: SessionState,
    },

    #[error("Fix subscription failed: {0}")]
    SubscriptionFailure(String),

    #[error("Route capture failed: {0}")]
    CaptureFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Tracker is no longer running")]
    TrackerClosed,
}

impl TrackerError {
    pub fn invalid(action: Action, state: SessionState) -> Self {
        Self::InvalidTransition { action, state }
    }
}

/// Run store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
