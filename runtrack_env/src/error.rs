//! Error types for the RunTrack environment abstraction.

use thiserror::Error;

/// Errors raised by environment collaborators (geolocation, capture).
#[derive(Debug, Error)]
pub enum EnvError {
    /// No fix could be produced (no signal, provider disabled, etc.)
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// The fix stream could not be opened or was dropped
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// Route snapshot capture failed
    #[error("Capture error: {0}")]
    CaptureError(String),
}

impl EnvError {
    /// Creates a location-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::LocationUnavailable(msg.into())
    }

    /// Creates a subscription error.
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::SubscriptionError(msg.into())
    }

    /// Creates a capture error.
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::CaptureError(msg.into())
    }
}
