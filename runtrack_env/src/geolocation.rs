//! Geolocation collaborator abstraction.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::EnvError;
use crate::types::{FixEvent, RoutePoint, WatchOptions};

/// Channel end the provider pushes fix events into.
///
/// Unbounded because platform callbacks are synchronous and fixes must never
/// be dropped for back-pressure; fix rates are on the order of 1 Hz.
pub type FixSink = mpsc::UnboundedSender<FixEvent>;

/// Abstraction over the platform location provider.
///
/// # Implementations
///
/// - **Production**: a bridge onto the OS location service
/// - **Testing/Simulation**: `ScriptedGeolocation`
///
/// # Fix Flow
///
/// ```text
/// Provider                   FixSink                   Tracker actor
///   |                           |                          |
///   |-- Fix(point) ------------>|                          |
///   |                           |------------------------->|-- filter + accumulate
///   |-- Lost(reason) ---------->|------------------------->|-- log, keep ticking
/// ```
#[async_trait]
pub trait Geolocation: Send + Sync + 'static {
    /// Asks the platform for foreground location access.
    async fn request_permission(&self) -> bool;

    /// Obtains a single current fix.
    ///
    /// # Returns
    /// * `Ok(point)` - A fix was acquired
    /// * `Err(EnvError::LocationUnavailable)` - No fix could be produced
    async fn current_fix(&self) -> Result<RoutePoint, EnvError>;

    /// Opens the continuous fix stream.
    ///
    /// Events are pushed into `sink` until the returned handle is cancelled
    /// or dropped. Closing the sink from the provider side signals that the
    /// stream is gone.
    fn watch_fixes(
        &self,
        options: WatchOptions,
        sink: FixSink,
    ) -> Result<SubscriptionHandle, EnvError>;
}

/// Guard for an open fix stream.
///
/// Cancels the subscription on `cancel()` or when dropped, whichever happens
/// first. Cancellation runs at most once.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    /// Wraps a provider-specific cancel action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Returns true until the subscription has been released.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Explicitly cancels the subscription.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
