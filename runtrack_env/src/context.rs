//! Core environment context trait for RunTrack engines.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for clock and task interaction.
///
/// This trait abstracts the "real world" so that the tracking engine can run
/// against a production runtime (tokio) and a deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
///
/// # Determinism
///
/// Active-time accounting only ever reads `now()`, so a virtual clock fully
/// controls elapsed duration, pace and speed in tests.
#[async_trait]
pub trait TrackerContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for active/paused interval arithmetic. Never goes backwards.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for run dates and fix timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: resolves once the harness advances the virtual clock
    /// past the deadline
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;

    /// Wall-clock time as milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
