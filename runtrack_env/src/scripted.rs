//! In-memory geolocation provider with programmable outcomes.
//!
//! Used by engine tests and the simulation harness in place of a platform
//! location service. Fixes are injected through a [`FixInjector`].

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::capture::RouteCapture;
use crate::error::EnvError;
use crate::geolocation::{FixSink, Geolocation, SubscriptionHandle};
use crate::types::{FixEvent, RoutePoint, WatchOptions};

#[derive(Debug, Default)]
struct ScriptState {
    permission_granted: bool,
    initial_fix: Option<RoutePoint>,
    watch_failure: Option<String>,
    sink: Option<FixSink>,
    /// Id of the currently open subscription
    active: Option<u64>,
    next_subscription: u64,
    watch_calls: usize,
    last_options: Option<WatchOptions>,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted location provider.
///
/// Clones share state, so a test can hand one clone to the tracker and keep
/// another for assertions.
#[derive(Clone)]
pub struct ScriptedGeolocation {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedGeolocation {
    /// Permission granted, initial fix at the origin with 5 m accuracy.
    pub fn new() -> Self {
        let state = ScriptState {
            permission_granted: true,
            initial_fix: Some(RoutePoint::new(0.0, 0.0, 0).with_accuracy(5.0)),
            ..ScriptState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Denies the permission request.
    pub fn deny_permission(self) -> Self {
        lock(&self.state).permission_granted = false;
        self
    }

    /// Sets the fix returned by `current_fix`.
    pub fn with_initial_fix(self, fix: RoutePoint) -> Self {
        lock(&self.state).initial_fix = Some(fix);
        self
    }

    /// Makes `current_fix` fail.
    pub fn without_initial_fix(self) -> Self {
        lock(&self.state).initial_fix = None;
        self
    }

    /// Makes `watch_fixes` fail with the given reason.
    pub fn fail_watch(self, reason: impl Into<String>) -> Self {
        lock(&self.state).watch_failure = Some(reason.into());
        self
    }

    /// Returns an injector bound to this provider.
    pub fn injector(&self) -> FixInjector {
        FixInjector {
            state: Arc::clone(&self.state),
        }
    }

    /// True while a subscription is open.
    pub fn is_watching(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    /// Number of `watch_fixes` calls made so far.
    pub fn watch_calls(&self) -> usize {
        lock(&self.state).watch_calls
    }

    /// Options passed to the most recent `watch_fixes` call.
    pub fn last_options(&self) -> Option<WatchOptions> {
        lock(&self.state).last_options
    }
}

impl Default for ScriptedGeolocation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geolocation for ScriptedGeolocation {
    async fn request_permission(&self) -> bool {
        lock(&self.state).permission_granted
    }

    async fn current_fix(&self) -> Result<RoutePoint, EnvError> {
        lock(&self.state)
            .initial_fix
            .ok_or_else(|| EnvError::unavailable("no scripted initial fix"))
    }

    fn watch_fixes(
        &self,
        options: WatchOptions,
        sink: FixSink,
    ) -> Result<SubscriptionHandle, EnvError> {
        let mut state = lock(&self.state);
        state.watch_calls += 1;
        state.last_options = Some(options);

        if let Some(reason) = state.watch_failure.clone() {
            return Err(EnvError::subscription(reason));
        }

        let id = state.next_subscription;
        state.next_subscription += 1;
        state.active = Some(id);
        state.sink = Some(sink);
        debug!("Scripted subscription {} opened", id);

        let shared = Arc::clone(&self.state);
        Ok(SubscriptionHandle::new(move || {
            let mut state = lock(&shared);
            if state.active == Some(id) {
                state.active = None;
                state.sink = None;
                debug!("Scripted subscription {} cancelled", id);
            }
        }))
    }
}

/// Pushes events into the open subscription of a [`ScriptedGeolocation`].
#[derive(Clone)]
pub struct FixInjector {
    state: Arc<Mutex<ScriptState>>,
}

impl FixInjector {
    /// Delivers a fix. Returns false when no subscription is open.
    pub fn push(&self, fix: RoutePoint) -> bool {
        self.send(FixEvent::Fix(fix))
    }

    /// Reports a dropped stream without closing it.
    pub fn lose(&self, reason: impl Into<String>) -> bool {
        self.send(FixEvent::Lost(reason.into()))
    }

    /// Closes the stream from the provider side.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.sink = None;
        state.active = None;
    }

    fn send(&self, event: FixEvent) -> bool {
        let state = lock(&self.state);
        match &state.sink {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }
}

/// Route capture returning a fixed outcome and counting calls.
#[derive(Clone)]
pub struct ScriptedCapture {
    outcome: Result<String, String>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedCapture {
    /// Every capture succeeds with `uri`.
    pub fn succeed(uri: impl Into<String>) -> Self {
        Self {
            outcome: Ok(uri.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every capture fails with `reason`.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Route lengths seen by each capture call, in order.
    pub fn captured_route_lengths(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RouteCapture for ScriptedCapture {
    async fn capture(&self, route: &[RoutePoint]) -> Result<String, EnvError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.len());
        self.outcome.clone().map_err(EnvError::capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_scripted_defaults() {
        let geo = ScriptedGeolocation::new();
        assert!(geo.request_permission().await);
        assert!(geo.current_fix().await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let geo = ScriptedGeolocation::new().deny_permission().without_initial_fix();
        assert!(!geo.request_permission().await);
        assert!(matches!(
            geo.current_fix().await,
            Err(EnvError::LocationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_fixes_reach_sink_until_cancelled() {
        let geo = ScriptedGeolocation::new();
        let injector = geo.injector();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(!injector.push(RoutePoint::new(1.0, 1.0, 0)));

        let handle = geo.watch_fixes(WatchOptions::default(), tx).unwrap();
        assert!(geo.is_watching());
        assert!(injector.push(RoutePoint::new(1.0, 2.0, 10)));
        assert_eq!(
            rx.recv().await,
            Some(FixEvent::Fix(RoutePoint::new(1.0, 2.0, 10)))
        );

        handle.cancel();
        assert!(!geo.is_watching());
        assert!(!injector.push(RoutePoint::new(1.0, 3.0, 20)));
        // Sink dropped on cancel, so the stream ends
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_scripted_capture_records_calls() {
        let capture = ScriptedCapture::fail("no gpu");
        let route = vec![RoutePoint::new(0.0, 0.0, 0); 3];
        assert!(matches!(
            capture.capture(&route).await,
            Err(EnvError::CaptureError(_))
        ));
        assert_eq!(capture.captured_route_lengths(), vec![3]);
    }

    #[test]
    fn test_watch_failure() {
        let geo = ScriptedGeolocation::new().fail_watch("radio off");
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = geo.watch_fixes(WatchOptions::default(), tx);
        assert!(matches!(result, Err(EnvError::SubscriptionError(_))));
        assert_eq!(geo.watch_calls(), 1);
        assert!(!geo.is_watching());
    }
}
