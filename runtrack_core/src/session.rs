//! The run session state machine.
//!
//! Orchestrates the GeoFix filter, the distance/elevation accumulators and
//! the time accountant into one lifecycle:
//!
//! ```text
//!  Idle ──start──► AcquiringFix ──fix──► Tracking ◄──resume── Paused
//!   ▲                   │                    │ └────pause────►  │
//!   │                 error                  └──stop──┐  ┌─stop─┘
//!   ├───────────────────┘                            ▼  ▼
//!   └──────────────────────────────────────────── Finalizing
//! ```
//!
//! `RunSession` is synchronous and clock-agnostic: every operation that needs
//! time takes the caller's monotonic `now`. The tracker actor owns one
//! instance and serializes all calls into it.

use runtrack_env::RoutePoint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::calories::CalorieEstimator;
use crate::elevation::ElevationAccumulator;
use crate::error::{Action, TrackerError};
use crate::geodesy::DistanceAccumulator;
use crate::geofix::{FilterConfig, FilterResult, GeoFixFilter, Segment};
use crate::record::{RunMetrics, RunRecord};
use crate::time_accountant::{avg_speed_kph, pace_seconds_per_km, TimeAccountant};

/// Lifecycle state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AcquiringFix,
    Tracking,
    Paused,
    Finalizing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AcquiringFix => "acquiring fix",
            SessionState::Tracking => "tracking",
            SessionState::Paused => "paused",
            SessionState::Finalizing => "finalizing",
        };
        write!(f, "{}", name)
    }
}

/// Point-in-time view of the session for live/minimized displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub run_id: Option<Uuid>,
    pub state: SessionState,
    /// Stored fixes, shared with the session until the next fix arrives
    pub route: Arc<[RoutePoint]>,
    pub elapsed_seconds: f64,
    pub distance_meters: f64,
    pub pace_seconds_per_km: f64,
    pub current_speed_kph: f64,
    pub elevation_gain_meters: f64,
}

impl LiveSnapshot {
    /// Snapshot of a tracker with no session.
    pub fn idle() -> Self {
        Self::empty(SessionState::Idle)
    }

    fn empty(state: SessionState) -> Self {
        Self {
            run_id: None,
            state,
            route: Arc::from(Vec::new()),
            elapsed_seconds: 0.0,
            distance_meters: 0.0,
            pace_seconds_per_km: 0.0,
            current_speed_kph: 0.0,
            elevation_gain_meters: 0.0,
        }
    }
}

/// Mutable in-flight state of one run.
#[derive(Debug)]
struct ActiveSession {
    id: Uuid,
    name: String,
    started_at_ms: u64,
    filter: GeoFixFilter,
    /// Published copy of `filter.route()`
    route_view: Arc<[RoutePoint]>,
    distance: DistanceAccumulator,
    elevation: ElevationAccumulator,
    clock: TimeAccountant,
    /// Speed over the most recent usable segment
    current_speed_mps: Option<f64>,
}

impl ActiveSession {
    fn measure(&mut self, segment: &Segment) {
        let meters = self.distance.add_segment(segment);
        self.elevation.add_segment(segment);

        let reported = segment.to.speed.filter(|s| s.is_finite() && *s >= 0.0);
        self.current_speed_mps = reported.or_else(|| {
            let dt_ms = segment.to.timestamp_ms.saturating_sub(segment.from.timestamp_ms);
            (dt_ms > 0).then(|| meters / (dt_ms as f64 / 1000.0))
        });
    }
}

/// Explicit run-session state machine.
pub struct RunSession {
    filter_config: FilterConfig,
    calories: Arc<dyn CalorieEstimator>,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl RunSession {
    pub fn new(filter_config: FilterConfig, calories: Arc<dyn CalorieEstimator>) -> Self {
        Self {
            filter_config,
            calories,
            state: SessionState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while a session exists (tracking or paused).
    pub fn has_session(&self) -> bool {
        self.active.is_some()
    }

    /// `Idle → AcquiringFix`.
    pub fn begin_start(&mut self) -> Result<(), TrackerError> {
        if self.state != SessionState::Idle {
            return Err(TrackerError::invalid(Action::Start, self.state));
        }
        self.state = SessionState::AcquiringFix;
        debug!("Acquiring initial fix");
        Ok(())
    }

    /// `AcquiringFix → Idle` after permission or fix failure. No session is
    /// created.
    pub fn abort_start(&mut self) {
        if self.state == SessionState::AcquiringFix {
            self.state = SessionState::Idle;
        }
    }

    /// `AcquiringFix → Tracking`. Creates the session and starts its clock.
    pub fn fix_acquired(
        &mut self,
        name: String,
        initial: &RoutePoint,
        now: Duration,
        started_at_ms: u64,
    ) -> Result<Uuid, TrackerError> {
        if self.state != SessionState::AcquiringFix {
            return Err(TrackerError::invalid(Action::Start, self.state));
        }

        let id = Uuid::new_v4();
        info!(
            "Run {} started: '{}' at ({:.6}, {:.6})",
            id, name, initial.latitude, initial.longitude
        );

        self.active = Some(ActiveSession {
            id,
            name,
            started_at_ms,
            filter: GeoFixFilter::new(self.filter_config),
            route_view: Arc::from(Vec::new()),
            distance: DistanceAccumulator::new(),
            elevation: ElevationAccumulator::new(),
            clock: TimeAccountant::start(now),
            current_speed_mps: None,
        });
        self.state = SessionState::Tracking;
        Ok(id)
    }

    /// Feeds one fix.
    ///
    /// While tracking, usable segments are measured. While paused, the fix is
    /// stored only and the result never reports a usable segment. Returns
    /// `None` when there is no session.
    pub fn on_fix(&mut self, fix: RoutePoint) -> Option<FilterResult> {
        let state = self.state;
        let active = self.active.as_mut()?;

        let mut result = active.filter.accept(fix);
        active.route_view = Arc::from(active.filter.route());

        if state == SessionState::Tracking {
            match result.segment {
                Some(segment) => active.measure(&segment),
                None => active.current_speed_mps = None,
            }
        } else {
            result.usable_for_distance = false;
            result.segment = None;
        }
        Some(result)
    }

    /// The fix stream dropped: the next fix must not bridge the gap.
    pub fn on_stream_lost(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.filter.break_segment();
            active.current_speed_mps = None;
        }
    }

    /// `Tracking → Paused`.
    pub fn pause(&mut self, now: Duration) -> Result<(), TrackerError> {
        match (self.state, self.active.as_mut()) {
            (SessionState::Tracking, Some(active)) => {
                active.clock.pause(now);
                active.current_speed_mps = None;
                self.state = SessionState::Paused;
                info!("Run {} paused", active.id);
                Ok(())
            }
            (state, _) => Err(TrackerError::invalid(Action::Pause, state)),
        }
    }

    /// `Paused → Tracking`.
    pub fn resume(&mut self, now: Duration) -> Result<(), TrackerError> {
        match (self.state, self.active.as_mut()) {
            (SessionState::Paused, Some(active)) => {
                active.clock.resume(now);
                // Movement during the pause is not measured
                active.filter.break_segment();
                self.state = SessionState::Tracking;
                info!("Run {} resumed", active.id);
                Ok(())
            }
            (state, _) => Err(TrackerError::invalid(Action::Resume, state)),
        }
    }

    /// `Tracking | Paused → Finalizing`. Consumes the session and returns
    /// the finished record (without snapshot URI).
    pub fn begin_stop(&mut self, now: Duration) -> Result<RunRecord, TrackerError> {
        if !matches!(self.state, SessionState::Tracking | SessionState::Paused) {
            return Err(TrackerError::invalid(Action::Stop, self.state));
        }
        let active = match self.active.take() {
            Some(active) => active,
            None => return Err(TrackerError::invalid(Action::Stop, self.state)),
        };

        let metrics = RunMetrics::compute(
            active.distance.total_m(),
            active.clock.active(now).as_secs_f64(),
            active.elevation.gain_m(),
            self.calories.as_ref(),
        );
        self.state = SessionState::Finalizing;

        info!(
            "Run {} finished: {:.1} m in {:.0} s ({} fixes, {} segments, {} filtered)",
            active.id,
            metrics.distance_meters,
            metrics.duration_seconds,
            active.filter.route().len(),
            active.distance.segment_count(),
            active.filter.inaccurate_count()
        );

        Ok(RunRecord {
            id: active.id,
            name: active.name,
            started_at_ms: active.started_at_ms,
            route: active.filter.into_route(),
            metrics,
            snapshot_uri: None,
        })
    }

    /// `Finalizing → Idle`.
    pub fn complete_stop(&mut self) {
        if self.state == SessionState::Finalizing {
            self.state = SessionState::Idle;
        }
    }

    /// Stops and completes in one step.
    pub fn stop(&mut self, now: Duration) -> Result<RunRecord, TrackerError> {
        let record = self.begin_stop(now)?;
        self.complete_stop();
        Ok(record)
    }

    /// Live view for UI consumers.
    pub fn snapshot(&self, now: Duration) -> LiveSnapshot {
        let active = match &self.active {
            Some(active) => active,
            None => return LiveSnapshot::empty(self.state),
        };

        let distance = active.distance.total_m();
        let elapsed = active.clock.active(now).as_secs_f64();
        let current_speed_kph = match self.state {
            SessionState::Tracking => active
                .current_speed_mps
                .map(|mps| mps * 3.6)
                .unwrap_or_else(|| avg_speed_kph(distance, elapsed)),
            _ => 0.0,
        };

        LiveSnapshot {
            run_id: Some(active.id),
            state: self.state,
            route: Arc::clone(&active.route_view),
            elapsed_seconds: elapsed,
            distance_meters: distance,
            pace_seconds_per_km: pace_seconds_per_km(distance, elapsed),
            current_speed_kph,
            elevation_gain_meters: active.elevation.gain_m(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calories::FixedRateCalories;
    use crate::geodesy::haversine_m;
    use approx::assert_relative_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn session() -> RunSession {
        RunSession::new(FilterConfig::default(), Arc::new(FixedRateCalories::default()))
    }

    fn started(t0: Duration) -> RunSession {
        let mut s = session();
        s.begin_start().unwrap();
        let initial = RoutePoint::new(0.0, 0.0, 0).with_accuracy(5.0);
        s.fix_acquired("Test Run".to_string(), &initial, t0, 1_000).unwrap();
        s
    }

    fn fix(lat: f64, lon: f64, t_ms: u64, acc: f64) -> RoutePoint {
        RoutePoint::new(lat, lon, t_ms).with_accuracy(acc)
    }

    #[test]
    fn test_three_fix_run() {
        let mut s = started(Duration::ZERO);
        s.on_fix(fix(0.0, 0.0, 1_000, 5.0));
        s.on_fix(fix(0.0001, 0.0001, 2_000, 5.0));
        s.on_fix(fix(0.0002, 0.0001, 3_000, 5.0));

        let record = s.stop(secs(3)).unwrap();
        assert_eq!(record.route.len(), 3);

        let expected = haversine_m(0.0, 0.0, 0.0001, 0.0001) + haversine_m(0.0001, 0.0001, 0.0002, 0.0001);
        assert_relative_eq!(record.metrics.distance_meters, expected, max_relative = 1e-9);
        assert_relative_eq!(record.metrics.distance_meters, 15.7 + 11.1, max_relative = 0.01);
        assert_eq!(record.name, "Test Run");
        assert_eq!(record.started_at_ms, 1_000);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.has_session());
    }

    #[test]
    fn test_pause_resume_duration() {
        let t0 = secs(500);
        let mut s = started(t0);
        s.pause(t0 + secs(30)).unwrap();
        s.resume(t0 + secs(40)).unwrap();
        let record = s.stop(t0 + secs(50)).unwrap();
        assert_relative_eq!(record.metrics.duration_seconds, 40.0);
    }

    #[test]
    fn test_inaccurate_fix_stored_but_not_measured() {
        let mut s = started(Duration::ZERO);
        s.on_fix(fix(0.0, 0.0, 1_000, 5.0).with_altitude(10.0));
        let r = s.on_fix(fix(0.001, 0.0, 2_000, 50.0).with_altitude(30.0)).unwrap();
        assert!(r.stored);
        assert!(!r.usable_for_distance);

        let snap = s.snapshot(secs(2));
        assert_eq!(snap.route.len(), 2);
        assert_eq!(snap.distance_meters, 0.0);
        assert_eq!(snap.elevation_gain_meters, 0.0);
    }

    #[test]
    fn test_fixes_while_paused_are_stored_not_measured() {
        let mut s = started(Duration::ZERO);
        s.on_fix(fix(0.0, 0.0, 1_000, 5.0).with_altitude(100.0));
        s.pause(secs(2)).unwrap();

        let r = s.on_fix(fix(0.001, 0.0, 3_000, 5.0).with_altitude(120.0)).unwrap();
        assert!(r.stored);
        assert!(!r.usable_for_distance);
        assert!(r.segment.is_none());
        let snap = s.snapshot(secs(3));
        assert_eq!(snap.distance_meters, 0.0);
        assert_eq!(snap.elevation_gain_meters, 0.0);

        s.resume(secs(4)).unwrap();
        // First fix after resume only re-anchors, the climb during the pause is lost
        let r = s.on_fix(fix(0.002, 0.0, 5_000, 5.0).with_altitude(130.0)).unwrap();
        assert!(!r.usable_for_distance);
        let snap = s.snapshot(secs(5));
        assert_eq!(snap.distance_meters, 0.0);
        assert_eq!(snap.elevation_gain_meters, 0.0);

        let r = s.on_fix(fix(0.003, 0.0, 6_000, 5.0).with_altitude(133.0)).unwrap();
        assert!(r.usable_for_distance);
        let snap = s.snapshot(secs(6));
        assert_relative_eq!(snap.distance_meters, haversine_m(0.002, 0.0, 0.003, 0.0));
        assert_relative_eq!(snap.elevation_gain_meters, 3.0, epsilon = 1e-9);
        assert_eq!(snap.route.len(), 4);
    }

    #[test]
    fn test_ticks_share_the_published_route() {
        let mut s = started(Duration::ZERO);
        s.on_fix(fix(0.0, 0.0, 1_000, 5.0));
        s.on_fix(fix(0.0001, 0.0, 2_000, 5.0));

        let first = s.snapshot(secs(2));
        let second = s.snapshot(secs(3));
        assert!(Arc::ptr_eq(&first.route, &second.route));

        s.on_fix(fix(0.0002, 0.0, 3_000, 5.0));
        let third = s.snapshot(secs(3));
        assert!(!Arc::ptr_eq(&first.route, &third.route));
        assert_eq!(first.route.len(), 2);
        assert_eq!(third.route.len(), 3);
    }

    #[test]
    fn test_invalid_transitions_from_idle() {
        let mut s = session();
        assert!(matches!(
            s.pause(secs(1)),
            Err(TrackerError::InvalidTransition { action: Action::Pause, state: SessionState::Idle })
        ));
        assert!(matches!(
            s.stop(secs(1)),
            Err(TrackerError::InvalidTransition { action: Action::Stop, state: SessionState::Idle })
        ));
        assert!(matches!(
            s.resume(secs(1)),
            Err(TrackerError::InvalidTransition { action: Action::Resume, .. })
        ));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.has_session());
        assert!(s.on_fix(fix(0.0, 0.0, 0, 5.0)).is_none());
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let mut s = started(Duration::ZERO);
        assert!(s.resume(secs(1)).is_err());
        assert_eq!(s.state(), SessionState::Tracking);

        s.pause(secs(2)).unwrap();
        assert!(s.pause(secs(3)).is_err());
        assert_eq!(s.state(), SessionState::Paused);

        assert!(s.begin_start().is_err());
        assert_eq!(s.state(), SessionState::Paused);
    }

    #[test]
    fn test_stop_from_paused() {
        let mut s = started(Duration::ZERO);
        s.pause(secs(10)).unwrap();
        let record = s.stop(secs(100)).unwrap();
        assert_relative_eq!(record.metrics.duration_seconds, 10.0);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_aborted_start_creates_no_session() {
        let mut s = session();
        s.begin_start().unwrap();
        assert_eq!(s.state(), SessionState::AcquiringFix);
        s.abort_start();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.has_session());
        assert!(s.snapshot(secs(1)).run_id.is_none());
    }

    #[test]
    fn test_finalizing_rejects_second_stop() {
        let mut s = started(Duration::ZERO);
        s.begin_stop(secs(1)).unwrap();
        assert_eq!(s.state(), SessionState::Finalizing);
        assert!(s.begin_stop(secs(2)).is_err());
        s.complete_stop();
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn test_zero_distance_snapshot_has_no_nan() {
        let s = started(Duration::ZERO);
        let snap = s.snapshot(secs(30));
        assert_eq!(snap.pace_seconds_per_km, 0.0);
        assert_eq!(snap.current_speed_kph, 0.0);
        assert_relative_eq!(snap.elapsed_seconds, 30.0);

        let at_start = s.snapshot(Duration::ZERO);
        assert_eq!(at_start.pace_seconds_per_km, 0.0);
    }

    #[test]
    fn test_current_speed_prefers_reported_speed() {
        let mut s = started(Duration::ZERO);
        s.on_fix(fix(0.0, 0.0, 1_000, 5.0));
        s.on_fix(fix(0.0001, 0.0, 2_000, 5.0).with_speed(3.0));
        assert_relative_eq!(s.snapshot(secs(2)).current_speed_kph, 10.8, max_relative = 1e-9);

        // Without a reported speed the segment speed is used
        s.on_fix(fix(0.0002, 0.0, 3_000, 5.0));
        let seg = haversine_m(0.0001, 0.0, 0.0002, 0.0);
        assert_relative_eq!(s.snapshot(secs(3)).current_speed_kph, seg * 3.6, max_relative = 1e-9);

        s.pause(secs(3)).unwrap();
        assert_eq!(s.snapshot(secs(4)).current_speed_kph, 0.0);
    }

    #[test]
    fn test_calorie_strategy_is_pluggable() {
        let mut s = RunSession::new(FilterConfig::default(), Arc::new(|d: f64| d));
        s.begin_start().unwrap();
        s.fix_acquired(String::new(), &RoutePoint::new(0.0, 0.0, 0), Duration::ZERO, 0)
            .unwrap();
        s.on_fix(fix(0.0, 0.0, 0, 5.0));
        s.on_fix(fix(0.001, 0.0, 1_000, 5.0));
        let record = s.stop(secs(1)).unwrap();
        assert_relative_eq!(record.metrics.calories_kcal, record.metrics.distance_meters);
    }
}
