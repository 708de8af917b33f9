//! Scenario runner - drives the run session against the ground-truth oracle.

use crate::context::SimContext;
use crate::oracle::{AltitudeProfile, OracleConfig, RouteOracle, Window};
use crate::scenarios::ScenarioId;
use crate::SimError;

use runtrack_core::geodesy::distance_between;
use runtrack_core::{FixedRateCalories, RunRecord, RunSession, TrackerConfig};
use runtrack_env::{RoutePoint, TrackerContext};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// The finished run, if the session got that far
    pub record: Option<RunRecord>,

    /// True positions of every stored fix
    pub truth_route: Vec<RoutePoint>,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            record: None,
            truth_route: Vec::new(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Fixes handed to the session
    pub fixes_delivered: u64,

    /// Delivered fixes at or above the accuracy threshold
    pub fixes_inaccurate: u64,

    /// Ticks without a delivered fix (dropout or lost stream)
    pub fixes_missing: u64,

    /// Path actually covered while the session was tracking
    pub truth_distance_m: f64,

    /// True length of the segments the engine is allowed to measure
    pub expected_distance_m: f64,
    pub measured_distance_m: f64,

    pub expected_elevation_gain_m: f64,
    pub measured_elevation_gain_m: f64,

    pub expected_duration_secs: f64,
    pub measured_duration_secs: f64,
}

impl ScenarioMetrics {
    /// Relative error of the measured distance.
    pub fn distance_error(&self) -> f64 {
        if self.expected_distance_m <= 0.0 {
            return 0.0;
        }
        (self.measured_distance_m - self.expected_distance_m).abs() / self.expected_distance_m
    }
}

/// Shape of one scenario.
struct Plan {
    oracle: OracleConfig,

    /// Session paused (and runner standing) inside this window
    pause: Option<Window>,

    /// Fix stream lost inside this window
    stream_loss: Option<Window>,

    /// Allowed relative distance error
    distance_tolerance: f64,
}

/// Raw outcome of driving a plan.
struct Drive {
    metrics: ScenarioMetrics,
    record: RunRecord,
    truth_route: Vec<RoutePoint>,
    total_ticks: u64,
    final_time_secs: f64,
}

/// Runs simulated scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Engine configuration under test
    config: TrackerConfig,

    /// Run length in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: TrackerConfig::default(),
            max_duration_secs: 300.0,
        }
    }

    /// Sets the run length.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the engine configuration.
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={}) - {}",
            scenario.name(),
            self.seed,
            scenario.description()
        );

        let plan = self.plan(scenario);
        match self.drive(&plan) {
            Ok(drive) => self.evaluate(scenario, &plan, drive),
            Err(e) => ScenarioResult::aborted(scenario, self.seed, e.to_string()),
        }
    }

    fn plan(&self, scenario: ScenarioId) -> Plan {
        let d = self.max_duration_secs;
        // Windows on whole seconds so fix ticks land on their edges
        let at = |fraction: f64| (d * fraction).round();

        let base = Plan {
            oracle: OracleConfig::default(),
            pause: None,
            stream_loss: None,
            distance_tolerance: 0.05,
        };

        match scenario {
            ScenarioId::SteadyRun => Plan {
                oracle: OracleConfig {
                    turn_rate_deg_per_sec: 0.5,
                    ..OracleConfig::default()
                },
                ..base
            },
            ScenarioId::HillRepeats => Plan {
                oracle: OracleConfig {
                    altitude: AltitudeProfile::Hills {
                        amplitude_m: 10.0,
                        period_secs: 60.0,
                    },
                    ..OracleConfig::default()
                },
                ..base
            },
            ScenarioId::GpsDropout => Plan {
                oracle: OracleConfig {
                    degraded: vec![Window::new(at(0.3), at(0.45))],
                    dropouts: vec![Window::new(at(0.6), at(0.7))],
                    ..OracleConfig::default()
                },
                ..base
            },
            ScenarioId::PauseResume => Plan {
                pause: Some(Window::new(at(1.0 / 3.0), at(2.0 / 3.0))),
                ..base
            },
            ScenarioId::SignalLoss => Plan {
                stream_loss: Some(Window::new(at(0.4), at(0.6))),
                ..base
            },
        }
    }

    fn drive(&self, plan: &Plan) -> Result<Drive, SimError> {
        let context = SimContext::new(self.seed);
        let mut oracle = RouteOracle::new(
            plan.oracle.clone(),
            context.derive_rng(1),
            context.epoch_millis(),
        )?;
        let mut session = RunSession::new(
            self.config.filter(),
            Arc::new(FixedRateCalories::default()),
        );
        let threshold = self.config.accuracy_threshold_m;

        session.begin_start()?;
        let initial = oracle
            .sample()
            .ok_or_else(|| SimError::Scenario("no initial fix at t=0".to_string()))?;
        session.fix_acquired(
            self.config.default_name.clone(),
            &initial.reported,
            context.now(),
            context.epoch_millis(),
        )?;

        let dt = self.config.watch.min_interval_ms.max(1) as f64 / 1000.0;
        let target_ticks = (self.max_duration_secs / dt).round() as u64;

        let mut metrics = ScenarioMetrics::default();
        let mut truth_route = Vec::new();
        // True position of the filter's anchor and whether it was accurate
        let mut anchor: Option<(RoutePoint, bool)> = None;
        let mut paused = false;
        let mut stream_up = true;
        let mut paused_secs = 0.0;

        for tick in 0..target_ticks {
            let t = oracle.time();

            let want_pause = plan.pause.is_some_and(|w| w.contains(t));
            if want_pause && !paused {
                session.pause(context.now())?;
                oracle.set_moving(false);
                paused = true;
            } else if !want_pause && paused {
                session.resume(context.now())?;
                oracle.set_moving(true);
                paused = false;
                anchor = None;
            }

            let want_loss = plan.stream_loss.is_some_and(|w| w.contains(t));
            if want_loss && stream_up {
                debug!("  t={:.0}s | fix stream lost", t);
                session.on_stream_lost();
                stream_up = false;
                anchor = None;
            } else if !want_loss && !stream_up {
                debug!("  t={:.0}s | fix stream back", t);
                stream_up = true;
            }

            let before = oracle.distance_m();
            oracle.step(dt);
            context.advance_time(Duration::from_secs_f64(dt));
            if paused {
                paused_secs += dt;
            } else {
                metrics.truth_distance_m += oracle.distance_m() - before;
            }

            let sample = match oracle.sample() {
                Some(sample) if stream_up => sample,
                _ => {
                    metrics.fixes_missing += 1;
                    continue;
                }
            };

            metrics.fixes_delivered += 1;
            let accurate = sample.reported.is_accurate(threshold);
            if !accurate {
                metrics.fixes_inaccurate += 1;
            }

            let stored = session.on_fix(sample.reported).is_some_and(|r| r.stored);
            if stored {
                if let (false, Some((prev, true)), true) = (paused, anchor, accurate) {
                    metrics.expected_distance_m += distance_between(&prev, &sample.truth);
                    let climb = sample.truth.altitude.unwrap_or(0.0) - prev.altitude.unwrap_or(0.0);
                    metrics.expected_elevation_gain_m += climb.max(0.0);
                }
                anchor = Some((sample.truth, accurate));
                truth_route.push(sample.truth);
            }

            if tick % 60 == 0 {
                let snapshot = session.snapshot(context.now());
                debug!(
                    "  t={:.0}s | {} | {:.1} m | fixes={}",
                    oracle.time(),
                    snapshot.state,
                    snapshot.distance_meters,
                    snapshot.route.len()
                );
            }
        }

        let record = session.stop(context.now())?;
        metrics.measured_distance_m = record.metrics.distance_meters;
        metrics.measured_elevation_gain_m = record.metrics.elevation_gain_meters;
        metrics.measured_duration_secs = record.metrics.duration_seconds;
        metrics.expected_duration_secs = oracle.time() - paused_secs;

        Ok(Drive {
            metrics,
            record,
            truth_route,
            total_ticks: target_ticks,
            final_time_secs: oracle.time(),
        })
    }

    fn evaluate(&self, scenario: ScenarioId, plan: &Plan, drive: Drive) -> ScenarioResult {
        let m = &drive.metrics;
        let mut failures = Vec::new();

        if (m.measured_duration_secs - m.expected_duration_secs).abs() > 1e-6 {
            failures.push(format!(
                "duration {:.3}s != expected {:.3}s",
                m.measured_duration_secs, m.expected_duration_secs
            ));
        }

        if m.distance_error() > plan.distance_tolerance {
            failures.push(format!(
                "distance {:.1}m off expected {:.1}m by {:.1}% (max {:.1}%)",
                m.measured_distance_m,
                m.expected_distance_m,
                m.distance_error() * 100.0,
                plan.distance_tolerance * 100.0
            ));
        }

        if drive.record.route.len() != drive.truth_route.len() {
            failures.push(format!(
                "route has {} fixes, {} were stored",
                drive.record.route.len(),
                drive.truth_route.len()
            ));
        }

        match scenario {
            ScenarioId::SteadyRun => {}
            ScenarioId::HillRepeats => {
                let gain_error = if m.expected_elevation_gain_m > 0.0 {
                    (m.measured_elevation_gain_m - m.expected_elevation_gain_m).abs()
                        / m.expected_elevation_gain_m
                } else {
                    1.0
                };
                if gain_error > 0.01 {
                    failures.push(format!(
                        "elevation gain {:.1}m vs expected {:.1}m",
                        m.measured_elevation_gain_m, m.expected_elevation_gain_m
                    ));
                }
            }
            ScenarioId::GpsDropout => {
                if m.fixes_inaccurate == 0 || m.fixes_missing == 0 {
                    failures.push("degraded or dropout window produced no effect".to_string());
                }
                if m.measured_distance_m >= m.truth_distance_m {
                    failures.push("inaccurate fixes were measured".to_string());
                }
            }
            ScenarioId::PauseResume => {
                if let Some(pause) = plan.pause {
                    let expected = drive.final_time_secs - pause.length_secs();
                    if (m.measured_duration_secs - expected).abs() > 1e-6 {
                        failures.push(format!(
                            "paused time counted: {:.1}s active, expected {:.1}s",
                            m.measured_duration_secs, expected
                        ));
                    }
                }
            }
            ScenarioId::SignalLoss => {
                if let Some(loss) = plan.stream_loss {
                    let gap_m = loss.length_secs() * plan.oracle.speed_mps;
                    if m.measured_distance_m > m.truth_distance_m - 0.5 * gap_m {
                        failures.push(format!(
                            "gap bridged: measured {:.1}m of {:.1}m with a {:.0}m gap",
                            m.measured_distance_m, m.truth_distance_m, gap_m
                        ));
                    }
                }
            }
        }

        let passed = failures.is_empty();
        info!(
            "{} complete: {:.1} m measured / {:.1} m expected ({:.2}% error), {} fixes, {} inaccurate",
            scenario.name(),
            m.measured_distance_m,
            m.expected_distance_m,
            m.distance_error() * 100.0,
            m.fixes_delivered,
            m.fixes_inaccurate
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: drive.total_ticks,
            final_time_secs: drive.final_time_secs,
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics: drive.metrics,
            record: Some(drive.record),
            truth_route: drive.truth_route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(scenario: ScenarioId) -> ScenarioResult {
        ScenarioRunner::new(42).with_duration(120.0).run(scenario)
    }

    #[test]
    fn test_steady_run_scenario() {
        let result = run(ScenarioId::SteadyRun);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 120);
        assert_eq!(result.metrics.fixes_delivered, 120);
        assert_eq!(result.record.unwrap().route.len(), 120);
    }

    #[test]
    fn test_hill_repeats_scenario() {
        let result = run(ScenarioId::HillRepeats);

        assert!(result.passed, "{:?}", result.failure_reason);
        // Two full 10 m hills
        assert!(result.metrics.measured_elevation_gain_m > 35.0);
    }

    #[test]
    fn test_gps_dropout_scenario() {
        let result = run(ScenarioId::GpsDropout);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.fixes_missing, 12);
        assert_eq!(result.metrics.fixes_inaccurate, 18);
    }

    #[test]
    fn test_pause_resume_scenario() {
        let result = run(ScenarioId::PauseResume);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!((result.metrics.measured_duration_secs - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_signal_loss_scenario() {
        let result = run(ScenarioId::SignalLoss);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.fixes_missing, 24);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let a = run(ScenarioId::GpsDropout);
        let b = run(ScenarioId::GpsDropout);
        assert_eq!(a.record.unwrap().route, b.record.unwrap().route);
        assert_eq!(a.metrics.measured_distance_m, b.metrics.measured_distance_m);
    }

    #[test]
    fn test_threshold_from_config() {
        let config = TrackerConfig {
            accuracy_threshold_m: 50.0,
            ..TrackerConfig::default()
        };
        let result = ScenarioRunner::new(42)
            .with_duration(120.0)
            .with_config(config)
            .run(ScenarioId::GpsDropout);

        assert_eq!(result.metrics.fixes_inaccurate, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_steady_run_passes_for_any_seed(seed in any::<u64>()) {
            let result = ScenarioRunner::new(seed).with_duration(300.0).run(ScenarioId::SteadyRun);
            prop_assert!(result.passed, "{:?}", result.failure_reason);
        }
    }
}
