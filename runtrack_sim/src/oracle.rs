//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of a simulated run:
//! - True position, altitude and speed of the runner
//! - Kinematics (constant speed along a slowly turning heading)
//! - GPS fix generation (with noise, degraded accuracy and dropouts)

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use runtrack_core::geodesy::EARTH_RADIUS_M;
use runtrack_env::RoutePoint;
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Altitude of the runner over time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AltitudeProfile {
    Flat,
    /// Sinusoidal climbs and descents
    Hills { amplitude_m: f64, period_secs: f64 },
}

impl AltitudeProfile {
    fn offset_at(&self, t_secs: f64) -> f64 {
        match *self {
            AltitudeProfile::Flat => 0.0,
            AltitudeProfile::Hills {
                amplitude_m,
                period_secs,
            } => amplitude_m * (std::f64::consts::TAU * t_secs / period_secs.max(1.0)).sin(),
        }
    }
}

/// Half-open time window `[start, end)` in simulation seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Window {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    pub fn contains(&self, t_secs: f64) -> bool {
        t_secs >= self.start_secs && t_secs < self.end_secs
    }

    pub fn length_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// Oracle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub base_altitude_m: f64,

    /// Running speed (default: 3 m/s, a 5:33 /km pace)
    pub speed_mps: f64,
    pub heading_deg: f64,
    pub turn_rate_deg_per_sec: f64,

    /// Steady-state std-dev of the horizontal position error
    pub noise_std_m: f64,

    /// Per-fix correlation of the position error, in `[0, 1)` (0 = white noise)
    pub noise_correlation: f64,

    /// Reported accuracy outside degraded windows
    pub accuracy_m: f64,
    pub degraded_accuracy_m: f64,

    pub altitude: AltitudeProfile,

    /// Windows where fixes arrive with `degraded_accuracy_m`
    pub degraded: Vec<Window>,

    /// Windows where the receiver produces no fixes at all
    pub dropouts: Vec<Window>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            origin_lat: 47.3769,
            origin_lon: 8.5417,
            base_altitude_m: 408.0,
            speed_mps: 3.0,
            heading_deg: 45.0,
            turn_rate_deg_per_sec: 0.0,
            noise_std_m: 2.0,
            noise_correlation: 0.98,
            accuracy_m: 5.0,
            degraded_accuracy_m: 45.0,
            altitude: AltitudeProfile::Flat,
            degraded: Vec::new(),
            dropouts: Vec::new(),
        }
    }
}

/// One generated fix together with the true position it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsSample {
    pub reported: RoutePoint,
    pub truth: RoutePoint,
}

/// The Oracle - maintains ground truth and generates GPS fixes.
pub struct RouteOracle {
    config: OracleConfig,

    /// RNG for GPS noise
    rng: ChaCha8Rng,

    /// Initial error distribution
    initial_noise: Normal<f64>,

    /// Per-step innovation of the correlated error
    innovation: Normal<f64>,

    /// Wall-clock time of simulation start (epoch ms)
    epoch_ms: u64,

    /// Current simulation time (seconds)
    time_secs: f64,

    /// Position in the local tangent plane (meters from origin)
    east_m: f64,
    north_m: f64,
    heading_deg: f64,

    moving: bool,

    /// Distance actually covered
    distance_m: f64,

    /// Current horizontal GPS error
    error_east_m: f64,
    error_north_m: f64,
}

impl RouteOracle {
    /// Creates an oracle drawing noise from the given RNG stream.
    pub fn new(config: OracleConfig, rng: ChaCha8Rng, epoch_ms: u64) -> Result<Self, SimError> {
        if !(config.noise_std_m.is_finite() && config.noise_std_m >= 0.0) {
            return Err(SimError::Config(format!(
                "noise_std_m must be a non-negative number, got {}",
                config.noise_std_m
            )));
        }
        let rho = config.noise_correlation;
        if !(0.0..1.0).contains(&rho) {
            return Err(SimError::Config(format!(
                "noise_correlation must be in [0, 1), got {}",
                rho
            )));
        }

        let initial_noise = Normal::new(0.0, config.noise_std_m)
            .map_err(|e| SimError::Config(format!("noise_std_m: {}", e)))?;
        let innovation = Normal::new(0.0, config.noise_std_m * (1.0 - rho * rho).sqrt())
            .map_err(|e| SimError::Config(format!("noise_std_m: {}", e)))?;

        let mut oracle = Self {
            heading_deg: config.heading_deg,
            config,
            rng,
            initial_noise,
            innovation,
            epoch_ms,
            time_secs: 0.0,
            east_m: 0.0,
            north_m: 0.0,
            moving: true,
            distance_m: 0.0,
            error_east_m: 0.0,
            error_north_m: 0.0,
        };
        oracle.error_east_m = oracle.initial_noise.sample(&mut oracle.rng);
        oracle.error_north_m = oracle.initial_noise.sample(&mut oracle.rng);
        Ok(oracle)
    }

    /// Runner stops (or starts) moving, e.g. during a pause.
    pub fn set_moving(&mut self, moving: bool) {
        self.moving = moving;
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        if self.moving {
            self.heading_deg += self.config.turn_rate_deg_per_sec * dt;
            let heading = self.heading_deg.to_radians();
            let step_m = self.config.speed_mps * dt;
            self.east_m += step_m * heading.sin();
            self.north_m += step_m * heading.cos();
            self.distance_m += step_m;
        }
        self.time_secs += dt;

        let rho = self.config.noise_correlation;
        self.error_east_m = rho * self.error_east_m + self.innovation.sample(&mut self.rng);
        self.error_north_m = rho * self.error_north_m + self.innovation.sample(&mut self.rng);
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.time_secs
    }

    /// Distance covered since the start.
    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn in_degraded(&self) -> bool {
        self.config.degraded.iter().any(|w| w.contains(self.time_secs))
    }

    pub fn in_dropout(&self) -> bool {
        self.config.dropouts.iter().any(|w| w.contains(self.time_secs))
    }

    /// True position now, without noise.
    pub fn truth(&self) -> RoutePoint {
        self.point_at(self.east_m, self.north_m)
            .with_altitude(self.altitude())
            .with_speed(self.current_speed())
    }

    /// Generates the fix the receiver reports now, if any.
    pub fn sample(&mut self) -> Option<GpsSample> {
        if self.in_dropout() {
            return None;
        }

        let accuracy = if self.in_degraded() {
            self.config.degraded_accuracy_m
        } else {
            self.config.accuracy_m
        };

        let reported = self
            .point_at(
                self.east_m + self.error_east_m,
                self.north_m + self.error_north_m,
            )
            .with_altitude(self.altitude())
            .with_speed(self.current_speed())
            .with_accuracy(accuracy);

        Some(GpsSample {
            reported,
            truth: self.truth(),
        })
    }

    fn altitude(&self) -> f64 {
        self.config.base_altitude_m + self.config.altitude.offset_at(self.time_secs)
    }

    fn current_speed(&self) -> f64 {
        if self.moving {
            self.config.speed_mps
        } else {
            0.0
        }
    }

    /// Equirectangular projection around the origin.
    fn point_at(&self, east_m: f64, north_m: f64) -> RoutePoint {
        let lat0 = self.config.origin_lat.to_radians();
        let latitude = self.config.origin_lat + (north_m / EARTH_RADIUS_M).to_degrees();
        let longitude = self.config.origin_lon + (east_m / (EARTH_RADIUS_M * lat0.cos())).to_degrees();
        let timestamp_ms = self.epoch_ms + (self.time_secs * 1000.0).round() as u64;
        RoutePoint::new(latitude, longitude, timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use runtrack_core::geodesy::distance_between;

    fn oracle(config: OracleConfig, seed: u64) -> RouteOracle {
        RouteOracle::new(config, ChaCha8Rng::seed_from_u64(seed), 0).unwrap()
    }

    #[test]
    fn test_oracle_kinematics() {
        let mut oracle = oracle(OracleConfig::default(), 42);
        let start = oracle.truth();

        for _ in 0..10 {
            oracle.step(1.0);
        }

        assert!((oracle.distance_m() - 30.0).abs() < 1e-9);
        let moved = distance_between(&start, &oracle.truth());
        assert!((moved - 30.0).abs() < 0.05, "moved {}", moved);
        assert_eq!(oracle.truth().timestamp_ms, 10_000);
    }

    #[test]
    fn test_oracle_standing_still() {
        let mut oracle = oracle(OracleConfig::default(), 42);
        oracle.set_moving(false);
        oracle.step(5.0);
        assert_eq!(oracle.distance_m(), 0.0);
        assert_eq!(oracle.truth().speed, Some(0.0));
    }

    #[test]
    fn test_oracle_deterministic_noise() {
        let mut oracle1 = oracle(OracleConfig::default(), 42);
        let mut oracle2 = oracle(OracleConfig::default(), 42);

        for _ in 0..5 {
            oracle1.step(1.0);
            oracle2.step(1.0);
        }

        // Same seed = same noise
        assert_eq!(oracle1.sample(), oracle2.sample());
    }

    #[test]
    fn test_oracle_windows() {
        let config = OracleConfig {
            degraded: vec![Window::new(2.0, 4.0)],
            dropouts: vec![Window::new(5.0, 6.0)],
            ..OracleConfig::default()
        };
        let mut oracle = oracle(config, 1);

        oracle.step(1.0);
        assert_eq!(oracle.sample().unwrap().reported.accuracy, Some(5.0));
        oracle.step(2.0);
        assert_eq!(oracle.sample().unwrap().reported.accuracy, Some(45.0));
        oracle.step(2.0);
        assert!(oracle.sample().is_none());
        oracle.step(1.0);
        assert!(oracle.sample().is_some());
    }

    #[test]
    fn test_hill_profile() {
        let config = OracleConfig {
            base_altitude_m: 100.0,
            altitude: AltitudeProfile::Hills {
                amplitude_m: 10.0,
                period_secs: 40.0,
            },
            ..OracleConfig::default()
        };
        let mut oracle = oracle(config, 3);
        oracle.step(10.0);
        let altitude = oracle.truth().altitude.unwrap();
        assert!((altitude - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_noise_rejected() {
        let config = OracleConfig {
            noise_std_m: -1.0,
            ..OracleConfig::default()
        };
        assert!(matches!(
            RouteOracle::new(config, ChaCha8Rng::seed_from_u64(0), 0),
            Err(SimError::Config(_))
        ));

        let config = OracleConfig {
            noise_std_m: f64::NAN,
            ..OracleConfig::default()
        };
        assert!(RouteOracle::new(config, ChaCha8Rng::seed_from_u64(0), 0).is_err());
    }

    #[test]
    fn test_correlation_out_of_range_rejected() {
        for rho in [-0.1, 1.0, 1.5, f64::NAN] {
            let config = OracleConfig {
                noise_correlation: rho,
                ..OracleConfig::default()
            };
            assert!(
                matches!(
                    RouteOracle::new(config, ChaCha8Rng::seed_from_u64(0), 0),
                    Err(SimError::Config(_))
                ),
                "rho = {}",
                rho
            );
        }

        let white = OracleConfig {
            noise_std_m: 0.0,
            noise_correlation: 0.0,
            ..OracleConfig::default()
        };
        assert!(RouteOracle::new(white, ChaCha8Rng::seed_from_u64(0), 0).is_ok());
    }
}
