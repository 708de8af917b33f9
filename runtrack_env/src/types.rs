//! Common types shared between the engine and its collaborators.

use serde::{Deserialize, Serialize};

/// A single location fix as delivered by the platform provider.
///
/// Coordinates are WGS84 degrees. `timestamp_ms` is wall-clock milliseconds
/// since the Unix epoch as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Instantaneous speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Horizontal uncertainty radius in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl RoutePoint {
    /// Creates a fix with only coordinates and a timestamp.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp_ms,
            altitude: None,
            speed: None,
            accuracy: None,
        }
    }

    /// Sets the horizontal accuracy.
    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy = Some(accuracy_m);
        self
    }

    /// Sets the altitude.
    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude = Some(altitude_m);
        self
    }

    /// Sets the instantaneous speed.
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed = Some(speed_mps);
        self
    }

    /// True when the accuracy is known and strictly below `threshold_m`.
    pub fn is_accurate(&self, threshold_m: f64) -> bool {
        matches!(self.accuracy, Some(acc) if acc.is_finite() && acc < threshold_m)
    }
}

/// Options forwarded to the platform fix stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Minimum time between delivered fixes
    pub min_interval_ms: u64,

    /// Minimum movement between delivered fixes
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            min_distance_meters: 1.0,
        }
    }
}

/// An event on the fix stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FixEvent {
    /// A new location reading
    Fix(RoutePoint),

    /// The provider reported that the stream dropped
    Lost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_threshold_is_strict() {
        let p = RoutePoint::new(0.0, 0.0, 0).with_accuracy(20.0);
        assert!(!p.is_accurate(20.0));
        assert!(p.with_accuracy(19.9).is_accurate(20.0));
        assert!(!RoutePoint::new(0.0, 0.0, 0).is_accurate(20.0));
    }
}
