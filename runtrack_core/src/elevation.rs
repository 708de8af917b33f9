//! Cumulative ascent over usable segments.

use crate::geofix::Segment;

/// Sums positive altitude deltas. Descents and segments with a missing
/// altitude on either end contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct ElevationAccumulator {
    gain_m: f64,
}

impl ElevationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a segment and returns the ascent it contributed.
    pub fn add_segment(&mut self, segment: &Segment) -> f64 {
        let delta = match (segment.from.altitude, segment.to.altitude) {
            (Some(a), Some(b)) => b - a,
            _ => return 0.0,
        };
        if delta > 0.0 && delta.is_finite() {
            self.gain_m += delta;
            delta
        } else {
            0.0
        }
    }

    pub fn gain_m(&self) -> f64 {
        self.gain_m
    }
}
