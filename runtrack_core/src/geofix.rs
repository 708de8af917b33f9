//! GeoFix filter: stores every incoming fix and decides which consecutive
//! pairs are trustworthy enough to measure.
//!
//! A segment is usable only when both of its endpoints report an accuracy
//! strictly below the configured threshold. Low-quality fixes are kept in the
//! route for playback; they simply never anchor a measured segment.

use runtrack_env::RoutePoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for the GeoFix filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Accuracy radius a fix must stay strictly below (default: 20 m)
    pub accuracy_threshold_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            accuracy_threshold_m: 20.0,
        }
    }
}

/// A pair of consecutive stored fixes, both accurate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: RoutePoint,
    pub to: RoutePoint,
}

/// Outcome of offering one fix to the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterResult {
    /// The fix was appended to the route
    pub stored: bool,

    /// The fix closes a segment usable for distance/elevation
    pub usable_for_distance: bool,

    /// The usable segment, when there is one
    pub segment: Option<Segment>,
}

/// Accuracy-based fix filter owning the session route.
#[derive(Debug, Clone)]
pub struct GeoFixFilter {
    config: FilterConfig,

    /// Every stored fix, in arrival order
    route: Vec<RoutePoint>,

    /// Fix that the next segment would start from
    anchor: Option<RoutePoint>,

    /// Stored fixes that failed the accuracy or coordinate test
    inaccurate: usize,
}

impl GeoFixFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            route: Vec::new(),
            anchor: None,
            inaccurate: 0,
        }
    }

    /// Offers a fix. Every fix is stored.
    ///
    /// Fixes with non-finite or out-of-range coordinates are stored like
    /// inaccurate ones: kept in the route, never measured.
    pub fn accept(&mut self, fix: RoutePoint) -> FilterResult {
        self.route.push(fix);

        let threshold = self.config.accuracy_threshold_m;
        let valid = has_valid_coordinates(&fix);
        if !valid {
            warn!(
                "Fix with invalid coordinates ({}, {}) stored without measuring",
                fix.latitude, fix.longitude
            );
        }

        let usable = valid && fix.is_accurate(threshold);
        if !usable {
            self.inaccurate += 1;
            debug!(
                "Fix accuracy {:?} not below {} m; stored without measuring",
                fix.accuracy, threshold
            );
        }

        let segment = match self.anchor.replace(fix) {
            Some(prev) if usable && is_usable(&prev, threshold) => Some(Segment {
                from: prev,
                to: fix,
            }),
            _ => None,
        };

        FilterResult {
            stored: true,
            usable_for_distance: segment.is_some(),
            segment,
        }
    }

    /// Forgets the segment anchor so the next fix cannot close a segment.
    ///
    /// Called when measuring resumes after a gap (pause, stream loss).
    pub fn break_segment(&mut self) {
        self.anchor = None;
    }

    pub fn route(&self) -> &[RoutePoint] {
        &self.route
    }

    pub fn into_route(self) -> Vec<RoutePoint> {
        self.route
    }

    /// Number of stored fixes never usable for measuring.
    pub fn inaccurate_count(&self) -> usize {
        self.inaccurate
    }
}

fn has_valid_coordinates(fix: &RoutePoint) -> bool {
    fix.latitude.is_finite()
        && fix.longitude.is_finite()
        && (-90.0..=90.0).contains(&fix.latitude)
        && (-180.0..=180.0).contains(&fix.longitude)
}

fn is_usable(fix: &RoutePoint, threshold_m: f64) -> bool {
    has_valid_coordinates(fix) && fix.is_accurate(threshold_m)
}
