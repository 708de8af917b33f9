//! Finalized run records and their metrics.

use geo::{BoundingRect, MultiPoint, Rect};
use runtrack_env::RoutePoint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calories::CalorieEstimator;
use crate::geodesy::to_geo_point;
use crate::time_accountant::{avg_speed_kph, pace_seconds_per_km};

/// Derived metrics of a run at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub distance_meters: f64,
    /// Active time only, paused intervals excluded
    pub duration_seconds: f64,
    pub pace_seconds_per_km: f64,
    pub calories_kcal: f64,
    pub elevation_gain_meters: f64,
    pub avg_speed_kph: f64,
}

impl RunMetrics {
    /// Derives pace, speed and calories from the raw accumulators.
    pub fn compute(
        distance_meters: f64,
        duration_seconds: f64,
        elevation_gain_meters: f64,
        calories: &dyn CalorieEstimator,
    ) -> Self {
        Self {
            distance_meters,
            duration_seconds,
            pace_seconds_per_km: pace_seconds_per_km(distance_meters, duration_seconds),
            calories_kcal: calories.estimate(distance_meters),
            elevation_gain_meters,
            avg_speed_kph: avg_speed_kph(distance_meters, duration_seconds),
        }
    }

    /// Pace formatted as `m:ss /km`, or `--:-- /km` with no distance.
    pub fn pace_label(&self) -> String {
        if self.pace_seconds_per_km <= 0.0 {
            return "--:-- /km".to_string();
        }
        let total = self.pace_seconds_per_km.round() as u64;
        format!("{}:{:02} /km", total / 60, total % 60)
    }
}

/// Immutable result of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: Uuid,
    pub name: String,
    /// Start of the run, epoch milliseconds
    #[serde(rename = "date")]
    pub started_at_ms: u64,
    pub route: Vec<RoutePoint>,
    pub metrics: RunMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_uri: Option<String>,
}

impl RunRecord {
    /// Geographic bounds of the route (x = longitude, y = latitude).
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let points: MultiPoint<f64> = self.route.iter().map(to_geo_point).collect();
        points.bounding_rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calories::FixedRateCalories;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics_compute() {
        let m = RunMetrics::compute(5000.0, 1500.0, 42.0, &FixedRateCalories::default());
        assert_relative_eq!(m.pace_seconds_per_km, 300.0);
        assert_relative_eq!(m.avg_speed_kph, 12.0);
        assert_eq!(m.calories_kcal, 310.0);
        assert_eq!(m.elevation_gain_meters, 42.0);
        assert_eq!(m.pace_label(), "5:00 /km");
    }

    #[test]
    fn test_zero_distance_metrics() {
        let m = RunMetrics::compute(0.0, 600.0, 0.0, &FixedRateCalories::default());
        assert_eq!(m.pace_seconds_per_km, 0.0);
        assert_eq!(m.avg_speed_kph, 0.0);
        assert_eq!(m.pace_label(), "--:-- /km");
    }

    #[test]
    fn test_record_json_shape() {
        let record = RunRecord {
            id: Uuid::new_v4(),
            name: "Morning Run".to_string(),
            started_at_ms: 1_700_000_000_000,
            route: vec![RoutePoint::new(1.0, 2.0, 1_700_000_000_000).with_accuracy(4.0)],
            metrics: RunMetrics::default(),
            snapshot_uri: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], 1_700_000_000_000u64);
        assert_eq!(json["route"][0]["timestamp"], 1_700_000_000_000u64);
        assert_eq!(json["route"][0]["accuracy"], 4.0);
        assert!(json["route"][0].get("altitude").is_none());
        assert!(json["metrics"].get("paceSecondsPerKm").is_some());
        assert!(json["metrics"].get("elevationGainMeters").is_some());
        assert!(json.get("snapshotUri").is_none());

        let back: RunRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_bounding_rect() {
        let record = RunRecord {
            id: Uuid::new_v4(),
            name: String::new(),
            started_at_ms: 0,
            route: vec![
                RoutePoint::new(10.0, 20.0, 0),
                RoutePoint::new(11.0, 19.5, 1),
                RoutePoint::new(10.5, 21.0, 2),
            ],
            metrics: RunMetrics::default(),
            snapshot_uri: None,
        };
        let rect = record.bounding_rect().unwrap();
        assert_eq!(rect.min().x, 19.5);
        assert_eq!(rect.max().x, 21.0);
        assert_eq!(rect.min().y, 10.0);
        assert_eq!(rect.max().y, 11.0);

        let empty = RunRecord { route: vec![], ..record };
        assert!(empty.bounding_rect().is_none());
    }
}
