//! Energy expenditure estimation.
//!
//! The session only depends on [`CalorieEstimator`]; the default
//! [`FixedRateCalories`] is a flat per-kilometer placeholder, not a
//! physiological model. Any closure `Fn(f64) -> f64` also works.

/// Strategy producing kcal from distance in meters.
pub trait CalorieEstimator: Send + Sync {
    fn estimate(&self, distance_meters: f64) -> f64;
}

/// Default flat rate (kcal per km)
pub const DEFAULT_KCAL_PER_KM: f64 = 62.0;

/// `round(km × kcal_per_km)`
#[derive(Debug, Clone, Copy)]
pub struct FixedRateCalories {
    pub kcal_per_km: f64,
}

impl Default for FixedRateCalories {
    fn default() -> Self {
        Self {
            kcal_per_km: DEFAULT_KCAL_PER_KM,
        }
    }
}

impl CalorieEstimator for FixedRateCalories {
    fn estimate(&self, distance_meters: f64) -> f64 {
        if !(distance_meters > 0.0) {
            return 0.0;
        }
        (distance_meters / 1000.0 * self.kcal_per_km).round()
    }
}

impl<F> CalorieEstimator for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn estimate(&self, distance_meters: f64) -> f64 {
        self(distance_meters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rate() {
        let model = FixedRateCalories::default();
        assert_eq!(model.estimate(10_000.0), 620.0);
        assert_eq!(model.estimate(1_234.0), 77.0); // 76.508 rounds up
        assert_eq!(model.estimate(0.0), 0.0);
    }

    #[test]
    fn test_closure_strategy() {
        let per_meter = |d: f64| d / 10.0;
        let model: &dyn CalorieEstimator = &per_meter;
        assert_eq!(model.estimate(500.0), 50.0);
    }
}
