//! Active-time accounting across pause/resume cycles.
//!
//! All durations are derived by subtraction from a monotonic clock reading
//! supplied by the caller:
//!
//! ```text
//! active(now) = (now - started_at) - paused_accumulated - (now - pause_started_at if paused)
//! ```
//!
//! Nothing is counted up per tick, so a session that runs for hours reports
//! exactly the clock's elapsed time regardless of how often it is queried.

use std::time::Duration;

/// Tracks active vs. paused intervals of one session.
#[derive(Debug, Clone)]
pub struct TimeAccountant {
    started_at: Duration,
    paused_accumulated: Duration,
    current_pause_started_at: Option<Duration>,
}

impl TimeAccountant {
    /// Starts the clock at `now`.
    pub fn start(now: Duration) -> Self {
        Self {
            started_at: now,
            paused_accumulated: Duration::ZERO,
            current_pause_started_at: None,
        }
    }

    /// Opens a pause interval. Returns false if already paused.
    pub fn pause(&mut self, now: Duration) -> bool {
        if self.current_pause_started_at.is_some() {
            return false;
        }
        self.current_pause_started_at = Some(now.max(self.started_at));
        true
    }

    /// Closes the open pause interval. Returns false if not paused.
    pub fn resume(&mut self, now: Duration) -> bool {
        match self.current_pause_started_at.take() {
            Some(pause_start) => {
                self.paused_accumulated += now.saturating_sub(pause_start);
                true
            }
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.current_pause_started_at.is_some()
    }

    /// Total paused time up to `now`, including an open pause.
    pub fn paused(&self, now: Duration) -> Duration {
        let open = self
            .current_pause_started_at
            .map(|p| now.saturating_sub(p))
            .unwrap_or(Duration::ZERO);
        self.paused_accumulated + open
    }

    /// Active (non-paused) time up to `now`.
    pub fn active(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started_at)
            .saturating_sub(self.paused(now))
    }
}

/// Pace in seconds per kilometer; 0 when distance or duration is 0.
pub fn pace_seconds_per_km(distance_m: f64, duration_s: f64) -> f64 {
    if !(distance_m > 0.0) || !(duration_s > 0.0) {
        return 0.0;
    }
    let pace = duration_s / (distance_m / 1000.0);
    if pace.is_finite() {
        pace
    } else {
        0.0
    }
}

/// Average speed in km/h; 0 when distance or duration is 0.
pub fn avg_speed_kph(distance_m: f64, duration_s: f64) -> f64 {
    if !(distance_m > 0.0) || !(duration_s > 0.0) {
        return 0.0;
    }
    let speed = (distance_m / 1000.0) / (duration_s / 3600.0);
    if speed.is_finite() {
        speed
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_pause_interval_is_excluded() {
        let t0 = secs(100);
        let mut clock = TimeAccountant::start(t0);
        assert!(clock.pause(t0 + secs(30)));
        assert!(clock.resume(t0 + secs(40)));
        assert_eq!(clock.active(t0 + secs(50)), secs(40));
        assert_eq!(clock.paused(t0 + secs(50)), secs(10));
    }

    #[test]
    fn test_open_pause_freezes_active_time() {
        let mut clock = TimeAccountant::start(Duration::ZERO);
        clock.pause(secs(10));
        assert_eq!(clock.active(secs(10)), secs(10));
        assert_eq!(clock.active(secs(25)), secs(10));
        assert_eq!(clock.paused(secs(25)), secs(15));
    }

    #[test]
    fn test_multiple_pauses_accumulate() {
        let mut clock = TimeAccountant::start(Duration::ZERO);
        clock.pause(secs(10));
        clock.resume(secs(15));
        clock.pause(secs(20));
        clock.resume(secs(30));
        assert_eq!(clock.active(secs(40)), secs(25));
    }

    #[test]
    fn test_double_pause_and_stray_resume_are_rejected() {
        let mut clock = TimeAccountant::start(Duration::ZERO);
        assert!(!clock.resume(secs(1)));
        assert!(clock.pause(secs(2)));
        assert!(!clock.pause(secs(3)));
        assert!(clock.is_paused());
    }

    #[test]
    fn test_clock_before_start_never_underflows() {
        let clock = TimeAccountant::start(secs(50));
        assert_eq!(clock.active(secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_pace_and_speed() {
        // 5 km in 25 minutes
        assert_relative_eq!(pace_seconds_per_km(5000.0, 1500.0), 300.0);
        assert_relative_eq!(avg_speed_kph(5000.0, 1500.0), 12.0);
    }

    #[test]
    fn test_zero_guards() {
        assert_eq!(pace_seconds_per_km(0.0, 120.0), 0.0);
        assert_eq!(pace_seconds_per_km(1000.0, 0.0), 0.0);
        assert_eq!(avg_speed_kph(0.0, 120.0), 0.0);
        assert_eq!(avg_speed_kph(1000.0, 0.0), 0.0);
        assert_eq!(pace_seconds_per_km(f64::NAN, 10.0), 0.0);
        assert!(pace_seconds_per_km(1e-300, 1e300).is_finite());
    }
}
