//! RunTrack Core - GPS run-tracking engine
//!
//! Turns a stream of noisy location fixes into a recorded run:
//! 1. **Fix filtering**: accuracy gating and route recording (`geofix`)
//! 2. **Accumulation**: Haversine distance, positive elevation gain, active time
//! 3. **Lifecycle**: the `RunSession` state machine, driven by the `RunTracker` actor
//! 4. **History**: finalized `RunRecord`s in a `RunStore` (memory or sled)

pub mod calories;
pub mod elevation;
pub mod error;
pub mod geodesy;
pub mod geofix;
pub mod record;
pub mod session;
pub mod store;
pub mod time_accountant;
pub mod tracker;

// Re-export key types for convenience
pub use calories::{CalorieEstimator, FixedRateCalories};
pub use error::{Action, StoreError, TrackerError};
pub use geofix::{FilterConfig, FilterResult, GeoFixFilter};
pub use record::{RunMetrics, RunRecord};
pub use session::{LiveSnapshot, RunSession, SessionState};
pub use store::{MemoryRunStore, RunStore, SledRunStore};
pub use tracker::{RunTracker, TrackerBuilder, TrackerConfig};
