//! RunTrack Deterministic Simulation Harness
//!
//! This crate provides a controlled environment where the run-tracking
//! engine is driven by a simulated runner and a simulated GPS receiver.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the harness steps it
//! - **Location**: Fixes come from a ground-truth path plus seeded noise
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seeded RNG streams)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼──────────┐   fixes    ┌────────────┐                │
//! │  │  RouteOracle  │───────────►│ RunSession │──► RunRecord   │
//! │  │ (truth + GPS) │            └────────────┘                │
//! │  └───────────────┘                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use runtrack_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(600.0)
//!     .run(ScenarioId::GpsDropout);
//! assert!(result.passed);
//! ```

use runtrack_core::{StoreError, TrackerError};
use thiserror::Error;

mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::RunExport;
pub use oracle::{AltitudeProfile, GpsSample, OracleConfig, RouteOracle, Window};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};

/// Errors raised by the harness itself.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Scenario setup failed: {0}")]
    Scenario(String),

    #[error("Engine error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
