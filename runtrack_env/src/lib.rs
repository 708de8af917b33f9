//! RunTrack Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the run-tracking
//! engine run against a real platform and against a deterministic harness.
//!
//! # Intercepted Sources
//!
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Location (`request_permission()`, `current_fix()`, `watch_fixes()`)
//! - Route snapshot capture (`capture()`)
//!
//! # Example
//!
//! ```ignore
//! use runtrack_env::{FixEvent, TrackerContext};
//! use tokio::sync::mpsc::UnboundedReceiver;
//!
//! async fn pump<Ctx: TrackerContext>(ctx: &Ctx, fixes: &mut UnboundedReceiver<FixEvent>) {
//!     loop {
//!         tokio::select! {
//!             event = fixes.recv() => handle_fix(event),
//!             _ = ctx.sleep(Duration::from_secs(1)) => tick(),
//!         }
//!     }
//! }
//! ```

mod capture;
mod context;
mod error;
mod geolocation;
mod scripted;
mod tokio_impl;
mod types;

pub use capture::{NoCapture, RouteCapture};
pub use context::TrackerContext;
pub use error::EnvError;
pub use geolocation::{FixSink, Geolocation, SubscriptionHandle};
pub use scripted::{FixInjector, ScriptedCapture, ScriptedGeolocation};
pub use tokio_impl::TokioContext;
pub use types::{FixEvent, RoutePoint, WatchOptions};
