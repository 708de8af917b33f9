//! Route snapshot capture collaborator.

use async_trait::async_trait;

use crate::error::EnvError;
use crate::types::RoutePoint;

/// Renders a finished route into an image and returns where it was stored.
///
/// The engine hands the route over opaquely. An empty URI or an error means
/// no snapshot; neither is fatal to the run.
#[async_trait]
pub trait RouteCapture: Send + Sync + 'static {
    async fn capture(&self, route: &[RoutePoint]) -> Result<String, EnvError>;
}

/// Capture that never produces a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapture;

#[async_trait]
impl RouteCapture for NoCapture {
    async fn capture(&self, _route: &[RoutePoint]) -> Result<String, EnvError> {
        Ok(String::new())
    }
}
