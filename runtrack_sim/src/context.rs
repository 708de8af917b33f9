//! Simulation context implementing TrackerContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use runtrack_env::TrackerContext;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::trace;

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `TrackerContext` using:
/// - A virtual clock that can be advanced manually
/// - Seeded ChaCha8 streams for GPS noise
/// - Sleeps that resolve only once the harness advances the clock past
///   their deadline
///
/// Only `advance_time` moves the clock, so tasks that sleep in a loop (the
/// tracker's ticker) follow the harness instead of racing ahead of it.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start); sleepers
    /// subscribe to it
    virtual_time_ns: Arc<watch::Sender<u64>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(watch::Sender::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Advances virtual time by the given duration, waking every sleeper
    /// whose deadline has passed.
    pub fn advance_time(&self, duration: Duration) {
        let step = duration.as_nanos() as u64;
        self.virtual_time_ns
            .send_modify(|now| *now = now.saturating_add(step));
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.borrow()
    }

    /// Independent RNG stream for one source of randomness.
    ///
    /// Separate streams keep, for example, horizontal and altitude noise
    /// stable when the other one changes.
    pub fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl TrackerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        let mut clock = self.virtual_time_ns.subscribe();
        let deadline = (*clock.borrow_and_update()).saturating_add(duration.as_nanos() as u64);
        // The sender lives in `self`, so the wait only ends at the deadline
        let _ = clock.wait_for(|&now| now >= deadline).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        tokio::spawn(async move {
            future.await;
            trace!("sim task {} finished", name);
        });
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
