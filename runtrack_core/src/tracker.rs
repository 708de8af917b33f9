//! Tracker Runtime - runs the session state machine behind an actor.
//!
//! This module is the integration layer between the synchronous engine
//! (filter, accumulators, time accountant, session) and the environment
//! abstraction (`TrackerContext`, `Geolocation`, `RouteCapture`).
//!
//! # Architecture
//!
//! ```text
//!   RunTracker (handle, Clone)          ticker task          Geolocation
//!        │ commands                        │ ticks              │ FixEvent
//!        ▼                                 ▼                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         TrackerActor (one task)                      │
//! │  select! { fix events, ticks, commands }  ──►  RunSession            │
//! │                                    │                                 │
//! │                                    └──► watch::Sender<LiveSnapshot>  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both asynchronous sources and every caller command are serialized through
//! the one task, so distance and duration are always read together.
//!
//! # Usage
//!
//! ```ignore
//! use runtrack_core::tracker::{RunTracker, TrackerConfig};
//! use runtrack_env::TokioContext;
//!
//! let tracker = RunTracker::builder(TokioContext::shared(), geolocation)
//!     .config(TrackerConfig::default())
//!     .spawn();
//!
//! tracker.start(Some("Evening Run".into())).await?;
//! // ...
//! let record = tracker.stop().await?;
//! ```

use runtrack_env::{
    FixEvent, Geolocation, NoCapture, RouteCapture, RoutePoint, SubscriptionHandle,
    TrackerContext, WatchOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::calories::{CalorieEstimator, FixedRateCalories};
use crate::error::TrackerError;
use crate::geofix::FilterConfig;
use crate::record::RunRecord;
use crate::session::{LiveSnapshot, RunSession};
use crate::store::{MemoryRunStore, RunStore};

/// Configuration for the run tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Name given to runs started without one (default: "Run")
    pub default_name: String,

    /// GeoFix accuracy threshold in meters (default: 20)
    pub accuracy_threshold_m: f64,

    /// Period of the duration/pace refresh tick (default: 1000 ms)
    pub tick_interval_ms: u64,

    /// Options forwarded to the platform fix stream
    pub watch: WatchOptions,

    /// Command mailbox depth (default: 32)
    pub mailbox_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_name: "Run".to_string(),
            accuracy_threshold_m: 20.0,
            tick_interval_ms: 1000,
            watch: WatchOptions::default(),
            mailbox_capacity: 32,
        }
    }
}

impl TrackerConfig {
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            accuracy_threshold_m: self.accuracy_threshold_m,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

enum Command {
    Start {
        name: Option<String>,
        reply: oneshot::Sender<Result<Uuid, TrackerError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), TrackerError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), TrackerError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<RunRecord, TrackerError>>,
    },
}

/// Handle to a running tracker.
///
/// Cheap to clone. The tracker task exits once every handle is dropped,
/// releasing any open subscription.
#[derive(Clone)]
pub struct RunTracker {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<LiveSnapshot>,
    store: Arc<dyn RunStore>,
}

impl RunTracker {
    /// Starts configuring a tracker on the given context and location provider.
    pub fn builder<Ctx: TrackerContext>(
        context: Arc<Ctx>,
        geolocation: Arc<dyn Geolocation>,
    ) -> TrackerBuilder<Ctx> {
        TrackerBuilder {
            context,
            geolocation,
            capture: Arc::new(NoCapture),
            store: Arc::new(MemoryRunStore::new()),
            calories: Arc::new(FixedRateCalories::default()),
            config: TrackerConfig::default(),
        }
    }

    /// Requests permission and an initial fix, then begins tracking.
    pub async fn start(&self, name: Option<String>) -> Result<Uuid, TrackerError> {
        self.request(|reply| Command::Start { name, reply }).await
    }

    pub async fn pause(&self) -> Result<(), TrackerError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), TrackerError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Finalizes the run, stores it and returns the record.
    pub async fn stop(&self) -> Result<RunRecord, TrackerError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Most recently published live snapshot.
    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every snapshot refresh (fix, tick, transition).
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.snapshots.clone()
    }

    pub fn save_run(&self, record: &RunRecord) -> Result<(), TrackerError> {
        Ok(self.store.save(record)?)
    }

    pub fn get_run(&self, id: &Uuid) -> Result<Option<RunRecord>, TrackerError> {
        Ok(self.store.get(id)?)
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>, TrackerError> {
        Ok(self.store.list()?)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, TrackerError>>) -> Command,
    ) -> Result<T, TrackerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| TrackerError::TrackerClosed)?;
        response.await.map_err(|_| TrackerError::TrackerClosed)?
    }
}

/// Builder for [`RunTracker`].
pub struct TrackerBuilder<Ctx: TrackerContext> {
    context: Arc<Ctx>,
    geolocation: Arc<dyn Geolocation>,
    capture: Arc<dyn RouteCapture>,
    store: Arc<dyn RunStore>,
    calories: Arc<dyn CalorieEstimator>,
    config: TrackerConfig,
}

impl<Ctx: TrackerContext> TrackerBuilder<Ctx> {
    pub fn capture(mut self, capture: Arc<dyn RouteCapture>) -> Self {
        self.capture = capture;
        self
    }

    pub fn store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    pub fn calories(mut self, calories: Arc<dyn CalorieEstimator>) -> Self {
        self.calories = calories;
        self
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the tracker task on the context and returns its handle.
    pub fn spawn(self) -> RunTracker {
        let (commands_tx, commands_rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let (snapshots_tx, snapshots_rx) = watch::channel(LiveSnapshot::idle());

        let actor = TrackerActor {
            session: RunSession::new(self.config.filter(), self.calories),
            context: Arc::clone(&self.context),
            geolocation: self.geolocation,
            capture: self.capture,
            store: Arc::clone(&self.store),
            config: self.config,
            commands: commands_rx,
            snapshots: snapshots_tx,
            resources: None,
        };
        self.context.spawn("run-tracker", actor.run());

        RunTracker {
            commands: commands_tx,
            snapshots: snapshots_rx,
            store: self.store,
        }
    }
}

/// Everything that must be released when a session ends.
///
/// Dropping this cancels the fix subscription and stops the ticker, so every
/// exit path (stop, failed start, tracker shutdown) releases both.
struct SessionResources {
    subscription: Option<SubscriptionHandle>,
    fixes: Option<mpsc::UnboundedReceiver<FixEvent>>,
    ticks: Option<mpsc::Receiver<()>>,
}

struct TrackerActor<Ctx: TrackerContext> {
    session: RunSession,
    context: Arc<Ctx>,
    geolocation: Arc<dyn Geolocation>,
    capture: Arc<dyn RouteCapture>,
    store: Arc<dyn RunStore>,
    config: TrackerConfig,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<LiveSnapshot>,
    resources: Option<SessionResources>,
}

impl<Ctx: TrackerContext> TrackerActor<Ctx> {
    async fn run(mut self) {
        debug!("Tracker task started");
        loop {
            let (fixes, ticks) = match self.resources.as_mut() {
                Some(r) => (r.fixes.as_mut(), r.ticks.as_mut()),
                None => (None, None),
            };

            // Fixes first: a stop issued after a fix was delivered sees it
            tokio::select! {
                biased;
                event = recv_fix(fixes) => self.handle_fix_event(event),
                tick = recv_tick(ticks) => self.handle_tick(tick),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        // All handles gone; release anything still open
        self.resources = None;
        debug!("Tracker task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { name, reply } => {
                let result = self.start(name).await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.session.pause(self.context.now());
                self.publish();
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.session.resume(self.context.now());
                self.publish();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let result = self.stop().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn start(&mut self, name: Option<String>) -> Result<Uuid, TrackerError> {
        self.session.begin_start()?;
        self.publish();

        let initial = match acquire(self.geolocation.as_ref()).await {
            Ok(fix) => fix,
            Err(e) => {
                warn!("Start aborted: {}", e);
                self.session.abort_start();
                self.publish();
                return Err(e);
            }
        };

        let (sink, fixes) = mpsc::unbounded_channel();
        let subscription = match self.geolocation.watch_fixes(self.config.watch, sink) {
            Ok(handle) => Some(handle),
            Err(e) => {
                let failure = TrackerError::SubscriptionFailure(e.to_string());
                warn!("{}; tracking time without fixes", failure);
                None
            }
        };

        let resources = SessionResources {
            fixes: subscription.as_ref().map(|_| fixes),
            subscription,
            ticks: Some(spawn_ticker(&self.context, self.config.tick_interval())),
        };

        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.config.default_name.clone());
        let id = self.session.fix_acquired(
            name,
            &initial,
            self.context.now(),
            self.context.epoch_millis(),
        )?;

        self.resources = Some(resources);
        self.publish();
        Ok(id)
    }

    async fn stop(&mut self) -> Result<RunRecord, TrackerError> {
        let mut record = self.session.begin_stop(self.context.now())?;

        // Release the stream and ticker before anything else can fail
        self.resources = None;
        self.publish();

        record.snapshot_uri = match self.capture.capture(&record.route).await {
            Ok(uri) if !uri.is_empty() => Some(uri),
            Ok(_) => None,
            Err(e) => {
                warn!("{}", TrackerError::CaptureFailure(e.to_string()));
                None
            }
        };

        // Store backends write to disk; keep that off the runtime threads
        let store = Arc::clone(&self.store);
        let stored = record.clone();
        match tokio::task::spawn_blocking(move || store.save(&stored)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to store run {}: {}", record.id, e),
            Err(e) => error!("Store task for run {} failed: {}", record.id, e),
        }

        self.session.complete_stop();
        self.publish();
        info!("Run {} stored", record.id);
        Ok(record)
    }

    fn handle_fix_event(&mut self, event: Option<FixEvent>) {
        match event {
            Some(FixEvent::Fix(fix)) => {
                if self.session.on_fix(fix).is_some() {
                    self.publish();
                }
            }
            Some(FixEvent::Lost(reason)) => {
                warn!("{}", TrackerError::SubscriptionFailure(reason));
                self.session.on_stream_lost();
            }
            None => {
                warn!(
                    "{}",
                    TrackerError::SubscriptionFailure("fix stream closed".to_string())
                );
                self.session.on_stream_lost();
                if let Some(resources) = self.resources.as_mut() {
                    resources.fixes = None;
                }
            }
        }
    }

    fn handle_tick(&mut self, tick: Option<()>) {
        match tick {
            Some(()) => {
                if self.session.has_session() {
                    self.publish();
                }
            }
            None => {
                if let Some(resources) = self.resources.as_mut() {
                    resources.ticks = None;
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot(self.context.now());
        self.snapshots.send_replace(snapshot);
    }
}

/// Permission, then the initial fix.
async fn acquire(geolocation: &dyn Geolocation) -> Result<RoutePoint, TrackerError> {
    if !geolocation.request_permission().await {
        return Err(TrackerError::PermissionDenied);
    }
    geolocation
        .current_fix()
        .await
        .map_err(|e| TrackerError::FixUnavailable(e.to_string()))
}

/// Next fix event, or never when there is no subscription.
async fn recv_fix(rx: Option<&mut mpsc::UnboundedReceiver<FixEvent>>) -> Option<FixEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Next tick, or never when no ticker runs.
async fn recv_tick(rx: Option<&mut mpsc::Receiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Spawns the 1 s refresh clock. It stops as soon as the receiver is gone.
fn spawn_ticker<Ctx: TrackerContext>(context: &Arc<Ctx>, period: Duration) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    let clock = Arc::clone(context);
    context.spawn("run-ticker", async move {
        loop {
            tokio::select! {
                _ = clock.sleep(period) => match tx.try_send(()) {
                    // A pending tick already covers this one
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                },
                _ = tx.closed() => break,
            }
        }
    });
    rx
}
