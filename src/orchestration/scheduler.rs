//! Periodic refresh of the account snapshot.
//!
//! Each refresh runs fetch -> compute and, on success, swaps the new
//! [`Snapshot`] into a `watch` channel in one step. Readers only ever see a
//! complete snapshot. A failed refresh leaves the previous one in place; a
//! failed mark fetch only degrades the new snapshot.

use crate::config::Config;
use crate::datasource::DataSource;
use crate::domain::TimeMs;
use crate::engine::ComputationError;
use crate::orchestration::ingest::{FetchError, Ingestor};
use crate::orchestration::pipeline::{priced_markets, Pipeline, Snapshot};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Fetching,
    Computing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub state: RefreshState,
    /// Generation of the latest refresh started.
    pub generation: u64,
    /// Generation of the published snapshot, if any.
    pub snapshot_generation: Option<u64>,
    pub last_success_at: Option<TimeMs>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: RefreshState::Idle,
            generation: 0,
            snapshot_generation: None,
            last_success_at: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("computation failed: {0}")]
    Computation(#[from] ComputationError),
    #[error("refresh {generation} superseded by {latest}")]
    Superseded { generation: u64, latest: u64 },
}

/// Read handle to the latest snapshot and scheduler status.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    snapshot: watch::Receiver<Option<Arc<Snapshot>>>,
    status: watch::Receiver<SchedulerStatus>,
}

impl SnapshotReader {
    /// The latest Ready snapshot, if one has been published.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// Wait until a snapshot newer than `generation` is published.
    ///
    /// Returns `None` if the scheduler has been dropped.
    pub async fn wait_newer_than(&mut self, generation: u64) -> Option<Arc<Snapshot>> {
        loop {
            if let Some(snapshot) = self.snapshot.borrow_and_update().clone() {
                if snapshot.generation > generation {
                    return Some(snapshot);
                }
            }
            if self.snapshot.changed().await.is_err() {
                return None;
            }
        }
    }
}

/// Requests an immediate refresh from a running scheduler.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    pub fn trigger(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug)]
pub struct RefreshScheduler {
    ingestor: Ingestor,
    pipeline: Pipeline,
    interval: Duration,
    generation: AtomicU64,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    status_tx: watch::Sender<SchedulerStatus>,
    trigger: Arc<Notify>,
}

impl RefreshScheduler {
    pub fn new(ingestor: Ingestor, pipeline: Pipeline, interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(SchedulerStatus::default());
        Self {
            ingestor,
            pipeline,
            interval,
            generation: AtomicU64::new(0),
            snapshot_tx,
            status_tx,
            trigger: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(config: &Config, datasource: Arc<dyn DataSource>) -> Self {
        Self::new(
            Ingestor::new(
                datasource,
                config.wallet_address.clone(),
                config.page_size,
                config.max_pages,
            ),
            Pipeline::from_config(config),
            config.refresh_interval(),
        )
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            snapshot: self.snapshot_tx.subscribe(),
            status: self.status_tx.subscribe(),
        }
    }

    pub fn trigger(&self) -> RefreshTrigger {
        RefreshTrigger {
            notify: self.trigger.clone(),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_tx.borrow().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, generation: u64, state: RefreshState) {
        if self.is_current(generation) {
            self.status_tx.send_modify(|status| status.state = state);
        }
    }

    /// Run one fetch -> compute -> publish cycle.
    ///
    /// On failure the published snapshot is left untouched. A refresh
    /// overtaken by a newer one discards its result.
    pub async fn refresh_once(&self) -> Result<Arc<Snapshot>, RefreshError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status_tx.send_modify(|status| {
            status.generation = generation;
            status.state = RefreshState::Fetching;
        });
        info!("Refresh {} started", generation);

        let result = self.build_snapshot(generation).await;

        if !self.is_current(generation) {
            let latest = self.generation.load(Ordering::SeqCst);
            warn!("Discarding refresh {}, superseded by {}", generation, latest);
            return Err(RefreshError::Superseded { generation, latest });
        }

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.snapshot_tx.send_replace(Some(snapshot.clone()));
                self.status_tx.send_modify(|status| {
                    status.state = RefreshState::Ready;
                    status.snapshot_generation = Some(generation);
                    status.last_success_at = Some(snapshot.computed_at);
                    status.last_error = None;
                    status.consecutive_failures = 0;
                });
                info!(
                    "Refresh {} ready: {} trades, {} open positions",
                    generation, snapshot.trade_count, snapshot.summary.open_positions
                );
                Ok(snapshot)
            }
            Err(err) => {
                match &err {
                    RefreshError::Computation(e) => {
                        error!("Refresh {} failed to compute: {}", generation, e)
                    }
                    other => warn!("Refresh {} failed: {}", generation, other),
                }
                let message = err.to_string();
                self.status_tx.send_modify(|status| {
                    status.state = RefreshState::Failed;
                    status.last_error = Some(message);
                    status.consecutive_failures += 1;
                });
                Err(err)
            }
        }
    }

    async fn build_snapshot(&self, generation: u64) -> Result<Snapshot, RefreshError> {
        let history = self.ingestor.fetch_history().await?;
        let batch = self.pipeline.normalize(&history.pages);
        let (marks, mark_fetch_error) = match self
            .ingestor
            .fetch_marks(&priced_markets(&batch.trades))
            .await
        {
            Ok(marks) => (marks, None),
            Err(err) => {
                warn!("Refresh {} valuing without marks: {}", generation, err);
                (Vec::new(), Some(err.to_string()))
            }
        };

        self.set_state(generation, RefreshState::Computing);
        let mut snapshot = self
            .pipeline
            .compute(batch, marks, generation, TimeMs::now())?;
        snapshot.history_truncated = history.truncated;
        snapshot.mark_fetch_error = mark_fetch_error;
        Ok(snapshot)
    }

    /// Refresh on every interval tick and manual trigger until `shutdown`
    /// resolves. The first tick fires immediately.
    ///
    /// A tick or trigger arriving while a refresh is in flight abandons it
    /// and starts a new one.
    pub async fn run(self: Arc<Self>, shutdown: impl Future<Output = ()> + Send) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut in_flight: Option<BoxFuture<'_, Result<Arc<Snapshot>, RefreshError>>> = None;
        info!("Refresh scheduler started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Refresh scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        warn!("Tick while refresh in flight, abandoning it");
                    }
                    in_flight = Some(self.refresh_once().boxed());
                }
                _ = self.trigger.notified() => {
                    if in_flight.is_some() {
                        warn!("Manual refresh while refresh in flight, abandoning it");
                    }
                    in_flight = Some(self.refresh_once().boxed());
                }
                _ = poll_in_flight(&mut in_flight) => {
                    in_flight = None;
                }
            }
        }
    }

    pub fn spawn(
        self: Arc<Self>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Resolve with the in-flight refresh, or never if there is none.
async fn poll_in_flight<T>(in_flight: &mut Option<BoxFuture<'_, T>>) -> T {
    match in_flight.as_mut() {
        Some(refresh) => refresh.await,
        None => std::future::pending().await,
    }
}
