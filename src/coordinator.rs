use crate::error::FetchError;
use crate::meter_client::SnapshotSource;
use crate::metric::MetricSnapshot;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// No refresh has been attempted yet.
    Idle,
    Refreshing,
    /// The last refresh succeeded.
    Ready,
    /// The last refresh failed; an older snapshot is still held.
    Degraded,
    /// Every refresh so far has failed.
    FailedNeverSucceeded,
}

/// Everything readers can observe about the coordinator.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStatus {
    pub snapshot: Option<Arc<MetricSnapshot>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<FetchError>,
    pub last_update_success: bool,
    pub refreshing: bool,
    pub completed_refreshes: u64,
}

impl CoordinatorStatus {
    pub fn phase(&self) -> CoordinatorPhase {
        if self.refreshing {
            CoordinatorPhase::Refreshing
        } else if self.completed_refreshes == 0 {
            CoordinatorPhase::Idle
        } else if self.last_update_success {
            CoordinatorPhase::Ready
        } else if self.snapshot.is_some() {
            CoordinatorPhase::Degraded
        } else {
            CoordinatorPhase::FailedNeverSucceeded
        }
    }

    /// A stale snapshot is reported as unavailable.
    pub fn is_available(&self) -> bool {
        self.last_update_success
    }
}

/// Owns the single poll cycle for one meter and the cached result it produces.
///
/// Reads are synchronous and only clone an `Arc` to the current snapshot.
/// Refreshes are de-duplicated: a request that arrives while a fetch is in
/// flight is satisfied by that fetch instead of issuing a second one.
pub struct PollCoordinator {
    name: String,
    source: Box<dyn SnapshotSource>,
    status: watch::Sender<CoordinatorStatus>,
    refresh_gate: Mutex<()>,
    completed: AtomicU64,
    closed: AtomicBool,
}

impl PollCoordinator {
    pub fn new(name: impl Into<String>, source: impl SnapshotSource + 'static) -> Self {
        let (status, _) = watch::channel(CoordinatorStatus::default());
        Self {
            name: name.into(),
            source: Box::new(source),
            status,
            refresh_gate: Mutex::new(()),
            completed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetches a new snapshot unless a fetch already in flight can answer for us.
    ///
    /// Never fails; the outcome is recorded in the coordinator status.
    pub async fn request_refresh(&self) {
        let seen = self.completed.load(Ordering::SeqCst);
        let _gate = self.refresh_gate.lock().await;

        if self.is_closed() {
            debug!(coordinator = %self.name, "refresh skipped, coordinator closed");
            return;
        }
        if self.completed.load(Ordering::SeqCst) != seen {
            debug!(coordinator = %self.name, "refresh coalesced with in-flight request");
            return;
        }

        let _refreshing = RefreshingFlag::set(&self.status);
        let result = self.source.fetch().await;
        if self.is_closed() {
            debug!(coordinator = %self.name, "discarding refresh result, coordinator closed");
            return;
        }
        self.record(result);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record(&self, result: Result<MetricSnapshot, FetchError>) {
        let previous = self.status.borrow().clone();
        match result {
            Ok(snapshot) => {
                if previous.completed_refreshes > 0 && !previous.last_update_success {
                    info!(coordinator = %self.name, "meter reachable again");
                }
                debug!(
                    coordinator = %self.name,
                    metrics = snapshot.len(),
                    "refresh succeeded"
                );
                let snapshot = Arc::new(snapshot);
                self.status.send_modify(|status| {
                    status.snapshot = Some(snapshot);
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                    status.last_update_success = true;
                    status.completed_refreshes += 1;
                });
            }
            Err(e) => {
                if previous.snapshot.is_none() {
                    error!(coordinator = %self.name, "failed to fetch data: {e}");
                } else {
                    warn!(
                        coordinator = %self.name,
                        "failed to fetch data, keeping previous snapshot: {e}"
                    );
                }
                self.status.send_modify(|status| {
                    status.last_error = Some(e);
                    status.last_update_success = false;
                    status.completed_refreshes += 1;
                });
            }
        }
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status.borrow().clone()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        self.status.borrow().phase()
    }

    /// The current snapshot, if any, and whether it is from the latest attempt.
    pub fn read_snapshot(&self) -> (Option<Arc<MetricSnapshot>>, bool) {
        let status = self.status.borrow();
        (status.snapshot.clone(), status.is_available())
    }

    pub fn last_error(&self) -> Option<FetchError> {
        self.status.borrow().last_error.clone()
    }

    pub fn is_available(&self) -> bool {
        self.status.borrow().is_available()
    }

    /// Receives a notification on every status change.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status.subscribe()
    }

    /// Stops all future refreshes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Starts the periodic refresh task. The first tick fires one full period
    /// from now, as setup is expected to have refreshed already.
    pub fn spawn_polling(self: &Arc<Self>, period: Duration) -> PollHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let coordinator = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(
                coordinator = %coordinator.name,
                interval_secs = period.as_secs(),
                "starting poll timer"
            );
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = coordinator.request_refresh() => {}
                }
            }

            info!(coordinator = %coordinator.name, "poll timer stopped");
        });

        PollHandle {
            coordinator: Arc::clone(self),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Marks the status as refreshing for as long as it lives, so an abandoned
/// refresh can't leave the flag stuck.
struct RefreshingFlag<'a> {
    status: &'a watch::Sender<CoordinatorStatus>,
}

impl<'a> RefreshingFlag<'a> {
    fn set(status: &'a watch::Sender<CoordinatorStatus>) -> Self {
        status.send_modify(|status| status.refreshing = true);
        Self { status }
    }
}

impl Drop for RefreshingFlag<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|status| {
            let was_refreshing = status.refreshing;
            status.refreshing = false;
            was_refreshing
        });
    }
}

/// Handle to the periodic refresh task.
pub struct PollHandle {
    coordinator: Arc<PollCoordinator>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Closes the coordinator and waits for the timer task to finish.
    pub async fn shutdown(mut self) {
        self.coordinator.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(coordinator = %self.coordinator.name, "poll task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.coordinator.close();
            task.abort();
        }
    }
}
