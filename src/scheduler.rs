// Poll scheduler: probe immediately on start, then once per interval.
// At most one fetch in flight per monitor; results landing after stop() are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::aggregate;
use crate::fetcher::StatusFetcher;
use crate::models::{AggregateView, StatsMap, StatsUpdate, active_only};
use crate::registry::DescriptorSource;

/// Default probe cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Queued manual refresh requests before senders wait.
const REFRESH_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already polling")]
    AlreadyRunning,

    #[error("scheduler has been stopped")]
    Stopped,

    #[error("operation requires an idle scheduler (state: {0:?})")]
    NotIdle(SchedulerState),
}

/// What one probe cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Fetch succeeded; `updated` entries were written into the view.
    Merged { updated: usize },
    /// No active descriptors; no network call was made.
    NoActiveServers,
    /// Registry read or fetch failed; view unchanged.
    Failed,
    /// Another cycle was in flight; no network call was made.
    Busy,
    /// The scheduler stopped while the fetch was pending; result dropped.
    Discarded,
    /// Called after stop; no network call was made.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Cap on timer ticks skipped after consecutive failures. 0 disables backoff.
    pub max_backoff_ticks: u32,
    /// Capacity of the `StatsUpdate` broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff_ticks: 0,
            broadcast_capacity: 16,
        }
    }
}

/// Ticks to skip after `consecutive_failures` failed cycles: 0, 0, 1, 3, 7, ...
/// capped at `cap`. A cap of 0 disables backoff.
pub fn backoff_ticks(consecutive_failures: u32, cap: u32) -> u32 {
    if cap == 0 || consecutive_failures < 2 {
        return 0;
    }
    let exp = (consecutive_failures - 1).min(31);
    ((1u64 << exp) - 1).min(u64::from(cap)) as u32
}

#[derive(Debug, Default)]
struct Backoff {
    cap: u32,
    failures: u32,
    skip_remaining: u32,
}

impl Backoff {
    fn new(cap: u32) -> Self {
        Self {
            cap,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Failed => {
                self.failures = self.failures.saturating_add(1);
                self.skip_remaining = backoff_ticks(self.failures, self.cap);
            }
            CycleOutcome::Merged { .. } | CycleOutcome::NoActiveServers => {
                self.failures = 0;
                self.skip_remaining = 0;
            }
            CycleOutcome::Busy | CycleOutcome::Discarded | CycleOutcome::Stopped => {}
        }
    }

    fn should_skip(&mut self) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            true
        } else {
            false
        }
    }
}

/// Clears the in-flight flag on drop (acquire = set, drop = clear).
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type RefreshRequest = oneshot::Sender<CycleOutcome>;

struct Shared {
    view: RwLock<AggregateView>,
    last_updated: RwLock<Option<DateTime<Utc>>>,
    state: Mutex<SchedulerState>,
    updates: broadcast::Sender<StatsUpdate>,
    refresh_tx: mpsc::Sender<RefreshRequest>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> AggregateView {
        self.view
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self
            .last_updated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_last_updated(&self, at: Option<DateTime<Utc>>) {
        *self
            .last_updated
            .write()
            .unwrap_or_else(PoisonError::into_inner) = at;
    }
}

/// Read-only access to the aggregate view, cheap to clone into handlers.
#[derive(Clone)]
pub struct ViewHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ViewHandle {
    /// Copy of the current view (empty before the first successful cycle).
    pub fn view(&self) -> AggregateView {
        self.shared.view()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.shared.last_updated()
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatsUpdate> {
        self.shared.updates.subscribe()
    }

    /// Asks the poll task to run a cycle now, queued behind any cycle in flight.
    /// `None` when the scheduler is not polling or stopped before answering.
    pub async fn refresh(&self) -> Option<CycleOutcome> {
        if self.state() != SchedulerState::Polling {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.shared.refresh_tx.send(tx).await.ok()?;
        rx.await.ok()
    }
}

/// Poll scheduler + aggregation cache for one view.
pub struct StatusMonitor<F, R> {
    fetcher: F,
    registry: R,
    config: MonitorConfig,
    shared: Arc<Shared>,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    refresh_rx: Mutex<Option<mpsc::Receiver<RefreshRequest>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<F, R> StatusMonitor<F, R>
where
    F: StatusFetcher,
    R: DescriptorSource,
{
    pub fn new(fetcher: F, registry: R, config: MonitorConfig) -> Arc<Self> {
        let (updates, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE);
        Arc::new(Self {
            fetcher,
            registry,
            config,
            shared: Arc::new(Shared {
                view: RwLock::new(AggregateView::new()),
                last_updated: RwLock::new(None),
                state: Mutex::new(SchedulerState::Idle),
                updates,
                refresh_tx,
            }),
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            refresh_rx: Mutex::new(Some(refresh_rx)),
            task: Mutex::new(None),
        })
    }

    pub fn handle(&self) -> ViewHandle {
        ViewHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state()
    }

    pub fn view(&self) -> AggregateView {
        self.shared.view()
    }

    /// Seeds the view from persisted stats. Only allowed before `start()`.
    pub fn prime(&self, view: AggregateView) -> Result<(), SchedulerError> {
        let state = self.shared.state();
        if *state != SchedulerState::Idle {
            return Err(SchedulerError::NotIdle(*state));
        }
        let newest = view.iter().map(|(_, s)| s.last_update).max();
        *self
            .shared
            .view
            .write()
            .unwrap_or_else(PoisonError::into_inner) = view;
        self.shared.set_last_updated(newest);
        Ok(())
    }

    /// Idle → Polling: spawns the poll task, which probes right away.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let mut state = self.shared.state();
        match *state {
            SchedulerState::Idle => {}
            SchedulerState::Polling => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
        }
        let refresh_rx = self
            .refresh_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SchedulerError::AlreadyRunning)?;
        *state = SchedulerState::Polling;
        drop(state);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(refresh_rx).await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// → Stopped: cancels the timer. A fetch in flight runs to completion but
    /// its result is discarded. Returns the poll task handle, if one was started.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.shared.state();
            if *state != SchedulerState::Stopped {
                debug!(previous = ?*state, "scheduler stopping");
            }
            *state = SchedulerState::Stopped;
        }
        self.cancel.cancel();
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    #[instrument(skip_all, fields(interval_secs = self.config.poll_interval.as_secs()))]
    async fn run(self: Arc<Self>, mut refresh_rx: mpsc::Receiver<RefreshRequest>) {
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut backoff = Backoff::new(self.config.max_backoff_ticks);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("poll task shutting down");
                    break;
                }
                _ = tick.tick() => {
                    if backoff.should_skip() {
                        debug!(consecutive_failures = backoff.failures, "backing off; tick skipped");
                        continue;
                    }
                    let outcome = self.poll_once().await;
                    backoff.record(outcome);
                }
                Some(reply) = refresh_rx.recv() => {
                    let outcome = self.poll_once().await;
                    backoff.record(outcome);
                    let _ = reply.send(outcome);
                }
            }
        }
    }

    /// Runs one probe cycle against the current active descriptors.
    pub async fn poll_once(&self) -> CycleOutcome {
        if *self.shared.state() == SchedulerState::Stopped {
            return CycleOutcome::Stopped;
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("probe cycle already in flight; skipping");
            return CycleOutcome::Busy;
        };

        let descriptors = match self.registry.descriptors().await {
            Ok(d) => active_only(d),
            Err(e) => {
                warn!(error = %e, operation = "read_registry", "registry read failed; cycle skipped");
                return CycleOutcome::Failed;
            }
        };
        if descriptors.is_empty() {
            debug!("no active servers; nothing to probe");
            return CycleOutcome::NoActiveServers;
        }

        let started = Instant::now();
        let incoming = match self.fetcher.fetch(&descriptors).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    error = %e,
                    operation = "fetch_status",
                    servers = descriptors.len(),
                    "status fetch failed; keeping last known view"
                );
                return CycleOutcome::Failed;
            }
        };
        let outcome = self.apply(incoming);
        debug!(
            ?outcome,
            servers = descriptors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "probe cycle finished"
        );
        outcome
    }

    /// Merges under the state lock so stop() cannot slip between check and write.
    fn apply(&self, incoming: StatsMap) -> CycleOutcome {
        let state = self.shared.state();
        if *state == SchedulerState::Stopped {
            debug!("scheduler stopped during fetch; result discarded");
            return CycleOutcome::Discarded;
        }
        let updated = incoming.len();
        if updated == 0 {
            // Nothing fresh: the view and its timestamp stay as they were.
            return CycleOutcome::Merged { updated };
        }
        let now = Utc::now();
        {
            let mut view = self
                .shared
                .view
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let merged = aggregate::merge(std::mem::take(&mut *view), incoming.clone());
            *view = merged;
        }
        self.shared.set_last_updated(Some(now));
        drop(state);

        // No subscribers is normal (no WebSocket clients, no storage).
        let _ = self.shared.updates.send(StatsUpdate {
            timestamp: now,
            stats: incoming,
        });
        CycleOutcome::Merged { updated }
    }

    /// Drops cached entries for servers no longer active in the registry.
    /// Explicit housekeeping; probe cycles never prune.
    pub async fn prune_inactive(&self) -> anyhow::Result<usize> {
        let descriptors = self.registry.descriptors().await?;
        let mut view = self
            .shared
            .view
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(aggregate::prune_inactive(&mut view, &descriptors))
    }
}
