//! The sync coordinator.
//!
//! Drains the operation queue against the remote gateway (push), merges
//! remote state into the local store (pull), reschedules failed cycles with
//! backoff and reacts to connectivity changes. UI code observes it through
//! [`SyncCoordinator::subscribe`] and [`SyncCoordinator::get_state`].

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::reconcile::{last_write_wins, ReconcileStats};
use chrono::{DateTime, Utc};
use habitsync_core::entity::from_snapshot;
use habitsync_core::{
    Clock, CoreResult, EntityType, LocalStore, Metadata, ObserverId, OperationQueue, OperationType,
    QueuedOperation,
};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Message shown while offline.
pub const OFFLINE_MESSAGE: &str = "offline: changes queued";

/// Coarse state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing running.
    #[default]
    Idle,
    /// A push or pull is in flight.
    Syncing,
    /// The last cycle completed.
    Success,
    /// The last cycle failed; a retry is scheduled.
    Error,
}

impl SyncStatus {
    /// Returns true while a cycle is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Syncing)
    }
}

/// What subscribers see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncSnapshot {
    /// Current status.
    pub status: SyncStatus,
    /// End of the last successful push cycle.
    pub last_sync: Option<DateTime<Utc>>,
    /// Message of the last cycle failure.
    pub error: Option<String>,
    /// Queued operations, failed ones included.
    pub pending_operations: usize,
    /// Informational message, such as [`OFFLINE_MESSAGE`].
    pub message: Option<String>,
}

/// Cumulative counters since the coordinator was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Cycles that completed.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Operations confirmed by the remote store.
    pub operations_pushed: u64,
    /// Operation attempts that failed.
    pub operations_failed: u64,
    /// Records added locally from the remote store.
    pub records_pulled: u64,
    /// Conflicts resolved in favor of the local copy.
    pub conflicts_kept_local: u64,
    /// Conflicts resolved in favor of the remote copy.
    pub conflicts_adopted_remote: u64,
}

/// Outcome of a push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Operations removed after remote success.
    pub pushed: usize,
    /// Operations that failed and stayed queued.
    pub failed: usize,
}

/// Outcome of a pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Habit merge decisions.
    pub habits: ReconcileStats,
    /// Log merge decisions.
    pub logs: ReconcileStats,
    /// Whether remote metadata was stored.
    pub metadata: bool,
}

type Listener = Arc<dyn Fn(&SyncSnapshot) + Send + Sync>;

struct RetrySlot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    config: SyncConfig,
    store: Arc<LocalStore>,
    queue: Arc<OperationQueue>,
    gateway: Arc<dyn RemoteGateway>,
    clock: Arc<dyn Clock>,
    online: AtomicBool,
    state: RwLock<SyncSnapshot>,
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    cycle: tokio::sync::Mutex<()>,
    retry: Mutex<Option<RetrySlot>>,
    retry_generation: AtomicU64,
    stats: Mutex<SyncStats>,
    queue_observer: Mutex<Option<ObserverId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(slot) = self.retry.get_mut().take() {
            slot.handle.abort();
        }
        if let Some(id) = self.queue_observer.get_mut().take() {
            self.queue.remove_observer(id);
        }
    }
}

/// A listener registration. Call [`Subscription::unsubscribe`] to stop
/// receiving snapshots.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.write().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Orchestrates push, pull, retries and connectivity transitions.
///
/// Cheap to clone; clones share one coordinator. One sync cycle runs at a
/// time: overlapping calls wait for the running cycle to settle.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Creates a coordinator that starts online.
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<OperationQueue>,
        gateway: Arc<dyn RemoteGateway>,
        config: SyncConfig,
    ) -> Self {
        let clock = store.clock().clone();
        let initial = SyncSnapshot {
            last_sync: store.get_metadata().and_then(|m| m.last_sync),
            pending_operations: queue.get_queue_size(),
            ..SyncSnapshot::default()
        };
        let inner = Arc::new(Inner {
            config,
            store,
            queue,
            gateway,
            clock,
            online: AtomicBool::new(true),
            state: RwLock::new(initial),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            cycle: tokio::sync::Mutex::new(()),
            retry: Mutex::new(None),
            retry_generation: AtomicU64::new(0),
            stats: Mutex::new(SyncStats::default()),
            queue_observer: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let observer = inner.queue.add_observer(move |size| {
            if let Some(inner) = weak.upgrade() {
                SyncCoordinator { inner }.update_state(|s| s.pending_operations = size);
            }
        });
        *inner.queue_observer.lock() = Some(observer);

        Self { inner }
    }

    // ---- observation ----

    /// Registers a listener called with every state change.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the current state.
    pub fn get_state(&self) -> SyncSnapshot {
        self.inner.state.read().clone()
    }

    /// Returns the cumulative counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.lock().clone()
    }

    /// Returns true if the app considers itself online.
    pub fn is_app_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Returns true if a deferred retry is scheduled.
    pub fn is_retry_scheduled(&self) -> bool {
        self.inner.retry.lock().is_some()
    }

    fn update_state(&self, f: impl FnOnce(&mut SyncSnapshot)) {
        let snapshot = {
            let mut state = self.inner.state.write();
            let before = state.clone();
            f(&mut *state);
            if *state == before {
                return;
            }
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &SyncSnapshot) {
        let listeners: Vec<(u64, Listener)> = self.inner.listeners.read().clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::error!(listener = id, "sync listener panicked");
            }
        }
    }

    fn set_syncing(&self) {
        self.update_state(|s| {
            s.status = SyncStatus::Syncing;
            s.error = None;
            s.message = None;
        });
    }

    /// A cycle that settles after connectivity was lost leaves the offline
    /// state in place.
    fn set_success(&self) {
        let online = self.is_app_online();
        self.update_state(|s| {
            if online {
                s.status = SyncStatus::Success;
            }
            s.error = None;
        });
        self.inner.stats.lock().cycles_completed += 1;
    }

    /// Marks the cycle failed and schedules a retry.
    fn fail_cycle(&self, error: &SyncError) {
        tracing::warn!(error = %error, "sync cycle failed");
        let online = self.is_app_online();
        self.update_state(|s| {
            if online {
                s.status = SyncStatus::Error;
                s.error = Some(error.to_string());
            }
        });
        self.inner.stats.lock().cycles_failed += 1;
        self.schedule_retry();
    }

    // ---- connectivity ----

    /// Records a connectivity change.
    ///
    /// Going offline sets status idle with [`OFFLINE_MESSAGE`] and leaves
    /// the queue alone. Coming online starts a background full sync whose
    /// failures are only logged.
    pub fn set_online(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if !online {
            if was_online {
                tracing::info!("connectivity lost; changes stay queued");
            }
            self.update_state(|s| {
                s.status = SyncStatus::Idle;
                s.error = None;
                s.message = Some(OFFLINE_MESSAGE.to_owned());
            });
            return;
        }

        if was_online {
            return;
        }
        tracing::info!("connectivity restored");
        self.update_state(|s| s.message = None);
        if !self.inner.config.auto_sync_on_reconnect {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; skipping reconnect sync");
            return;
        };
        let coordinator = self.clone();
        runtime.spawn(async move {
            if let Err(e) = coordinator.full_sync().await {
                tracing::warn!(error = %e, "reconnect sync failed");
            }
        });
    }

    /// Follows a connectivity signal until its sender is dropped or the
    /// coordinator goes away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_connectivity(&self, mut connectivity: watch::Receiver<bool>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let online = *connectivity.borrow_and_update();
                match weak.upgrade() {
                    Some(inner) => SyncCoordinator { inner }.set_online(online),
                    None => return,
                }
                if connectivity.changed().await.is_err() {
                    return;
                }
            }
        })
    }

    // ---- cycles ----

    /// Drains the queue against the remote store.
    ///
    /// Offline, or with nothing retryable queued, this is a no-op. A failing
    /// operation never aborts the batch: transient failures bump its retry
    /// count, permanent ones park it in the failed set.
    ///
    /// # Errors
    ///
    /// Cycle-level failures (local storage, metadata push). They set status
    /// error and schedule a retry.
    pub async fn sync_to_remote(&self) -> SyncResult<PushReport> {
        let _cycle = self.inner.cycle.lock().await;
        self.push().await
    }

    /// Merges remote habits, logs and metadata into the local store.
    ///
    /// Offline this is a no-op.
    ///
    /// # Errors
    ///
    /// Any fetch or persist failure. It sets status error and schedules a
    /// retry.
    pub async fn sync_from_remote(&self) -> SyncResult<PullReport> {
        let _cycle = self.inner.cycle.lock().await;
        self.pull().await
    }

    /// Push then pull. A push failure is logged and the pull still runs; the
    /// result and final status are the pull's.
    ///
    /// # Errors
    ///
    /// The pull's error.
    pub async fn full_sync(&self) -> SyncResult<PullReport> {
        if !self.is_app_online() {
            tracing::debug!("offline; full sync skipped");
            return Ok(PullReport::default());
        }
        let _cycle = self.inner.cycle.lock().await;
        if let Err(e) = self.push().await {
            tracing::warn!(error = %e, "push failed; continuing with pull");
        }
        self.pull().await
    }

    async fn push(&self) -> SyncResult<PushReport> {
        if !self.is_app_online() {
            tracing::debug!("offline; push skipped");
            return Ok(PushReport::default());
        }
        if self
            .inner
            .queue
            .get_retryable_operations(self.inner.config.max_retries)
            .is_empty()
        {
            return Ok(PushReport::default());
        }

        self.set_syncing();
        match self.drain_queue().await {
            Ok(report) => {
                tracing::info!(pushed = report.pushed, failed = report.failed, "push complete");
                self.set_success();
                Ok(report)
            }
            Err(e) => {
                self.fail_cycle(&e);
                Err(e)
            }
        }
    }

    async fn drain_queue(&self) -> SyncResult<PushReport> {
        let queue = &self.inner.queue;
        let max_retries = self.inner.config.max_retries;

        queue.optimize_queue()?;
        let ops = queue.get_retryable_operations(max_retries);
        tracing::debug!(operations = ops.len(), "draining queue");

        let mut report = PushReport::default();
        for op in ops {
            match self.dispatch(&op).await {
                Ok(()) => {
                    queue.remove_operation(&op.id)?;
                    report.pushed += 1;
                    tracing::trace!(id = %op.id, entity_id = %op.entity_id, "operation pushed");
                }
                Err(e) if e.is_retryable() => {
                    let attempts = match unless_dequeued(queue.increment_retry_count(&op.id), &op)? {
                        Some(attempts) => attempts,
                        None => continue,
                    };
                    report.failed += 1;
                    tracing::warn!(
                        id = %op.id,
                        entity_type = %op.entity_type,
                        entity_id = %op.entity_id,
                        attempts,
                        error = %e,
                        "operation failed; will retry"
                    );
                }
                Err(e) => {
                    if unless_dequeued(queue.mark_permanently_failed(&op.id, max_retries), &op)?
                        .is_none()
                    {
                        continue;
                    }
                    report.failed += 1;
                    tracing::error!(
                        id = %op.id,
                        entity_type = %op.entity_type,
                        entity_id = %op.entity_id,
                        error = %e,
                        "operation failed permanently"
                    );
                }
            }
        }

        {
            let mut stats = self.inner.stats.lock();
            stats.operations_pushed += report.pushed as u64;
            stats.operations_failed += report.failed as u64;
        }

        let now = self.inner.clock.now();
        if let Some(mut metadata) = self.inner.store.get_metadata() {
            metadata.last_sync = Some(now);
            self.inner.store.save_metadata(&metadata)?;
            self.inner.gateway.update_metadata(&metadata).await?;
        }
        self.update_state(|s| s.last_sync = Some(now));
        Ok(report)
    }

    async fn dispatch(&self, op: &QueuedOperation) -> SyncResult<()> {
        let gateway = &self.inner.gateway;
        match (&op.entity_type, op.operation_type) {
            (EntityType::Habit, OperationType::Create) => {
                gateway.create_habit(&from_snapshot(&op.data)?).await?
            }
            (EntityType::Habit, OperationType::Update) => {
                gateway.update_habit(&from_snapshot(&op.data)?).await?
            }
            (EntityType::Habit, OperationType::Delete) => {
                gateway.delete_habit(&from_snapshot(&op.data)?).await?
            }
            (EntityType::Log, OperationType::Create) => {
                gateway.create_log(&from_snapshot(&op.data)?).await?
            }
            (EntityType::Log, OperationType::Update) => {
                gateway.update_log(&from_snapshot(&op.data)?).await?
            }
            (EntityType::Log, OperationType::Delete) => gateway.delete_log(&op.entity_id).await?,
            (EntityType::Metadata, OperationType::Create | OperationType::Update) => {
                gateway
                    .update_metadata(&from_snapshot::<Metadata>(&op.data)?)
                    .await?
            }
            (entity_type, operation) => {
                return Err(SyncError::UnsupportedEntity {
                    entity_type: entity_type.to_string(),
                    operation,
                })
            }
        }
        Ok(())
    }

    async fn pull(&self) -> SyncResult<PullReport> {
        if !self.is_app_online() {
            tracing::debug!("offline; pull skipped");
            return Ok(PullReport::default());
        }

        self.set_syncing();
        match self.merge_remote().await {
            Ok(report) => {
                tracing::info!(
                    habits_added = report.habits.added_remote,
                    habits_adopted = report.habits.adopted_remote,
                    logs_added = report.logs.added_remote,
                    logs_adopted = report.logs.adopted_remote,
                    "pull complete"
                );
                self.set_success();
                Ok(report)
            }
            Err(e) => {
                self.fail_cycle(&e);
                Err(e)
            }
        }
    }

    async fn merge_remote(&self) -> SyncResult<PullReport> {
        let gateway = &self.inner.gateway;
        let (remote_habits, remote_logs, remote_metadata) =
            tokio::try_join!(gateway.get_habits(), gateway.get_logs(), gateway.get_metadata())?;

        // Reconcile under the collection locks so a UI write landing
        // mid-pull is neither lost nor overwritten by a stale local copy.
        let store = &self.inner.store;
        let habits = store.merge_habits(|local| {
            let merged = last_write_wins(local, remote_habits);
            (merged.changed, merged.stats)
        })?;
        let logs = store.merge_logs(|local| {
            let merged = last_write_wins(local, remote_logs);
            (merged.changed, merged.stats)
        })?;
        let metadata = match remote_metadata {
            Some(metadata) => {
                store.save_metadata(&metadata)?;
                true
            }
            None => false,
        };

        {
            let mut stats = self.inner.stats.lock();
            stats.records_pulled += (habits.added_remote + logs.added_remote) as u64;
            stats.conflicts_kept_local += (habits.kept_local + logs.kept_local) as u64;
            stats.conflicts_adopted_remote += (habits.adopted_remote + logs.adopted_remote) as u64;
        }

        Ok(PullReport {
            habits,
            logs,
            metadata,
        })
    }

    // ---- retries ----

    /// Schedules one deferred full sync, replacing any pending one.
    ///
    /// The delay is the backoff entry for the highest retry count queued.
    fn schedule_retry(&self) {
        let max_retry_count = self
            .inner
            .queue
            .get_queue()
            .iter()
            .map(|op| op.retry_count)
            .max()
            .unwrap_or(0);
        let delay = self.inner.config.retry.delay_for(max_retry_count);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; retry not scheduled");
            return;
        };

        let generation = self.inner.retry_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                // Detach from the slot so a reschedule during this sync does
                // not abort the running task.
                let mut slot = inner.retry.lock();
                if slot.as_ref().is_some_and(|s| s.generation == generation) {
                    slot.take();
                }
            }
            tracing::info!("running scheduled retry");
            if let Err(e) = (SyncCoordinator { inner }).full_sync().await {
                tracing::warn!(error = %e, "scheduled retry failed");
            }
        });

        tracing::info!(delay_secs = delay.as_secs(), max_retry_count, "retry scheduled");
        let previous = self
            .inner
            .retry
            .lock()
            .replace(RetrySlot { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Aborts the pending deferred retry. Returns true if one was pending.
    pub fn cancel_retry(&self) -> bool {
        match self.inner.retry.lock().take() {
            Some(slot) => {
                slot.handle.abort();
                tracing::debug!("scheduled retry cancelled");
                true
            }
            None => false,
        }
    }

    // ---- maintenance ----

    /// Erases the queue and all local data, cancels any retry and resets
    /// the state. Used on sign-out. Waits for a running cycle first.
    ///
    /// # Errors
    ///
    /// Local storage failures.
    pub async fn clear_sync_data(&self) -> SyncResult<()> {
        let _cycle = self.inner.cycle.lock().await;
        self.cancel_retry();
        self.inner.queue.clear_queue()?;
        self.inner.store.clear_all()?;
        self.update_state(|s| {
            *s = SyncSnapshot {
                message: s.message.clone(),
                ..SyncSnapshot::default()
            };
        });
        tracing::info!("sync data cleared");
        Ok(())
    }

    /// Returns the metadata record, creating it on first connection.
    ///
    /// Local metadata wins; otherwise remote metadata is adopted; otherwise
    /// a fresh record is created locally and upserted remotely.
    ///
    /// # Errors
    ///
    /// [`SyncError::Offline`] when metadata must come from the remote store
    /// and the app is offline; gateway and storage failures.
    pub async fn ensure_metadata(&self, user_id: &str, remote_id: &str) -> SyncResult<Metadata> {
        if let Some(metadata) = self.inner.store.get_metadata() {
            return Ok(metadata);
        }
        if !self.is_app_online() {
            return Err(SyncError::Offline);
        }

        let _cycle = self.inner.cycle.lock().await;
        let metadata = match self.inner.gateway.get_metadata().await? {
            Some(remote) => remote,
            None => {
                let fresh = Metadata::new(user_id, remote_id);
                self.inner.gateway.update_metadata(&fresh).await?;
                tracing::info!(user_id, "metadata created");
                fresh
            }
        };
        self.inner.store.save_metadata(&metadata)?;
        if metadata.last_sync.is_some() {
            self.update_state(|s| s.last_sync = metadata.last_sync);
        }
        Ok(metadata)
    }

    /// Gives every parked operation a fresh set of attempts and pushes.
    ///
    /// # Errors
    ///
    /// Same as [`SyncCoordinator::sync_to_remote`].
    pub async fn retry_failed_operations(&self) -> SyncResult<PushReport> {
        let reset = self
            .inner
            .queue
            .reset_failed_operations(self.inner.config.max_retries)?;
        tracing::info!(reset, "failed operations reset");
        self.sync_to_remote().await
    }
}

/// Maps `NotFound` from queue bookkeeping to `None`: the operation was
/// removed while its remote call was in flight, so there is nothing left to
/// record. Other errors propagate.
fn unless_dequeued<T>(result: CoreResult<T>, op: &QueuedOperation) -> SyncResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(id = %op.id, entity_id = %op.entity_id, "operation left the queue mid-push");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayMethod, MemoryGateway};
    use crate::GatewayError;
    use chrono::TimeZone;
    use habitsync_core::{FixedClock, LocalWriter};

    struct Harness {
        writer: LocalWriter,
        gateway: Arc<MemoryGateway>,
        coordinator: SyncCoordinator,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()));
        let store = Arc::new(LocalStore::open_in_memory(clock.clone()).unwrap());
        let queue = Arc::new(OperationQueue::open_in_memory(clock).unwrap());
        let gateway = Arc::new(MemoryGateway::new());
        let coordinator = SyncCoordinator::new(
            store.clone(),
            queue.clone(),
            gateway.clone(),
            SyncConfig::default(),
        );
        Harness {
            writer: LocalWriter::new(store, queue),
            gateway,
            coordinator,
        }
    }

    #[tokio::test]
    async fn pending_count_tracks_queue() {
        let h = harness();
        h.writer.create_habit("Read", None).unwrap();
        assert_eq!(h.coordinator.get_state().pending_operations, 1);

        h.coordinator.sync_to_remote().await.unwrap();
        assert_eq!(h.coordinator.get_state().pending_operations, 0);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_starve_others() {
        let h = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.coordinator.subscribe(|_| panic!("listener bug"));
        let sub = h.coordinator.subscribe(move |s| sink.lock().push(s.status));

        h.writer.create_habit("Read", None).unwrap();
        h.coordinator.sync_to_remote().await.unwrap();
        assert!(seen.lock().contains(&SyncStatus::Success));

        sub.unsubscribe();
        let before = seen.lock().len();
        h.coordinator.set_online(false);
        assert_eq!(seen.lock().len(), before);
    }

    #[tokio::test]
    async fn unsupported_entity_goes_straight_to_failed() {
        let h = harness();
        let queue = h.writer.queue();
        queue
            .add_to_queue(
                OperationType::Create,
                EntityType::Other("reminder".into()),
                "r1",
                serde_json::json!({}),
            )
            .unwrap();

        let report = h.coordinator.sync_to_remote().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(queue.get_failed_operations(3).len(), 1);
        assert_eq!(h.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn cancel_retry_reports_whether_one_was_pending() {
        let h = harness();
        assert!(!h.coordinator.cancel_retry());

        h.gateway
            .fail_next(GatewayMethod::GetHabits, GatewayError::Transient("down".into()));
        assert!(h.coordinator.sync_from_remote().await.is_err());
        assert!(h.coordinator.is_retry_scheduled());
        assert!(h.coordinator.cancel_retry());
        assert!(!h.coordinator.is_retry_scheduled());
    }
}
