//! The pending-operation queue.
//!
//! Every local mutation appends a [`QueuedOperation`] carrying the full
//! snapshot of the entity's intended state. The sync coordinator drains the
//! queue against the remote store, removing operations on confirmed success
//! and bumping their retry count on failure.
//!
//! Queue order is insertion order and survives restarts: the journal replays
//! puts in the order they were first written, and compaction rewrites the
//! live operations in queue order.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::entity::{EntityType, Record};
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, Mutation};
use chrono::{DateTime, Utc};
use habitsync_storage::{InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default retry ceiling.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// What a queued operation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    /// First write of a new entity.
    Create,
    /// Any later write.
    Update,
    /// Removal; soft for habits.
    Delete,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationType::Create => "CREATE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
        })
    }
}

/// A mutation waiting to be sent to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Time-ordered identifier.
    pub id: String,
    /// When the operation was enqueued.
    pub timestamp: DateTime<Utc>,
    /// Create, update or delete.
    pub operation_type: OperationType,
    /// Target entity kind.
    pub entity_type: EntityType,
    /// Target entity id.
    pub entity_id: String,
    /// Full snapshot of the entity's intended state.
    pub data: serde_json::Value,
    /// Failed attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Time of the last failed attempt.
    #[serde(default)]
    pub last_retry: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    /// Returns true if the operation can still be attempted.
    pub fn is_retryable(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

impl Record for QueuedOperation {
    const COLLECTION: &'static str = "queue";

    fn key(&self) -> &str {
        &self.id
    }
}

/// Identifies a registered queue observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(usize) + Send + Sync>;

struct QueueState {
    journal: Journal<QueuedOperation>,
    ops: Vec<QueuedOperation>,
}

impl QueueState {
    fn position(&self, id: &str) -> Option<usize> {
        self.ops.iter().position(|op| op.id == id)
    }

    /// Journals `batch`, then applies it to the in-memory queue.
    fn commit(&mut self, batch: Vec<Mutation<QueuedOperation>>) -> CoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let refs: Vec<Mutation<&QueuedOperation>> = batch
            .iter()
            .map(|m| match m {
                Mutation::Put(op) => Mutation::Put(op),
                Mutation::Remove(id) => Mutation::Remove(id.clone()),
            })
            .collect();
        self.journal.append(&refs)?;

        for mutation in batch {
            apply(&mut self.ops, mutation);
        }
        self.journal.maybe_compact(self.ops.len(), self.ops.iter());
        Ok(())
    }
}

fn apply(ops: &mut Vec<QueuedOperation>, mutation: Mutation<QueuedOperation>) {
    match mutation {
        Mutation::Put(op) => match ops.iter_mut().find(|o| o.id == op.id) {
            Some(existing) => *existing = op,
            None => ops.push(op),
        },
        Mutation::Remove(id) => ops.retain(|o| o.id != id),
    }
}

/// Builds the mutations that collapse each entity's operations into one.
fn collapse(ops: &[QueuedOperation]) -> Vec<Mutation<QueuedOperation>> {
    let mut groups: HashMap<(&EntityType, &str), Vec<usize>> = HashMap::new();
    for (index, op) in ops.iter().enumerate() {
        groups
            .entry((&op.entity_type, op.entity_id.as_str()))
            .or_default()
            .push(index);
    }

    let mut batch = Vec::new();
    for indices in groups.values().filter(|ix| ix.len() > 1) {
        // max_by_key keeps the last maximum, so equal timestamps resolve to
        // the later queue position.
        let Some(&winner_ix) = indices.iter().max_by_key(|&&i| ops[i].timestamp) else {
            continue;
        };
        let first = &ops[indices[0]];
        let winner = &ops[winner_ix];
        if first.operation_type == OperationType::Create
            && winner.operation_type != OperationType::Create
        {
            let mut promoted = winner.clone();
            promoted.operation_type = OperationType::Create;
            batch.push(Mutation::Put(promoted));
        }
        batch.extend(
            indices
                .iter()
                .filter(|&&i| i != winner_ix)
                .map(|&i| Mutation::Remove(ops[i].id.clone())),
        );
    }
    batch
}

/// The persisted queue of pending remote mutations.
///
/// # Thread Safety
///
/// All operations go through one mutex. Observers are called after it is
/// released, with the queue size at that moment.
pub struct OperationQueue {
    state: Mutex<QueueState>,
    clock: Arc<dyn Clock>,
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl OperationQueue {
    /// Opens the queue kept in `dir`.
    ///
    /// # Errors
    ///
    /// Fails if the queue journal cannot be read or is corrupt.
    pub fn open(dir: &StoreDir, config: StoreConfig) -> CoreResult<Self> {
        Self::open_with_clock(dir, config, Arc::new(SystemClock))
    }

    /// Opens the queue kept in `dir` with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`OperationQueue::open`].
    pub fn open_with_clock(
        dir: &StoreDir,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        Self::open_with_backend(Box::new(dir.queue_backend()?), config, clock)
    }

    /// Opens the queue over an explicit backend.
    ///
    /// # Errors
    ///
    /// Fails if the journal cannot be replayed.
    pub fn open_with_backend(
        backend: Box<dyn StorageBackend>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let (journal, replayed) =
            Journal::<QueuedOperation>::open(QueuedOperation::COLLECTION, backend, config)?;
        let mut ops = Vec::new();
        for mutation in replayed {
            apply(&mut ops, mutation);
        }
        tracing::debug!(pending = ops.len(), "operation queue loaded");

        Ok(Self {
            state: Mutex::new(QueueState { journal, ops }),
            clock,
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        })
    }

    /// Opens an empty in-memory queue.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the durable variants.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), StoreConfig::default(), clock)
    }

    /// Registers a callback invoked with the queue size after every change.
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Removes a callback. Unknown ids are ignored.
    pub fn remove_observer(&self, id: ObserverId) {
        self.observers.write().retain(|(oid, _)| *oid != id);
    }

    fn notify(&self, size: usize) {
        let observers: Vec<Observer> = self.observers.read().iter().map(|(_, o)| o.clone()).collect();
        for observer in observers {
            observer(size);
        }
    }

    /// Runs `f` under the lock and notifies observers if it changed anything.
    fn mutate<R>(&self, f: impl FnOnce(&mut QueueState) -> CoreResult<(R, bool)>) -> CoreResult<R> {
        let (result, changed, size) = {
            let mut state = self.state.lock();
            let (result, changed) = f(&mut state)?;
            (result, changed, state.ops.len())
        };
        if changed {
            self.notify(size);
        }
        Ok(result)
    }

    /// Appends an operation with `retry_count = 0`, a fresh id and the
    /// current time. Operations are never de-duplicated here.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the operation could not be persisted.
    pub fn add_to_queue(
        &self,
        operation_type: OperationType,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        data: serde_json::Value,
    ) -> CoreResult<QueuedOperation> {
        let op = QueuedOperation {
            id: uuid::Uuid::now_v7().to_string(),
            timestamp: self.clock.now(),
            operation_type,
            entity_type,
            entity_id: entity_id.into(),
            data,
            retry_count: 0,
            last_retry: None,
        };
        tracing::trace!(
            id = %op.id,
            operation = %op.operation_type,
            entity_type = %op.entity_type,
            entity_id = %op.entity_id,
            "operation queued"
        );

        self.mutate(|state| {
            state.commit(vec![Mutation::Put(op.clone())])?;
            Ok((op, true))
        })
    }

    /// Collapses each entity's operations into the most recent one.
    ///
    /// The survivor keeps its queue position and carries the latest
    /// snapshot. When the entity's first queued operation was a create, the
    /// survivor stays a create so the remote store still receives one.
    /// Returns the number of operations removed.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the collapsed queue could not be
    /// persisted; the queue is unchanged then.
    pub fn optimize_queue(&self) -> CoreResult<usize> {
        self.mutate(|state| {
            let batch = collapse(&state.ops);
            let removed = batch
                .iter()
                .filter(|m| matches!(m, Mutation::Remove(_)))
                .count();
            if removed > 0 {
                tracing::debug!(removed, "queue optimized");
            }
            state.commit(batch)?;
            Ok((removed, removed > 0))
        })
    }

    /// Returns every queued operation in queue order.
    pub fn get_queue(&self) -> Vec<QueuedOperation> {
        self.state.lock().ops.clone()
    }

    /// Returns operations with `retry_count < max_retries`, in queue order.
    pub fn get_retryable_operations(&self, max_retries: u32) -> Vec<QueuedOperation> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| op.is_retryable(max_retries))
            .cloned()
            .collect()
    }

    /// Returns operations that reached the retry ceiling, in queue order.
    pub fn get_failed_operations(&self, max_retries: u32) -> Vec<QueuedOperation> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| !op.is_retryable(max_retries))
            .cloned()
            .collect()
    }

    /// Records one failed attempt: bumps `retry_count` and stamps
    /// `last_retry`. Returns the new count.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the operation is no longer queued.
    pub fn increment_retry_count(&self, id: &str) -> CoreResult<u32> {
        let now = self.clock.now();
        self.update(id, |op| {
            op.retry_count = op.retry_count.saturating_add(1);
            op.last_retry = Some(now);
        })
    }

    /// Moves an operation straight to the failed set.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the operation is no longer queued.
    pub fn mark_permanently_failed(&self, id: &str, max_retries: u32) -> CoreResult<u32> {
        let now = self.clock.now();
        self.update(id, |op| {
            op.retry_count = op.retry_count.max(max_retries);
            op.last_retry = Some(now);
        })
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut QueuedOperation)) -> CoreResult<u32> {
        self.mutate(|state| {
            let index = state
                .position(id)
                .ok_or_else(|| CoreError::not_found(QueuedOperation::COLLECTION, id))?;
            let mut op = state.ops[index].clone();
            f(&mut op);
            let count = op.retry_count;
            state.commit(vec![Mutation::Put(op)])?;
            Ok((count, false))
        })
    }

    /// Resets the retry count of every failed operation so it is attempted
    /// again. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the reset could not be persisted.
    pub fn reset_failed_operations(&self, max_retries: u32) -> CoreResult<usize> {
        self.mutate(|state| {
            let batch: Vec<_> = state
                .ops
                .iter()
                .filter(|op| !op.is_retryable(max_retries))
                .map(|op| {
                    let mut op = op.clone();
                    op.retry_count = 0;
                    op.last_retry = None;
                    Mutation::Put(op)
                })
                .collect();
            let reset = batch.len();
            state.commit(batch)?;
            Ok((reset, false))
        })
    }

    /// Removes an operation after the remote store confirmed it. Returns
    /// false if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the removal could not be persisted.
    pub fn remove_operation(&self, id: &str) -> CoreResult<bool> {
        self.mutate(|state| {
            if state.position(id).is_none() {
                return Ok((false, false));
            }
            state.commit(vec![Mutation::Remove(id.to_owned())])?;
            Ok((true, true))
        })
    }

    /// Returns the queued operations targeting `entity_id`, in queue order.
    pub fn get_operations_for_entity(&self, entity_id: &str) -> Vec<QueuedOperation> {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| op.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Number of queued operations, failed ones included.
    pub fn get_queue_size(&self) -> usize {
        self.state.lock().ops.len()
    }

    /// Returns true if anything is queued.
    pub fn has_pending_operations(&self) -> bool {
        !self.state.lock().ops.is_empty()
    }

    /// Drops every queued operation.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the empty queue could not be persisted.
    pub fn clear_queue(&self) -> CoreResult<()> {
        self.mutate(|state| {
            state.journal.rewrite(std::iter::empty())?;
            let changed = !state.ops.is_empty();
            state.ops.clear();
            Ok(((), changed))
        })
    }

    /// Drops every operation targeting `entity_type`. Returns how many were
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the removal could not be persisted.
    pub fn clear_queue_for_entity_type(&self, entity_type: &EntityType) -> CoreResult<usize> {
        self.mutate(|state| {
            let batch: Vec<_> = state
                .ops
                .iter()
                .filter(|op| &op.entity_type == entity_type)
                .map(|op| Mutation::Remove(op.id.clone()))
                .collect();
            let removed = batch.len();
            state.commit(batch)?;
            Ok((removed, removed > 0))
        })
    }
}
