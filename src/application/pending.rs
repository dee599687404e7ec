use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::domain::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    UpdateText,
    Delete,
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkKind {
    CompleteAll,
    IncompleteAll,
    DeleteCompleted,
}

impl BulkKind {
    pub fn item_kind(self) -> OperationKind {
        match self {
            BulkKind::CompleteAll => OperationKind::Complete,
            BulkKind::IncompleteAll => OperationKind::Incomplete,
            BulkKind::DeleteCompleted => OperationKind::Delete,
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            BulkKind::CompleteAll => "Failed to complete all tasks",
            BulkKind::IncompleteAll => "Failed to mark all tasks as incomplete",
            BulkKind::DeleteCompleted => "Failed to delete completed tasks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Task(TaskId),
    Bulk(BulkKind),
}

type Markers = Arc<DashMap<PendingKey, Vec<OperationKind>>>;

/// In-progress operations, keyed by task or bulk action.
#[derive(Debug, Default)]
pub struct PendingOperations {
    markers: Markers,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation as started. Returns `None` if the same kind of
    /// operation is already running for `key`.
    pub fn try_begin(&self, key: PendingKey, kind: OperationKind) -> Option<PendingGuard> {
        {
            let mut kinds = self.markers.entry(key.clone()).or_default();
            if kinds.contains(&kind) {
                return None;
            }
            kinds.push(kind);
        }

        Some(PendingGuard {
            markers: self.markers.clone(),
            key,
            kind,
        })
    }

    pub fn is_pending(&self, key: &PendingKey) -> bool {
        self.markers.get(key).is_some_and(|kinds| !kinds.is_empty())
    }
}

/// Clears its marker when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    markers: Markers,
    key: PendingKey,
    kind: OperationKind,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(mut kinds) = self.markers.get_mut(&self.key) {
            if let Some(position) = kinds.iter().position(|k| *k == self.kind) {
                kinds.remove(position);
            }
        }
        self.markers.remove_if(&self.key, |_, kinds| kinds.is_empty());
    }
}

type Tails = Arc<DashMap<TaskId, (u64, oneshot::Receiver<()>)>>;

/// Orders remote calls per task id.
///
/// Slots are handed out synchronously in submission order; a slot becomes
/// ready once the previous slot for the same task has been dropped.
#[derive(Debug)]
pub struct TaskQueue {
    enabled: bool,
    tails: Tails,
    sequence: AtomicU64,
}

impl TaskQueue {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tails: Arc::new(DashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn enqueue(&self, id: &TaskId) -> QueueSlot {
        if !self.enabled {
            return QueueSlot {
                previous: None,
                done: None,
                release: None,
            };
        }

        let (done, receiver) = oneshot::channel();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .tails
            .insert(id.clone(), (sequence, receiver))
            .map(|(_, previous)| previous);

        QueueSlot {
            previous,
            done: Some(done),
            release: Some((self.tails.clone(), id.clone(), sequence)),
        }
    }
}

#[derive(Debug)]
pub struct QueueSlot {
    previous: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
    release: Option<(Tails, TaskId, u64)>,
}

impl QueueSlot {
    /// Wait for the previous operation on the same task to settle.
    pub async fn ready(&mut self) {
        if let Some(previous) = self.previous.take() {
            // A dropped sender means the previous slot is finished.
            let _ = previous.await;
        }
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        drop(self.done.take());
        if let Some((tails, id, sequence)) = self.release.take() {
            tails.remove_if(&id, |_, (tail, _)| *tail == sequence);
        }
    }
}
