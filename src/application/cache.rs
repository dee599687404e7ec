use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::{QueryKind, Task, TaskId};
use crate::ports::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Last known state of one remote collection.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub tasks: Arc<Vec<Task>>,
    pub status: FetchStatus,
    pub error: Option<ApiError>,
    /// Set when the user dismissed `error`; reset by the next fetch result.
    pub error_dismissed: bool,
    pub generation: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Bumped on every change, used for memoizing derived views.
    pub revision: u64,
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        matches!(self.status, FetchStatus::Idle | FetchStatus::Loading)
    }

    /// Error to show the user, if any.
    pub fn visible_error(&self) -> Option<&ApiError> {
        if self.error_dismissed {
            None
        } else {
            self.error.as_ref()
        }
    }

    pub fn needs_fetch(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        match self.status {
            FetchStatus::Idle | FetchStatus::Error => true,
            FetchStatus::Loading => false,
            FetchStatus::Success => self
                .fetched_at
                .map(|fetched| now - fetched >= stale_after)
                .unwrap_or(true),
        }
    }

    fn outcome(&self) -> ApiResult<()> {
        match (&self.status, &self.error) {
            (FetchStatus::Error, Some(error)) => Err(error.clone()),
            (FetchStatus::Error, None) => {
                Err(ApiError::Network("fetch failed without detail".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub kind: QueryKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStart {
    Started(FetchTicket),
    InFlight,
}

#[derive(Debug, Clone)]
struct Change {
    id: TaskId,
    /// Position and value before the patch; `None` if the patch inserted it.
    before: Option<(usize, Task)>,
}

/// Captures what a patch changed so it can be reverted.
///
/// Reverting restores the pre-patch value of every task the patch touched
/// and removes tasks it inserted. Tasks the patch did not touch are left
/// alone, so tokens from independent patches can be undone in any order.
#[derive(Debug, Clone)]
pub struct UndoToken {
    kind: QueryKind,
    changes: Vec<Change>,
}

impl UndoToken {
    fn diff(kind: QueryKind, before: &[Task], after: &[Task]) -> Self {
        let after_by_id: HashMap<&TaskId, &Task> = after.iter().map(|t| (&t.id, t)).collect();
        let before_ids: HashSet<&TaskId> = before.iter().map(|t| &t.id).collect();

        let mut changes: Vec<Change> = before
            .iter()
            .enumerate()
            .filter(|(_, task)| {
                after_by_id
                    .get(&task.id)
                    .map_or(true, |after| **after != **task)
            })
            .map(|(index, task)| Change {
                id: task.id.clone(),
                before: Some((index, task.clone())),
            })
            .collect();

        changes.extend(
            after
                .iter()
                .filter(|task| !before_ids.contains(&task.id))
                .map(|task| Change {
                    id: task.id.clone(),
                    before: None,
                }),
        );

        Self { kind, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn revert(&self, tasks: &mut Vec<Task>) {
        let inserted: Vec<&TaskId> = self
            .changes
            .iter()
            .filter(|c| c.before.is_none())
            .map(|c| &c.id)
            .collect();
        tasks.retain(|task| !inserted.contains(&&task.id));

        let mut missing: Vec<&(usize, Task)> = Vec::new();
        for prior in self.changes.iter().filter_map(|c| c.before.as_ref()) {
            let (_, task) = prior;
            match tasks.iter_mut().find(|current| current.id == task.id) {
                Some(current) => *current = task.clone(),
                None => missing.push(prior),
            }
        }

        missing.sort_by_key(|(index, _)| *index);
        for (index, task) in missing {
            let position = (*index).min(tasks.len());
            tasks.insert(position, task.clone());
        }
    }
}

#[derive(Debug, Default)]
struct Queries {
    all: QueryState,
    completed: QueryState,
}

impl Queries {
    fn get(&self, kind: QueryKind) -> &QueryState {
        match kind {
            QueryKind::All => &self.all,
            QueryKind::Completed => &self.completed,
        }
    }

    fn get_mut(&mut self, kind: QueryKind) -> &mut QueryState {
        match kind {
            QueryKind::All => &mut self.all,
            QueryKind::Completed => &mut self.completed,
        }
    }
}

/// Client-side copy of the remote task collections.
///
/// All mutation goes through short synchronous sections under one lock, so
/// readers never observe a half-applied patch. Every change is announced on
/// a watch channel.
pub struct TaskCache {
    queries: RwLock<Queries>,
    changes: watch::Sender<u64>,
}

impl Default for TaskCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCache {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            queries: RwLock::new(Queries::default()),
            changes,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn snapshot(&self, kind: QueryKind) -> QueryState {
        self.queries.read().get(kind).clone()
    }

    pub fn tasks(&self, kind: QueryKind) -> Arc<Vec<Task>> {
        self.queries.read().get(kind).tasks.clone()
    }

    pub fn find(&self, kind: QueryKind, id: &TaskId) -> Option<Task> {
        self.queries
            .read()
            .get(kind)
            .tasks
            .iter()
            .find(|task| &task.id == id)
            .cloned()
    }

    /// Apply an optimistic change and return the token that reverts it.
    pub fn apply_patch<F>(&self, kind: QueryKind, mutator: F) -> UndoToken
    where
        F: FnOnce(&mut Vec<Task>),
    {
        let token = {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(kind);
            let mut next = (*slot.tasks).clone();
            mutator(&mut next);

            let token = UndoToken::diff(kind, &slot.tasks, &next);
            if !token.is_empty() {
                slot.tasks = Arc::new(next);
                slot.revision += 1;
            }
            token
        };

        if !token.is_empty() {
            self.notify();
        }
        token
    }

    /// Apply a confirmed change that will never be reverted.
    pub fn commit<F>(&self, kind: QueryKind, mutator: F)
    where
        F: FnOnce(&mut Vec<Task>),
    {
        {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(kind);
            let mut next = (*slot.tasks).clone();
            mutator(&mut next);
            if next == *slot.tasks {
                return;
            }
            slot.tasks = Arc::new(next);
            slot.revision += 1;
        }
        self.notify();
    }

    pub fn undo(&self, token: UndoToken) {
        if token.is_empty() {
            return;
        }

        {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(token.kind);
            let mut tasks = (*slot.tasks).clone();
            token.revert(&mut tasks);
            slot.tasks = Arc::new(tasks);
            slot.revision += 1;
        }

        tracing::debug!(
            "Rolled back {} change(s) in {} collection",
            token.changes.len(),
            token.kind
        );
        self.notify();
    }

    /// Mark a fetch as started. Without `force`, a fetch already in flight
    /// is reused; with it, a new generation supersedes the old one.
    pub fn begin_fetch(&self, kind: QueryKind, force: bool) -> FetchStart {
        let ticket = {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(kind);
            if !force && slot.status == FetchStatus::Loading {
                return FetchStart::InFlight;
            }
            slot.generation += 1;
            slot.status = FetchStatus::Loading;
            slot.revision += 1;
            FetchTicket {
                kind,
                generation: slot.generation,
            }
        };

        self.notify();
        FetchStart::Started(ticket)
    }

    /// Store a fetch result. Returns false when the ticket was superseded
    /// and the result was discarded.
    pub fn finish_fetch(&self, ticket: FetchTicket, result: ApiResult<Vec<Task>>) -> bool {
        {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(ticket.kind);
            if slot.generation != ticket.generation {
                tracing::debug!(
                    "Discarding stale {} fetch (generation {}, current {})",
                    ticket.kind,
                    ticket.generation,
                    slot.generation
                );
                return false;
            }

            match result {
                Ok(tasks) => {
                    slot.tasks = Arc::new(tasks);
                    slot.status = FetchStatus::Success;
                    slot.error = None;
                    slot.fetched_at = Some(Utc::now());
                }
                Err(error) => {
                    // Stale-while-error: keep whatever data we had.
                    slot.status = FetchStatus::Error;
                    slot.error = Some(error);
                }
            }
            slot.error_dismissed = false;
            slot.revision += 1;
        }

        self.notify();
        true
    }

    /// Wait until no fetch is in flight for `kind` and report how the last
    /// one ended.
    pub async fn wait_for_fetch(&self, kind: QueryKind) -> ApiResult<()> {
        let mut changes = {
            let queries = self.queries.read();
            let slot = queries.get(kind);
            if slot.status != FetchStatus::Loading {
                return slot.outcome();
            }
            // Subscribing under the lock means the completion cannot slip by.
            self.changes.subscribe()
        };

        loop {
            if changes.changed().await.is_err() {
                break;
            }
            let queries = self.queries.read();
            let slot = queries.get(kind);
            if slot.status != FetchStatus::Loading {
                return slot.outcome();
            }
        }

        self.queries.read().get(kind).outcome()
    }

    /// Hide the current fetch error for `kind`. Returns true if one was shown.
    pub fn dismiss_error(&self, kind: QueryKind) -> bool {
        let dismissed = {
            let mut queries = self.queries.write();
            let slot = queries.get_mut(kind);
            if slot.error.is_none() || slot.error_dismissed {
                false
            } else {
                slot.error_dismissed = true;
                slot.revision += 1;
                true
            }
        };

        if dismissed {
            self.notify();
        }
        dismissed
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }
}
