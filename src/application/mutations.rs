//! Optimistic mutation protocol.
//!
//! Each write is split into a synchronous [`MutationCoordinator::stage`]
//! step, which patches the cache and keeps the undo tokens, and an async
//! [`MutationCoordinator::execute`] step, which calls the API and then
//! either reconciles the server answer or rolls the patches back.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;

use super::cache::{TaskCache, UndoToken};
use super::pending::{OperationKind, QueueSlot, TaskQueue};
use crate::domain::{QueryKind, Task, TaskId, TaskText};
use crate::ports::{ApiResult, TaskApi};

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create { text: TaskText },
    UpdateText { id: TaskId, text: TaskText },
    Delete { id: TaskId },
    Complete { id: TaskId },
    Incomplete { id: TaskId },
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Create { .. } => OperationKind::Create,
            Mutation::UpdateText { .. } => OperationKind::UpdateText,
            Mutation::Delete { .. } => OperationKind::Delete,
            Mutation::Complete { .. } => OperationKind::Complete,
            Mutation::Incomplete { .. } => OperationKind::Incomplete,
        }
    }

    /// The existing task this mutation targets; `None` for creation.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Mutation::Create { .. } => None,
            Mutation::UpdateText { id, .. }
            | Mutation::Delete { id }
            | Mutation::Complete { id }
            | Mutation::Incomplete { id } => Some(id),
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "Failed to create task",
            Mutation::UpdateText { .. } => "Failed to update task",
            Mutation::Delete { .. } => "Failed to delete task",
            Mutation::Complete { .. } => "Failed to complete task",
            Mutation::Incomplete { .. } => "Failed to mark as incomplete task",
        }
    }
}

/// A mutation whose optimistic effect is already in the cache.
#[derive(Debug)]
pub struct Staged {
    mutation: Mutation,
    /// Task id the mutation applies to; the temporary id for creations.
    target: TaskId,
    tokens: Vec<UndoToken>,
    slot: QueueSlot,
}

impl Staged {
    pub fn target(&self) -> &TaskId {
        &self.target
    }
}

pub struct MutationCoordinator {
    api: Arc<dyn TaskApi>,
    cache: Arc<TaskCache>,
    queue: TaskQueue,
}

impl MutationCoordinator {
    pub fn new(api: Arc<dyn TaskApi>, cache: Arc<TaskCache>, serialize_per_task: bool) -> Self {
        Self {
            api,
            cache,
            queue: TaskQueue::new(serialize_per_task),
        }
    }

    /// Optimistic phase: patch every affected collection.
    pub fn stage(&self, mutation: Mutation) -> Staged {
        let now = Utc::now();
        let mut tokens = Vec::with_capacity(2);

        let target = match &mutation {
            Mutation::Create { text } => {
                let provisional = Task::provisional(text, now);
                let target = provisional.id.clone();
                tokens.push(
                    self.cache
                        .apply_patch(QueryKind::All, move |tasks| tasks.insert(0, provisional)),
                );
                target
            }
            Mutation::UpdateText { id, text } => {
                for kind in QueryKind::ALL {
                    tokens.push(self.cache.apply_patch(kind, |tasks| {
                        if let Some(task) = find_mut(tasks, id) {
                            task.text = text.as_str().to_string();
                        }
                    }));
                }
                id.clone()
            }
            Mutation::Delete { id } => {
                for kind in QueryKind::ALL {
                    tokens.push(self.cache.apply_patch(kind, |tasks| tasks.retain(|t| &t.id != id)));
                }
                id.clone()
            }
            Mutation::Complete { id } => {
                tokens.push(self.cache.apply_patch(QueryKind::All, |tasks| {
                    if let Some(task) = find_mut(tasks, id) {
                        task.mark_completed(now);
                    }
                }));

                let completed = self.cache.find(QueryKind::All, id);
                tokens.push(self.cache.apply_patch(QueryKind::Completed, |tasks| {
                    match find_mut(tasks, id) {
                        Some(task) => task.mark_completed(now),
                        None => {
                            if let Some(task) = completed {
                                tasks.insert(0, task);
                            }
                        }
                    }
                }));
                id.clone()
            }
            Mutation::Incomplete { id } => {
                tokens.push(self.cache.apply_patch(QueryKind::All, |tasks| {
                    if let Some(task) = find_mut(tasks, id) {
                        task.mark_incomplete();
                    }
                }));
                tokens.push(
                    self.cache
                        .apply_patch(QueryKind::Completed, |tasks| tasks.retain(|t| &t.id != id)),
                );
                id.clone()
            }
        };

        tokens.retain(|token| !token.is_empty());
        let slot = self.queue.enqueue(&target);

        Staged {
            mutation,
            target,
            tokens,
            slot,
        }
    }

    /// Remote phase followed by commit or rollback.
    pub async fn execute(&self, staged: Staged) -> ApiResult<()> {
        let Staged {
            mutation,
            target,
            tokens,
            mut slot,
        } = staged;

        slot.ready().await;

        let result = match &mutation {
            Mutation::Create { text } => self.api.create(text.as_str()).await.map(Some),
            Mutation::UpdateText { id, text } => {
                self.api.update_text(id, text.as_str()).await.map(Some)
            }
            Mutation::Delete { id } => self.api.delete(id).await.map(|()| None),
            Mutation::Complete { id } => self.api.complete(id).await.map(Some),
            Mutation::Incomplete { id } => self.api.incomplete(id).await.map(Some),
        };

        match result {
            Ok(confirmed) => {
                tracing::debug!("{:?} confirmed for task {}", mutation.kind(), target);
                if let Some(server_task) = confirmed {
                    self.reconcile(&mutation, &target, server_task);
                }
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    "{:?} failed for task {}, rolling back: {}",
                    mutation.kind(),
                    target,
                    error
                );
                for token in tokens.into_iter().rev() {
                    self.cache.undo(token);
                }
                Err(error)
            }
        }
    }

    pub async fn apply(&self, mutation: Mutation) -> ApiResult<()> {
        let staged = self.stage(mutation);
        self.execute(staged).await
    }

    /// Run staged mutations concurrently. Each one commits or rolls back on
    /// its own.
    pub async fn execute_all(&self, staged: Vec<Staged>) -> Vec<(TaskId, ApiResult<()>)> {
        join_all(staged.into_iter().map(|staged| async move {
            let target = staged.target().clone();
            (target, self.execute(staged).await)
        }))
        .await
    }

    fn reconcile(&self, mutation: &Mutation, target: &TaskId, server_task: Task) {
        match mutation {
            Mutation::Create { .. } => self.confirm_created(target, server_task),
            Mutation::UpdateText { .. } => {
                for kind in QueryKind::ALL {
                    self.cache.commit(kind, |tasks| {
                        if let Some(task) = find_mut(tasks, &server_task.id) {
                            task.text = server_task.text.clone();
                        }
                    });
                }
            }
            Mutation::Complete { .. } | Mutation::Incomplete { .. } => {
                self.cache.commit(QueryKind::All, |tasks| {
                    if let Some(task) = find_mut(tasks, &server_task.id) {
                        task.completed = server_task.completed;
                        task.completed_date = server_task.completed_date;
                    }
                });
                self.cache.commit(QueryKind::Completed, |tasks| {
                    if !server_task.completed {
                        tasks.retain(|t| t.id != server_task.id);
                        return;
                    }
                    match find_mut(tasks, &server_task.id) {
                        Some(task) => {
                            task.completed = true;
                            task.completed_date = server_task.completed_date;
                        }
                        None => tasks.insert(0, server_task.clone()),
                    }
                });
            }
            Mutation::Delete { .. } => {}
        }
    }

    /// Swap the provisional task for the server's version.
    fn confirm_created(&self, temporary_id: &TaskId, created: Task) {
        self.cache.commit(QueryKind::All, |tasks| {
            let already_listed = tasks.iter().any(|t| t.id == created.id);
            match tasks.iter().position(|t| &t.id == temporary_id) {
                Some(index) if already_listed => {
                    tasks.remove(index);
                }
                Some(index) => tasks[index] = created,
                // A fetch replaced the list while the create was in flight.
                None if !already_listed => {
                    tracing::debug!(
                        "Provisional task {} no longer cached, listing {} first",
                        temporary_id,
                        created.id
                    );
                    tasks.insert(0, created);
                }
                None => {}
            }
        });
    }
}

fn find_mut<'a>(tasks: &'a mut [Task], id: &TaskId) -> Option<&'a mut Task> {
    tasks.iter_mut().find(|task| &task.id == id)
}
