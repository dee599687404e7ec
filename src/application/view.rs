//! Derived view over the cache: what the presentation layer renders.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use super::cache::QueryState;
use super::error_state::describe_fetch_error;
use crate::domain::{Filter, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    pub all_completed: bool,
    pub has_completed: bool,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|task| task.completed).count();

        Self {
            total,
            completed,
            remaining: total - completed,
            all_completed: total > 0 && completed == total,
            has_completed: completed > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskView {
    pub filter: Filter,
    pub tasks: Arc<Vec<Task>>,
    pub loading: bool,
    pub stats: TaskStats,
    pub display_error: Option<String>,
    /// A fetch error is on screen and can be retried.
    pub retry_available: bool,
}

/// Compute the view for `filter`. `source` must be the collection the
/// filter reads (see [`Filter::query_kind`]).
pub fn derive_view(filter: Filter, source: &QueryState, error_message: Option<String>) -> TaskView {
    let tasks = match filter {
        Filter::All | Filter::Completed => source.tasks.clone(),
        Filter::Incomplete => Arc::new(
            source
                .tasks
                .iter()
                .filter(|task| !task.completed)
                .cloned()
                .collect(),
        ),
    };

    let fetch_error = source.visible_error();
    let display_error = error_message.or_else(|| fetch_error.map(describe_fetch_error));

    TaskView {
        filter,
        stats: TaskStats::from_tasks(&tasks),
        tasks,
        loading: source.is_loading(),
        display_error,
        retry_available: fetch_error.is_some(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewKey {
    pub filter: Filter,
    pub source_revision: u64,
    pub error_revision: u64,
}

/// Memoizes [`derive_view`] on the revisions it depends on.
#[derive(Debug, Default)]
pub struct ViewSelector {
    last: Mutex<Option<(ViewKey, Arc<TaskView>)>>,
}

impl ViewSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<F>(&self, key: ViewKey, compute: F) -> Arc<TaskView>
    where
        F: FnOnce() -> TaskView,
    {
        let mut last = self.last.lock();
        if let Some((cached_key, view)) = last.as_ref() {
            if *cached_key == key {
                return view.clone();
            }
        }

        let view = Arc::new(compute());
        *last = Some((key, view.clone()));
        view
    }
}
