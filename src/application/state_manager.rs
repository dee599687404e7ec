use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

use super::cache::{FetchStart, FetchStatus, FetchTicket, TaskCache};
use super::error_state::{describe_failure, ErrorState};
use super::mutations::{Mutation, MutationCoordinator};
use super::pending::{BulkKind, PendingKey, PendingOperations};
use super::view::{derive_view, TaskView, ViewKey, ViewSelector};
use crate::domain::{Filter, QueryKind, Task, TaskId, TaskText};
use crate::ports::{self, ApiResult, AppConfig, TaskApi};

pub const REFRESH_FAILED: &str = "Failed to refresh data";

/// What became of a user intent. Failures are reported through the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    Failed,
    Ignored,
}

/// Wakes up whenever the view may have changed.
pub struct ViewChanges {
    cache: watch::Receiver<u64>,
    local: watch::Receiver<u64>,
}

impl ViewChanges {
    /// True if anything changed since the last call. Marks the change seen.
    pub fn has_changed(&mut self) -> bool {
        let cache = self.cache.has_changed().unwrap_or(false);
        let local = self.local.has_changed().unwrap_or(false);
        if cache {
            self.cache.borrow_and_update();
        }
        if local {
            self.local.borrow_and_update();
        }
        cache || local
    }
}

/// Entry point for the presentation layer: read the view, send intents.
pub struct StateManager {
    api: Arc<dyn TaskApi>,
    cache: Arc<TaskCache>,
    coordinator: MutationCoordinator,
    pending: PendingOperations,
    errors: ErrorState,
    filter: RwLock<Filter>,
    selector: ViewSelector,
    stale_after: Duration,
    // Filter and error changes; the cache announces its own.
    local_changes: watch::Sender<u64>,
}

impl StateManager {
    pub fn new(api: Arc<dyn TaskApi>, config: &AppConfig) -> Self {
        let cache = Arc::new(TaskCache::new());
        let coordinator =
            MutationCoordinator::new(api.clone(), cache.clone(), config.serialize_task_mutations);
        let (local_changes, _) = watch::channel(0);

        Self {
            api,
            cache,
            coordinator,
            pending: PendingOperations::new(),
            errors: ErrorState::new(),
            filter: RwLock::new(Filter::default()),
            selector: ViewSelector::new(),
            stale_after: stale_window(config.stale_after_seconds),
            local_changes,
        }
    }

    // ---- Read side ----

    pub fn view(&self) -> Arc<TaskView> {
        let filter = self.filter();
        let source = self.cache.snapshot(filter.query_kind());
        let (error_revision, message) = self.errors.snapshot();

        let key = ViewKey {
            filter,
            source_revision: source.revision,
            error_revision,
        };
        self.selector
            .select(key, || derive_view(filter, &source, message))
    }

    pub fn filter(&self) -> Filter {
        *self.filter.read()
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.pending.is_pending(&PendingKey::Task(id.clone()))
    }

    pub fn is_bulk_pending(&self, bulk: BulkKind) -> bool {
        self.pending.is_pending(&PendingKey::Bulk(bulk))
    }

    pub fn subscribe(&self) -> ViewChanges {
        ViewChanges {
            cache: self.cache.subscribe(),
            local: self.local_changes.subscribe(),
        }
    }

    // ---- Filter and loading ----

    /// Switch the displayed subset. Never fetches.
    pub fn set_filter(&self, filter: Filter) {
        let changed = {
            let mut current = self.filter.write();
            let changed = *current != filter;
            *current = filter;
            changed
        };

        if changed {
            tracing::debug!("Filter set to {}", filter);
            self.touch();
        }
    }

    pub async fn activate_filter(&self, filter: Filter) -> IntentOutcome {
        self.set_filter(filter);
        self.ensure_loaded().await
    }

    /// Fetch the active filter's collection if it was never loaded, failed,
    /// or went stale. Joins a fetch that is already running.
    pub async fn ensure_loaded(&self) -> IntentOutcome {
        let kind = self.filter().query_kind();
        let state = self.cache.snapshot(kind);
        if state.status != FetchStatus::Loading && !state.needs_fetch(self.stale_after, Utc::now()) {
            return IntentOutcome::Ignored;
        }

        match self.fetch(kind).await {
            Ok(()) => IntentOutcome::Applied,
            Err(_) => IntentOutcome::Failed,
        }
    }

    /// Force a fresh read of the active collection.
    pub async fn retry(&self) -> IntentOutcome {
        let kind = self.filter().query_kind();
        tracing::info!("Retrying {} fetch", kind);

        match self.refetch(kind).await {
            Ok(()) => {
                self.clear_error();
                IntentOutcome::Applied
            }
            Err(e) => {
                self.report(describe_failure(REFRESH_FAILED, &e));
                IntentOutcome::Failed
            }
        }
    }

    pub fn dismiss_error(&self) -> IntentOutcome {
        let cleared = self.clear_error();
        let dismissed = self.cache.dismiss_error(self.filter().query_kind());

        if cleared || dismissed {
            IntentOutcome::Applied
        } else {
            IntentOutcome::Ignored
        }
    }

    // ---- Single-task intents ----

    pub async fn create_task(&self, text: &str) -> IntentOutcome {
        match TaskText::parse(text) {
            Ok(text) => self.run_single(Mutation::Create { text }).await,
            Err(e) => {
                tracing::debug!("Ignoring create: {}", e);
                IntentOutcome::Ignored
            }
        }
    }

    pub async fn update_task(&self, id: &TaskId, text: &str) -> IntentOutcome {
        match TaskText::parse(text) {
            Ok(text) if self.current_text(id).as_deref() == Some(text.as_str()) => {
                tracing::debug!("Ignoring update of {}: text unchanged", id);
                IntentOutcome::Ignored
            }
            Ok(text) => {
                self.run_single(Mutation::UpdateText {
                    id: id.clone(),
                    text,
                })
                .await
            }
            Err(e) => {
                tracing::debug!("Ignoring update of {}: {}", id, e);
                IntentOutcome::Ignored
            }
        }
    }

    pub async fn delete_task(&self, id: &TaskId) -> IntentOutcome {
        self.run_single(Mutation::Delete { id: id.clone() }).await
    }

    /// Set the completion state of a task to `completed`.
    pub async fn toggle_complete(&self, id: &TaskId, completed: bool) -> IntentOutcome {
        let id = id.clone();
        let mutation = if completed {
            Mutation::Complete { id }
        } else {
            Mutation::Incomplete { id }
        };
        self.run_single(mutation).await
    }

    // ---- Bulk intents ----

    /// Complete (`checked`) or reopen every displayed task that needs it.
    pub async fn toggle_all(&self, checked: bool) -> IntentOutcome {
        let bulk = if checked {
            BulkKind::CompleteAll
        } else {
            BulkKind::IncompleteAll
        };
        let targets = self.displayed_ids(|task| task.completed != checked);
        self.run_bulk(bulk, targets).await
    }

    pub async fn delete_completed(&self) -> IntentOutcome {
        let targets = self.displayed_ids(|task| task.completed);
        self.run_bulk(BulkKind::DeleteCompleted, targets).await
    }

    // ---- Internals ----

    /// Read `kind`, joining a read already in flight.
    async fn fetch(&self, kind: QueryKind) -> ApiResult<()> {
        match self.cache.begin_fetch(kind, false) {
            FetchStart::Started(ticket) => self.run_fetch(ticket).await,
            FetchStart::InFlight => {
                tracing::debug!("Joining in-flight {} fetch", kind);
                self.cache.wait_for_fetch(kind).await
            }
        }
    }

    async fn refetch(&self, kind: QueryKind) -> ApiResult<()> {
        match self.cache.begin_fetch(kind, true) {
            FetchStart::Started(ticket) => self.run_fetch(ticket).await,
            FetchStart::InFlight => self.cache.wait_for_fetch(kind).await,
        }
    }

    async fn run_fetch(&self, ticket: FetchTicket) -> ApiResult<()> {
        tracing::debug!("Fetching {} tasks", ticket.kind);
        let result = ports::list(self.api.as_ref(), ticket.kind).await;

        let outcome = match &result {
            Ok(tasks) => {
                tracing::info!("Loaded {} {} task(s)", tasks.len(), ticket.kind);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{}: {}", ticket.kind.load_failure_message(), e);
                Err(e.clone())
            }
        };

        self.cache.finish_fetch(ticket, result);
        outcome
    }

    async fn run_single(&self, mutation: Mutation) -> IntentOutcome {
        let kind = mutation.kind();

        let guard = match mutation.task_id() {
            Some(id) if id.is_temporary() => {
                tracing::debug!("Ignoring {:?} on unconfirmed task {}", kind, id);
                return IntentOutcome::Ignored;
            }
            Some(id) if !self.is_cached(id) => {
                tracing::debug!("Ignoring {:?} on unknown task {}", kind, id);
                return IntentOutcome::Ignored;
            }
            Some(id) => match self.pending.try_begin(PendingKey::Task(id.clone()), kind) {
                Some(guard) => Some(guard),
                None => {
                    tracing::debug!("{:?} already pending for task {}", kind, id);
                    return IntentOutcome::Ignored;
                }
            },
            None => None,
        };

        let failure_message = mutation.failure_message();
        let staged = self.coordinator.stage(mutation);
        let _guard = guard.or_else(|| {
            self.pending
                .try_begin(PendingKey::Task(staged.target().clone()), kind)
        });

        match self.coordinator.execute(staged).await {
            Ok(()) => {
                self.clear_error();
                IntentOutcome::Applied
            }
            Err(e) => {
                self.report(describe_failure(failure_message, &e));
                IntentOutcome::Failed
            }
        }
    }

    async fn run_bulk(&self, bulk: BulkKind, targets: Vec<TaskId>) -> IntentOutcome {
        let kind = bulk.item_kind();
        let Some(_bulk_guard) = self.pending.try_begin(PendingKey::Bulk(bulk), kind) else {
            tracing::debug!("{:?} already running", bulk);
            return IntentOutcome::Ignored;
        };

        let mut guards = Vec::with_capacity(targets.len());
        let mut staged = Vec::with_capacity(targets.len());
        for id in targets {
            if id.is_temporary() {
                continue;
            }
            let Some(guard) = self.pending.try_begin(PendingKey::Task(id.clone()), kind) else {
                continue;
            };
            guards.push(guard);
            staged.push(self.coordinator.stage(bulk_mutation(bulk, id)));
        }

        if staged.is_empty() {
            return IntentOutcome::Ignored;
        }

        let count = staged.len();
        let results = self.coordinator.execute_all(staged).await;
        drop(guards);

        let failures: Vec<_> = results
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|e| (id, e)))
            .collect();

        match failures.first() {
            None => {
                tracing::info!("{:?} applied to {} task(s)", bulk, count);
                self.clear_error();
                IntentOutcome::Applied
            }
            Some((id, error)) => {
                tracing::warn!(
                    "{:?}: {} of {} task(s) failed, first was {}",
                    bulk,
                    failures.len(),
                    count,
                    id
                );
                self.report(describe_failure(bulk.failure_message(), error));
                IntentOutcome::Failed
            }
        }
    }

    fn displayed_ids(&self, qualifies: impl Fn(&Task) -> bool) -> Vec<TaskId> {
        self.view()
            .tasks
            .iter()
            .filter(|task| qualifies(*task))
            .map(|task| task.id.clone())
            .collect()
    }

    fn is_cached(&self, id: &TaskId) -> bool {
        QueryKind::ALL
            .iter()
            .any(|kind| self.cache.tasks(*kind).iter().any(|task| &task.id == id))
    }

    fn current_text(&self, id: &TaskId) -> Option<String> {
        QueryKind::ALL
            .iter()
            .find_map(|kind| self.cache.find(*kind, id))
            .map(|task| task.text)
    }

    fn report(&self, message: String) {
        self.errors.set(message);
        self.touch();
    }

    fn clear_error(&self) -> bool {
        let cleared = self.errors.clear();
        if cleared {
            self.touch();
        }
        cleared
    }

    fn touch(&self) {
        self.local_changes.send_modify(|revision| *revision += 1);
    }
}

/// Values past what chrono can hold mean "never stale".
fn stale_window(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn bulk_mutation(bulk: BulkKind, id: TaskId) -> Mutation {
    match bulk {
        BulkKind::CompleteAll => Mutation::Complete { id },
        BulkKind::IncompleteAll => Mutation::Incomplete { id },
        BulkKind::DeleteCompleted => Mutation::Delete { id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mutations::testing::{Request, ScriptedApi};
    use crate::ports::{ApiError, ErrorDetail, MockTaskApi};
    use chrono::{DateTime, TimeZone};
    use mockall::Sequence;
    use tokio_test::{assert_pending, assert_ready};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn task(id: &str, completed: bool) -> Task {
        Task {
            id: id.into(),
            text: format!("task {id}"),
            completed,
            created_date: at(1_000),
            completed_date: completed.then(|| at(2_000)),
        }
    }

    fn manager(api: impl TaskApi + 'static) -> StateManager {
        StateManager::new(Arc::new(api), &AppConfig::default())
    }

    fn always_stale(api: impl TaskApi + 'static) -> StateManager {
        let config = AppConfig {
            stale_after_seconds: 0,
            ..AppConfig::default()
        };
        StateManager::new(Arc::new(api), &config)
    }

    fn seed(manager: &StateManager, kind: QueryKind, tasks: Vec<Task>) {
        let FetchStart::Started(ticket) = manager.cache.begin_fetch(kind, true) else {
            panic!("forced fetch always starts");
        };
        manager.cache.finish_fetch(ticket, Ok(tasks));
    }

    fn server_error(status: u16) -> ApiError {
        ApiError::Http {
            status,
            detail: None,
        }
    }

    #[tokio::test]
    async fn test_incomplete_filter_reads_all_without_fetching() {
        // No expectations: any remote call fails the test.
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", true), task("2", false)]);

        assert_eq!(manager.activate_filter(Filter::Incomplete).await, IntentOutcome::Ignored);

        let view = manager.view();
        assert_eq!(view.filter, Filter::Incomplete);
        assert_eq!(view.tasks.len(), 1);
        assert_eq!(view.tasks[0].id.as_str(), "2");
        assert!(!view.loading);
        assert_eq!(view.stats.remaining, 1);
    }

    #[tokio::test]
    async fn test_activating_completed_filter_fetches_once() {
        let mut api = MockTaskApi::new();
        api.expect_list_completed()
            .times(1)
            .returning(|| Ok(vec![task("5", true)]));
        let manager = manager(api);

        assert!(manager.view().loading);
        assert_eq!(manager.activate_filter(Filter::Completed).await, IntentOutcome::Applied);
        assert_eq!(manager.activate_filter(Filter::Completed).await, IntentOutcome::Ignored);

        let view = manager.view();
        assert!(!view.loading);
        assert_eq!(view.tasks.len(), 1);
        assert!(view.stats.all_completed);
    }

    #[test]
    fn test_stale_window_saturates_instead_of_panicking() {
        assert_eq!(stale_window(300), Duration::seconds(300));
        assert_eq!(stale_window(100_000_000_000_000_000), Duration::MAX);
        assert_eq!(stale_window(u64::MAX), Duration::MAX);

        let config = AppConfig {
            stale_after_seconds: u64::MAX,
            ..AppConfig::default()
        };
        let manager = StateManager::new(Arc::new(MockTaskApi::new()), &config);
        seed(&manager, QueryKind::All, vec![task("1", false)]);
        assert!(!manager
            .cache
            .snapshot(QueryKind::All)
            .needs_fetch(manager.stale_after, Utc::now()));
    }

    #[test]
    fn test_concurrent_loads_share_one_request() {
        let (api, mut calls) = ScriptedApi::new();
        let manager = manager(api);

        let mut first = tokio_test::task::spawn(manager.ensure_loaded());
        let mut second = tokio_test::task::spawn(manager.ensure_loaded());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        let call = calls.try_recv().unwrap();
        assert_eq!(call.request, Request::ListAll);
        assert!(calls.try_recv().is_err());
        call.succeed_list(vec![task("1", false)]);

        assert_eq!(assert_ready!(first.poll()), IntentOutcome::Applied);
        assert_eq!(assert_ready!(second.poll()), IntentOutcome::Applied);
        assert_eq!(manager.view().tasks.len(), 1);
    }

    #[test]
    fn test_create_survives_a_fetch_that_lands_first() {
        let (api, mut calls) = ScriptedApi::new();
        let manager = manager(api);

        let mut load = tokio_test::task::spawn(manager.ensure_loaded());
        assert_pending!(load.poll());
        let mut create = tokio_test::task::spawn(manager.create_task("buy milk"));
        assert_pending!(create.poll());

        let list = calls.try_recv().unwrap();
        assert_eq!(list.request, Request::ListAll);
        let created = calls.try_recv().unwrap();
        assert_eq!(created.request, Request::Create("buy milk".to_string()));

        // The list was read before the create reached the server.
        list.succeed_list(vec![]);
        assert_eq!(assert_ready!(load.poll()), IntentOutcome::Applied);

        created.succeed(Task {
            text: "buy milk".to_string(),
            ..task("42", false)
        });
        assert_eq!(assert_ready!(create.poll()), IntentOutcome::Applied);

        let ids: Vec<_> = manager
            .view()
            .tasks
            .iter()
            .map(|t| t.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["42"]);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_data_and_offers_retry() {
        let mut api = MockTaskApi::new();
        let mut seq = Sequence::new();
        api.expect_list_all()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(server_error(503)));
        api.expect_list_all()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![task("1", false), task("2", false)]));
        let manager = always_stale(api);
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        assert_eq!(manager.ensure_loaded().await, IntentOutcome::Failed);
        let view = manager.view();
        assert_eq!(view.display_error.as_deref(), Some("API Error: 503"));
        assert!(view.retry_available);
        assert_eq!(view.tasks.len(), 1);

        assert_eq!(manager.retry().await, IntentOutcome::Applied);
        let view = manager.view();
        assert_eq!(view.display_error, None);
        assert!(!view.retry_available);
        assert_eq!(view.tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_retry_reports_refresh_failure() {
        let mut api = MockTaskApi::new();
        api.expect_list_all().returning(|| {
            Err(ApiError::Http {
                status: 500,
                detail: Some(ErrorDetail::Message("maintenance".to_string())),
            })
        });
        let manager = manager(api);

        assert_eq!(manager.retry().await, IntentOutcome::Failed);
        let view = manager.view();
        assert_eq!(
            view.display_error.as_deref(),
            Some("Failed to refresh data: maintenance")
        );
        assert!(view.retry_available);
    }

    #[tokio::test]
    async fn test_dismiss_error_hides_everything() {
        let mut api = MockTaskApi::new();
        api.expect_list_all().returning(|| Err(server_error(500)));
        let manager = manager(api);

        manager.ensure_loaded().await;
        manager.report("Failed to delete task (Server Error 500)".to_string());
        assert!(manager.view().display_error.is_some());

        assert_eq!(manager.dismiss_error(), IntentOutcome::Applied);
        let view = manager.view();
        assert_eq!(view.display_error, None);
        assert!(!view.retry_available);
        assert_eq!(manager.dismiss_error(), IntentOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored_without_remote_call() {
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        assert_eq!(manager.create_task("   ").await, IntentOutcome::Ignored);
        assert_eq!(manager.update_task(&"1".into(), "").await, IntentOutcome::Ignored);
        assert_eq!(manager.view().tasks.len(), 1);
        assert_eq!(manager.view().display_error, None);
    }

    #[tokio::test]
    async fn test_unchanged_text_is_ignored_and_keeps_error() {
        // No expectations: any remote call fails the test.
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", false)]);
        manager.report("Failed to delete task".to_string());

        assert_eq!(
            manager.update_task(&"1".into(), "  task 1 ").await,
            IntentOutcome::Ignored
        );
        assert!(!manager.is_pending(&"1".into()));
        assert_eq!(
            manager.view().display_error.as_deref(),
            Some("Failed to delete task")
        );
    }

    #[tokio::test]
    async fn test_intents_on_unconfirmed_or_unknown_tasks_are_ignored() {
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        let temporary = TaskId::temporary();
        assert_eq!(manager.delete_task(&temporary).await, IntentOutcome::Ignored);
        assert_eq!(
            manager.toggle_complete(&"missing".into(), true).await,
            IntentOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_sets_message_and_success_clears_it() {
        let mut api = MockTaskApi::new();
        api.expect_create().returning(|text| {
            Ok(Task {
                id: "9".into(),
                text: text.to_string(),
                completed: false,
                created_date: at(3_000),
                completed_date: None,
            })
        });
        api.expect_delete().returning(|_| Err(server_error(500)));
        let manager = manager(api);
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        assert_eq!(manager.delete_task(&"1".into()).await, IntentOutcome::Failed);
        let view = manager.view();
        assert_eq!(
            view.display_error.as_deref(),
            Some("Failed to delete task (Server Error 500)")
        );
        assert!(!view.retry_available);
        assert_eq!(view.tasks.len(), 1);

        assert_eq!(manager.create_task("  write tests ").await, IntentOutcome::Applied);
        let view = manager.view();
        assert_eq!(view.display_error, None);
        assert_eq!(view.tasks[0].text, "write tests");
        assert_eq!(view.tasks[0].id.as_str(), "9");
    }

    #[tokio::test]
    async fn test_delete_completed_with_one_failure() {
        let mut api = MockTaskApi::new();
        api.expect_delete()
            .times(3)
            .returning(|id| if id.as_str() == "b" { Err(server_error(500)) } else { Ok(()) });
        let manager = manager(api);
        seed(
            &manager,
            QueryKind::All,
            vec![task("a", true), task("b", true), task("c", true), task("d", false)],
        );

        assert_eq!(manager.delete_completed().await, IntentOutcome::Failed);

        let view = manager.view();
        let ids: Vec<&str> = view.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert_eq!(
            view.display_error.as_deref(),
            Some("Failed to delete completed tasks (Server Error 500)")
        );
        assert!(!manager.is_bulk_pending(BulkKind::DeleteCompleted));
    }

    #[tokio::test]
    async fn test_toggle_all_only_touches_tasks_that_need_it() {
        let mut api = MockTaskApi::new();
        api.expect_complete()
            .times(2)
            .returning(|id| {
                let mut done = task(id.as_str(), false);
                done.mark_completed(at(4_000));
                Ok(done)
            });
        let manager = manager(api);
        seed(
            &manager,
            QueryKind::All,
            vec![task("1", false), task("2", true), task("3", false)],
        );

        assert_eq!(manager.toggle_all(true).await, IntentOutcome::Applied);
        let view = manager.view();
        assert!(view.stats.all_completed);
        assert_eq!(view.stats.completed, 3);
    }

    #[tokio::test]
    async fn test_bulk_with_nothing_to_do_is_ignored() {
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        assert_eq!(manager.delete_completed().await, IntentOutcome::Ignored);
        assert_eq!(manager.toggle_all(false).await, IntentOutcome::Ignored);
    }

    #[test]
    fn test_pending_marker_tracks_in_flight_mutation() {
        let (api, mut calls) = ScriptedApi::new();
        let manager = manager(api);
        seed(&manager, QueryKind::All, vec![task("7", false)]);
        let id = TaskId::from("7");

        let mut complete = tokio_test::task::spawn(manager.toggle_complete(&id, true));
        assert_pending!(complete.poll());
        assert!(manager.is_pending(&id));
        assert!(manager.view().tasks[0].completed);

        // A second identical intent while the first is in flight is dropped.
        let mut duplicate = tokio_test::task::spawn(manager.toggle_complete(&id, true));
        assert_eq!(assert_ready!(duplicate.poll()), IntentOutcome::Ignored);

        calls
            .try_recv()
            .unwrap()
            .fail(ApiError::Network("connection reset".to_string()));
        assert_eq!(assert_ready!(complete.poll()), IntentOutcome::Failed);

        assert!(!manager.is_pending(&id));
        let view = manager.view();
        assert!(!view.tasks[0].completed);
        assert_eq!(
            view.display_error.as_deref(),
            Some("Failed to complete task: connection reset")
        );
    }

    #[test]
    fn test_view_is_memoized_until_something_changes() {
        let manager = manager(MockTaskApi::new());
        seed(&manager, QueryKind::All, vec![task("1", false)]);

        let first = manager.view();
        assert!(Arc::ptr_eq(&first, &manager.view()));

        manager.set_filter(Filter::Incomplete);
        let filtered = manager.view();
        assert!(!Arc::ptr_eq(&first, &filtered));
        assert_eq!(manager.filter(), Filter::Incomplete);
    }

    #[test]
    fn test_subscribers_see_filter_and_cache_changes() {
        let manager = manager(MockTaskApi::new());
        let mut changes = manager.subscribe();
        assert!(!changes.has_changed());

        manager.set_filter(Filter::Completed);
        assert!(changes.has_changed());
        assert!(!changes.has_changed());

        seed(&manager, QueryKind::Completed, vec![task("1", true)]);
        assert!(changes.has_changed());

        // Same filter again is not a change.
        manager.set_filter(Filter::Completed);
        assert!(!changes.has_changed());
    }
}
