use crate::domain::NowProvider;
use crate::domain::models::{NewTask, Task, TaskPatch};
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::api_client::FocusFlowApi;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_cache::LocalTaskCache;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::time::{sleep, Duration as TokioDuration};

pub type TaskListener = Arc<dyn Fn(&[Task]) + Send + Sync>;

/// Revision of the store when a full fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The list was applied, but writes confirmed after the fetch was issued
    /// were replaced by the older server snapshot.
    OverwroteNewerWrites { missed_revisions: u64 },
}

#[derive(Debug, Default)]
struct StoreState {
    tasks: Vec<Task>,
    revision: u64,
    loaded: bool,
}

/// In-process task list shared by every consumer.
///
/// Mutations happen only after the server confirmed them. Each mutation is
/// persisted to the local cache and delivered to all subscribers in one
/// total order.
pub struct TaskStore {
    cache: Arc<dyn LocalTaskCache>,
    log: Arc<ActivityLog>,
    state: Mutex<StoreState>,
    listeners: Mutex<Vec<(u64, TaskListener)>>,
    next_listener_id: AtomicU64,
    notify_guard: Mutex<()>,
}

impl TaskStore {
    pub fn new(cache: Arc<dyn LocalTaskCache>, log: Arc<ActivityLog>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            log,
            state: Mutex::new(StoreState::default()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            notify_guard: Mutex::new(()),
        })
    }

    /// Last known list, without touching the network. Never fails.
    pub fn load_tasks(&self) -> Vec<Task> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        self.hydrate(&mut state);
        state.tasks.clone()
    }

    fn hydrate(&self, state: &mut StoreState) {
        if state.loaded {
            return;
        }
        state.tasks = match self.cache.read() {
            Ok(Some(tasks)) => tasks,
            Ok(None) => Vec::new(),
            Err(error) => {
                self.log
                    .warn("task_store", &format!("ignoring unreadable task cache: {error}"));
                Vec::new()
            }
        };
        state.loaded = true;
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.state
            .lock()
            .map(|state| state.tasks.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, id: i64) -> Option<Task> {
        self.load_tasks().into_iter().find(|task| task.id == id)
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().map(|state| state.revision).unwrap_or(0)
    }

    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket {
            revision: self.revision(),
        }
    }

    /// Replaces the whole list with a server response.
    pub fn set_tasks(&self, tasks: Vec<Task>) -> Result<(), InfraError> {
        self.mutate(|state| {
            state.tasks = tasks;
            true
        })?;
        Ok(())
    }

    /// Replaces the whole list with the response to the fetch behind `ticket`.
    /// Completion order wins, so the list is applied even when it is older
    /// than writes confirmed in the meantime; that case is reported.
    pub fn set_tasks_from(&self, ticket: FetchTicket, tasks: Vec<Task>) -> Result<ApplyOutcome, InfraError> {
        let mut missed = 0;
        self.mutate(|state| {
            missed = state.revision.saturating_sub(ticket.revision);
            state.tasks = tasks;
            true
        })?;
        if missed == 0 {
            return Ok(ApplyOutcome::Applied);
        }
        self.log.warn(
            "task_store",
            &format!("full refresh issued at revision {} replaced {missed} newer confirmed write(s)", ticket.revision),
        );
        Ok(ApplyOutcome::OverwroteNewerWrites {
            missed_revisions: missed,
        })
    }

    /// Stores a confirmed server row verbatim. Returns false if the id is not cached.
    pub fn update_task(&self, updated: Task) -> Result<bool, InfraError> {
        self.mutate(|state| match state.tasks.iter_mut().find(|task| task.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        })
    }

    pub fn insert_task(&self, created: Task) -> Result<(), InfraError> {
        self.mutate(|state| {
            match state.tasks.iter_mut().find(|task| task.id == created.id) {
                Some(slot) => *slot = created,
                None => state.tasks.push(created),
            }
            true
        })?;
        Ok(())
    }

    pub fn remove_task(&self, id: i64) -> Result<bool, InfraError> {
        self.mutate(|state| {
            let before = state.tasks.len();
            state.tasks.retain(|task| task.id != id);
            state.tasks.len() != before
        })
    }

    /// Registers `listener`; it receives the full list after every change until
    /// the returned subscription is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&[Task]) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }
        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().map(|listeners| listeners.len()).unwrap_or(0)
    }

    fn unsubscribe(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(candidate, _)| *candidate != id);
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task store lock poisoned: {error}")))
    }

    /// Listeners run under `notify_guard`; a listener must not mutate the store.
    fn mutate<F>(&self, apply: F) -> Result<bool, InfraError>
    where
        F: FnOnce(&mut StoreState) -> bool,
    {
        let _order = self
            .notify_guard
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task store notify lock poisoned: {error}")))?;

        let snapshot = {
            let mut state = self.lock_state()?;
            self.hydrate(&mut state);
            if !apply(&mut *state) {
                return Ok(false);
            }
            state.revision += 1;
            state.tasks.clone()
        };

        if let Err(error) = self.cache.write(&snapshot) {
            self.log
                .warn("task_store", &format!("failed to persist task cache: {error}"));
        }

        let listeners = self
            .listeners
            .lock()
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for listener in listeners {
            listener(&snapshot);
        }
        Ok(true)
    }
}

#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<TaskStore>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fresh { tasks: Vec<Task>, apply: ApplyOutcome },
    /// The remote fetch failed; `tasks` is whatever the cache held.
    Cached { tasks: Vec<Task>, error: String },
}

impl FetchOutcome {
    pub fn tasks(&self) -> &[Task] {
        match self {
            Self::Fresh { tasks, .. } | Self::Cached { tasks, .. } => tasks,
        }
    }

    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            Self::Fresh { tasks, .. } | Self::Cached { tasks, .. } => tasks,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }
}

/// Pairs the shared [`TaskStore`] with the remote API using confirm-then-apply.
pub struct TaskService<A>
where
    A: FocusFlowApi,
{
    api: Arc<A>,
    store: Arc<TaskStore>,
    log: Arc<ActivityLog>,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
    last_error: Mutex<Option<String>>,
}

impl<A> TaskService<A>
where
    A: FocusFlowApi,
{
    pub fn new(api: Arc<A>, store: Arc<TaskStore>, log: Arc<ActivityLog>) -> Self {
        Self {
            api,
            store,
            log,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
            last_error: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Message of the most recent failed call, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    pub async fn fetch_tasks(&self) -> FetchOutcome {
        let _ = self.store.load_tasks();
        let ticket = self.store.begin_fetch();

        let fetched = match self.list_tasks_with_retry().await {
            Ok(tasks) => tasks,
            Err(error) => return self.fall_back_to_cache(&error),
        };

        match self.store.set_tasks_from(ticket, fetched) {
            Ok(apply) => {
                self.record_success();
                FetchOutcome::Fresh {
                    tasks: self.store.snapshot(),
                    apply,
                }
            }
            Err(error) => self.fall_back_to_cache(&error),
        }
    }

    pub async fn create_task(&self, task: NewTask) -> Result<Task, InfraError> {
        let task = task.normalized();
        task.validate().map_err(InfraError::InvalidInput)?;

        let created = self
            .api
            .create_task(&task)
            .await
            .map_err(|error| self.record_failure("create_task", error))?;
        self.store.insert_task(created.clone())?;
        self.record_success();
        self.log
            .info("create_task", &format!("created task_id={}", created.id));
        Ok(created)
    }

    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Task, InfraError> {
        patch.validate().map_err(InfraError::InvalidInput)?;

        let updated = self
            .api
            .update_task(id, &patch)
            .await
            .map_err(|error| self.record_failure("update_task", error))?;
        if updated.id != id {
            return Err(self.record_failure(
                "update_task",
                InfraError::Payload(format!("update of task {id} returned task {}", updated.id)),
            ));
        }
        if !self.store.update_task(updated.clone())? {
            self.log.warn(
                "update_task",
                &format!("confirmed task_id={id} is not in the local cache"),
            );
        }
        self.record_success();
        self.log.info("update_task", &format!("updated task_id={id}"));
        Ok(updated)
    }

    pub async fn delete_task(&self, id: i64) -> Result<bool, InfraError> {
        self.api
            .delete_task(id)
            .await
            .map_err(|error| self.record_failure("delete_task", error))?;
        let removed = self.store.remove_task(id)?;
        self.record_success();
        self.log.info("delete_task", &format!("deleted task_id={id}"));
        Ok(removed)
    }

    pub async fn toggle_task_done(&self, id: i64) -> Result<Task, InfraError> {
        let current = self
            .store
            .get(id)
            .ok_or_else(|| InfraError::InvalidInput(format!("task not found: {id}")))?;
        let now = (self.now_provider)().to_rfc3339();
        self.update_task(id, TaskPatch::completion(!current.is_done(), &now))
            .await
    }

    pub async fn complete_task(&self, id: i64) -> Result<Task, InfraError> {
        let now = (self.now_provider)().to_rfc3339();
        self.update_task(id, TaskPatch::completion(true, &now)).await
    }

    async fn list_tasks_with_retry(&self) -> Result<Vec<Task>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.api.list_tasks().await {
                Ok(tasks) => return Ok(tasks),
                Err(error) if error.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn fall_back_to_cache(&self, error: &InfraError) -> FetchOutcome {
        let message = error.to_string();
        self.log.warn(
            "fetch_tasks",
            &format!("remote fetch failed, showing cached tasks: {message}"),
        );
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(message.clone());
        }
        FetchOutcome::Cached {
            tasks: self.store.load_tasks(),
            error: message,
        }
    }

    fn record_failure(&self, source: &str, error: InfraError) -> InfraError {
        self.log.error(source, &error.to_string());
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(error.to_string());
        }
        error
    }

    fn record_success(&self) {
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = None;
        }
    }
}
