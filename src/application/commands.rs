use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::focus_timer::FocusTimer;
use crate::application::session_recorder::SessionRecorder;
use crate::application::task_sync::{FetchOutcome, TaskService, TaskStore};
use crate::domain::models::{NewTask, Task, TimerSettings, UserSettings};
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::api_client::{FocusFlowApi, ReqwestFocusFlowApi};
use crate::infrastructure::config::{save_timer_settings, ApiConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_cache::SqliteTaskCache;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a front end needs, built once per process.
pub struct AppState<A = ReqwestFocusFlowApi>
where
    A: FocusFlowApi,
{
    config_dir: PathBuf,
    database_path: PathBuf,
    api_config: ApiConfig,
    log: Arc<ActivityLog>,
    api: Arc<A>,
    tasks: TaskService<A>,
    timer_settings: Mutex<TimerSettings>,
}

impl AppState<ReqwestFocusFlowApi> {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::from_lookup(workspace_root, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(workspace_root: PathBuf, lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap = bootstrap_workspace(&workspace_root, lookup)?;
        let api = Arc::new(ReqwestFocusFlowApi::new(&bootstrap.configs.api)?);
        Ok(Self::with_api(bootstrap, api))
    }
}

impl<A> AppState<A>
where
    A: FocusFlowApi,
{
    pub fn with_api(bootstrap: BootstrapResult, api: Arc<A>) -> Self {
        let log = Arc::new(ActivityLog::new(&bootstrap.logs_dir));
        let cache = Arc::new(SqliteTaskCache::new(&bootstrap.database_path));
        let store = TaskStore::new(cache, Arc::clone(&log));
        store.load_tasks();
        let tasks = TaskService::new(Arc::clone(&api), store, Arc::clone(&log));
        log.info(
            "bootstrap",
            &format!("workspace ready at {}", bootstrap.workspace_root.display()),
        );

        Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            api_config: bootstrap.configs.api,
            log,
            api,
            tasks,
            timer_settings: Mutex::new(bootstrap.configs.timer),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api_config
    }

    pub fn log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn tasks(&self) -> &TaskService<A> {
        &self.tasks
    }

    pub fn timer_settings(&self) -> Result<TimerSettings, InfraError> {
        Ok(self.lock_settings()?.clone())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log.error(command, &error.to_string());
        error.to_string()
    }

    fn lock_settings(&self) -> Result<MutexGuard<'_, TimerSettings>, InfraError> {
        self.timer_settings
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("settings lock poisoned: {error}")))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub stale: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    Server,
    Local,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub settings: TimerSettings,
    pub source: SettingsSource,
}

pub async fn list_tasks_impl<A>(state: &AppState<A>, refresh: bool) -> TaskListResponse
where
    A: FocusFlowApi,
{
    if !refresh {
        return TaskListResponse {
            tasks: state.tasks.store().load_tasks(),
            stale: true,
            error: None,
        };
    }
    match state.tasks.fetch_tasks().await {
        FetchOutcome::Fresh { tasks, .. } => TaskListResponse {
            tasks,
            stale: false,
            error: None,
        },
        FetchOutcome::Cached { tasks, error } => TaskListResponse {
            tasks,
            stale: true,
            error: Some(error),
        },
    }
}

pub async fn create_task_impl<A>(
    state: &AppState<A>,
    title: String,
    description: Option<String>,
    priority: Option<i32>,
    estimated_minutes: Option<u32>,
    tags: Vec<String>,
) -> Result<Task, InfraError>
where
    A: FocusFlowApi,
{
    let tags = tags.iter().map(String::as_str).collect::<Vec<_>>();
    let mut task = NewTask::titled(title).with_tags(&tags);
    task.description = description;
    task.priority = priority;
    task.estimated_minutes = estimated_minutes;
    state.tasks.create_task(task).await
}

pub async fn toggle_task_impl<A>(state: &AppState<A>, task_id: i64) -> Result<Task, InfraError>
where
    A: FocusFlowApi,
{
    state.tasks.toggle_task_done(task_id).await
}

pub async fn complete_task_impl<A>(state: &AppState<A>, task_id: i64) -> Result<Task, InfraError>
where
    A: FocusFlowApi,
{
    state.tasks.complete_task(task_id).await
}

pub async fn delete_task_impl<A>(state: &AppState<A>, task_id: i64) -> Result<bool, InfraError>
where
    A: FocusFlowApi,
{
    state.tasks.delete_task(task_id).await
}

/// Server values win over `config/timer.json`. When the server is
/// unreachable the local file is used as-is.
pub async fn get_settings_impl<A>(state: &AppState<A>) -> Result<SettingsResponse, InfraError>
where
    A: FocusFlowApi,
{
    match state.api.get_settings().await {
        Ok(remote) => {
            let mut settings = state.lock_settings()?;
            let merged = remote.apply_to(&settings);
            *settings = merged.clone();
            Ok(SettingsResponse {
                settings: merged,
                source: SettingsSource::Server,
            })
        }
        Err(error) => {
            state
                .log
                .warn("get_settings", &format!("using local timer settings: {error}"));
            Ok(SettingsResponse {
                settings: state.timer_settings()?,
                source: SettingsSource::Local,
            })
        }
    }
}

pub async fn update_settings_impl<A>(
    state: &AppState<A>,
    patch: UserSettings,
) -> Result<TimerSettings, InfraError>
where
    A: FocusFlowApi,
{
    patch.validate_patch().map_err(InfraError::InvalidInput)?;
    let base = state.timer_settings()?;
    patch
        .apply_to(&base)
        .validate()
        .map_err(InfraError::InvalidInput)?;

    let confirmed = state.api.update_settings(&patch).await?;
    let merged = confirmed.apply_to(&base);
    save_timer_settings(&state.config_dir, &merged)?;
    *state.lock_settings()? = merged.clone();
    state.log.info("update_settings", "timer settings updated");
    Ok(merged)
}

/// Must run inside a tokio runtime; the recorder is spawned onto it.
pub fn start_focus_timer_impl<A>(state: &AppState<A>) -> Result<FocusTimer, InfraError>
where
    A: FocusFlowApi + 'static,
{
    let settings = state.timer_settings()?;
    let recorder = SessionRecorder::new(
        Arc::clone(&state.api),
        Arc::clone(&state.log),
        settings.timer_mode.clone(),
    );
    Ok(FocusTimer::with_recorder(settings, recorder))
}
