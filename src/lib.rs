pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::AppState;
pub use application::focus_timer::FocusTimer;
pub use application::guard_runtime::{DistractionListener, GuardHost, GuardRuntime};
pub use application::session_recorder::{RecorderStatus, SessionRecorder};
pub use application::task_sync::{FetchOutcome, Subscription, TaskService, TaskStore};
pub use domain::focus_guard::{DistractionKind, FocusGuard};
pub use domain::models::{NewTask, Task, TaskPatch, TaskStatus, TimerMode, TimerSettings, UserSettings};
pub use domain::timer::{Countdown, TimerEvent, TimerSnapshot};
pub use infrastructure::api_client::{FocusFlowApi, ReqwestFocusFlowApi};
pub use infrastructure::error::InfraError;
