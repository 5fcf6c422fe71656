pub mod bootstrap;
pub mod commands;
pub mod focus_timer;
pub mod guard_runtime;
pub mod session_recorder;
pub mod task_sync;
