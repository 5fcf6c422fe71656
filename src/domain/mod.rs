use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod focus_guard;
pub mod models;
pub mod timer;

/// Injectable wall clock.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
