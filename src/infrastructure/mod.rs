pub mod activity_log;
pub mod api_client;
pub mod config;
pub mod error;
pub mod storage;
pub mod task_cache;
