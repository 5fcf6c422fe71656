use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TASKS_STORAGE_KEY: &str = "focusflow.tasks";

/// Persistent shadow copy of the task list, stored as one serialized value.
pub trait LocalTaskCache: Send + Sync {
    fn read_raw(&self) -> Result<Option<String>, InfraError>;
    fn write_raw(&self, payload: &str) -> Result<(), InfraError>;

    fn read(&self) -> Result<Option<Vec<Task>>, InfraError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write(&self, tasks: &[Task]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(tasks)?;
        self.write_raw(&payload)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteTaskCache {
    db_path: PathBuf,
}

impl SqliteTaskCache {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl LocalTaskCache for SqliteTaskCache {
    fn read_raw(&self) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![TASKS_STORAGE_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_raw(&self, payload: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO local_storage (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![TASKS_STORAGE_KEY, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskCache {
    payload: Mutex<Option<String>>,
}

impl InMemoryTaskCache {
    pub fn seeded(tasks: &[Task]) -> Result<Self, InfraError> {
        let cache = Self::default();
        cache.write(tasks)?;
        Ok(cache)
    }
}

impl LocalTaskCache for InMemoryTaskCache {
    fn read_raw(&self) -> Result<Option<String>, InfraError> {
        let payload = self
            .payload
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task cache lock poisoned: {error}")))?;
        Ok(payload.clone())
    }

    fn write_raw(&self, value: &str) -> Result<(), InfraError> {
        let mut payload = self
            .payload
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("task cache lock poisoned: {error}")))?;
        *payload = Some(value.to_string());
        Ok(())
    }
}
