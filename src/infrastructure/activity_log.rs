use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const ACTIVITY_LOG_FILE: &str = "activity.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// JSON-lines activity log. Writes are best-effort: a failed write is dropped.
#[derive(Debug)]
pub struct ActivityLog {
    path: Option<PathBuf>,
    guard: Mutex<()>,
}

impl ActivityLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: Some(logs_dir.join(ACTIVITY_LOG_FILE)),
            guard: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, source: &str, message: &str) {
        self.append(LogLevel::Info, source, message);
    }

    pub fn warn(&self, source: &str, message: &str) {
        self.append(LogLevel::Warn, source, message);
    }

    pub fn error(&self, source: &str, message: &str) {
        self.append(LogLevel::Error, source, message);
    }

    pub fn append(&self, level: LogLevel, source: &str, message: &str) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level.as_str(),
            "source": source,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn records_are_json_lines() {
        let dir = std::env::temp_dir().join(format!("focusflow-log-tests-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create log dir");
        let log = ActivityLog::new(&dir);

        log.info("timer", "started focus");
        log.error("session", "close failed: HTTP 500");

        let raw = fs::read_to_string(log.path().expect("log path")).expect("read log");
        let lines = raw
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json line"))
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "info");
        assert_eq!(lines[1]["source"], "session");
        assert_eq!(lines[1]["message"], "close failed: HTTP 500");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = ActivityLog::disabled();
        log.warn("sync", "ignored");
        assert!(log.path().is_none());
    }
}
