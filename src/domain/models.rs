use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

/// A task row exactly as the server returned it.
///
/// Fields the client does not know about are kept in `extra` so a cached row
/// serializes back to what the server sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub actual_minutes: Option<u32>,
    #[serde(default, with = "flag")]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub repeat: Option<String>,
    #[serde(default)]
    pub goal_points: Option<i32>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Tags are stored as a JSON array string; older rows use a comma list.
    pub fn tag_list(&self) -> Vec<String> {
        let Some(raw) = self.tags.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            return Vec::new();
        };
        if let Ok(parsed) = serde_json::from_str::<Vec<String>>(raw) {
            return parsed
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect();
        }
        raw.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.is_completed || self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        let tags = tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>();
        self.tags = if tags.is_empty() {
            None
        } else {
            serde_json::to_string(&tags).ok()
        };
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")?;
        if let Some(priority) = self.priority {
            if priority < 0 {
                return Err("task.priority must be >= 0".to_string());
            }
        }
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned);
        self
    }
}

/// Partial task update. Only set fields are sent.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", with = "optional_flag")]
    pub is_completed: Option<bool>,
    /// `Some(None)` clears the timestamp on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl TaskPatch {
    pub fn completion(done: bool, at: &str) -> Self {
        Self {
            status: Some(if done {
                TaskStatus::Completed
            } else {
                TaskStatus::Todo
            }),
            is_completed: Some(done),
            completed_at: Some(done.then(|| at.to_string())),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = self.title.as_deref() {
            validate_non_empty(title, "task.title")?;
        }
        if self.is_empty() {
            return Err("task patch must change at least one field".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "focus" => Some(Self::Focus),
            "short_break" | "short" => Some(Self::ShortBreak),
            "long_break" | "long" => Some(Self::LongBreak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FocusSession {
    pub id: i64,
    #[serde(default)]
    pub task_id: Option<i64>,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub session_type: TimerMode,
    #[serde(default)]
    pub timer_mode: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FocusSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    pub start_time: String,
    pub session_type: TimerMode,
    pub timer_mode: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EndSessionRequest {
    pub end_time: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerSettings {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles_before_long_break: u32,
    pub timer_mode: String,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles_before_long_break: 4,
            timer_mode: "pomodoro".to_string(),
        }
    }
}

impl TimerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.focus_minutes == 0 {
            return Err("settings.focus_minutes must be > 0".to_string());
        }
        if self.short_break_minutes == 0 {
            return Err("settings.short_break_minutes must be > 0".to_string());
        }
        if self.long_break_minutes == 0 {
            return Err("settings.long_break_minutes must be > 0".to_string());
        }
        if self.cycles_before_long_break == 0 {
            return Err("settings.cycles_before_long_break must be > 0".to_string());
        }
        validate_non_empty(&self.timer_mode, "settings.timer_mode")
    }

    pub fn full_duration_seconds(&self, mode: TimerMode) -> u32 {
        let minutes = match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        };
        minutes.saturating_mul(60)
    }
}

/// The `/api/settings` resource. Every field is optional so the same type
/// serves as a PATCH body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_break_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles_before_long_break: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserSettings {
    /// Checks an outgoing PATCH body. Fields that are present must be usable
    /// as they are; absent fields are left to the server.
    pub fn validate_patch(&self) -> Result<(), String> {
        let counts = [
            ("settings.focus_minutes", self.focus_minutes),
            ("settings.short_break_minutes", self.short_break_minutes),
            ("settings.long_break_minutes", self.long_break_minutes),
            ("settings.cycles_before_long_break", self.cycles_before_long_break),
        ];
        for (field_name, value) in counts {
            if value == Some(0) {
                return Err(format!("{field_name} must be > 0"));
            }
        }
        if let Some(timer_mode) = self.timer_mode.as_deref() {
            validate_non_empty(timer_mode, "settings.timer_mode")?;
        }
        Ok(())
    }

    /// Server values win; zero or blank values fall back to `base`.
    pub fn apply_to(&self, base: &TimerSettings) -> TimerSettings {
        TimerSettings {
            focus_minutes: positive_or(self.focus_minutes, base.focus_minutes),
            short_break_minutes: positive_or(self.short_break_minutes, base.short_break_minutes),
            long_break_minutes: positive_or(self.long_break_minutes, base.long_break_minutes),
            cycles_before_long_break: positive_or(
                self.cycles_before_long_break,
                base.cycles_before_long_break,
            ),
            timer_mode: self
                .timer_mode
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| base.timer_mode.clone()),
        }
    }
}

fn positive_or(value: Option<u32>, fallback: u32) -> u32 {
    value.filter(|value| *value > 0).unwrap_or(fallback)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

/// Boolean flags travel as 0/1 integers.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Int(i64),
        Bool(bool),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Int(value)) => value != 0,
            Some(Wire::Bool(value)) => value,
            None => false,
        })
    }
}

mod optional_flag {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_u8(u8::from(*value)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_task_json() -> Value {
        serde_json::json!({
            "id": 7,
            "title": "Write tests",
            "description": "for the sync layer",
            "status": "in_progress",
            "priority": 2,
            "estimated_minutes": 50,
            "actual_minutes": null,
            "is_completed": 0,
            "completed_at": null,
            "project": "focusflow",
            "due_date": "2026-02-20",
            "tags": "[\"deep\",\"writing\"]",
            "repeat": null,
            "goal_points": 3,
            "created_at": "2026-02-16T08:00:00Z",
            "updated_at": "2026-02-16T08:00:00Z",
            "user_id": 42
        })
    }

    #[test]
    fn task_reads_integer_completion_flag() {
        let mut raw = sample_task_json();
        let task: Task = serde_json::from_value(raw.clone()).expect("deserialize task");
        assert!(!task.is_completed);

        raw["is_completed"] = serde_json::json!(1);
        let task: Task = serde_json::from_value(raw).expect("deserialize task");
        assert!(task.is_completed);
        assert!(task.is_done());
    }

    #[test]
    fn task_keeps_unknown_server_fields() {
        let raw = sample_task_json();
        let task: Task = serde_json::from_value(raw.clone()).expect("deserialize task");
        assert_eq!(task.extra.get("user_id"), Some(&serde_json::json!(42)));

        let written = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(written["is_completed"], serde_json::json!(0));
        assert_eq!(written["user_id"], serde_json::json!(42));
    }

    #[test]
    fn tag_list_accepts_json_and_comma_forms() {
        let mut task: Task = serde_json::from_value(sample_task_json()).expect("task");
        assert_eq!(task.tag_list(), vec!["deep".to_string(), "writing".to_string()]);

        task.tags = Some("deep, , admin".to_string());
        assert_eq!(task.tag_list(), vec!["deep".to_string(), "admin".to_string()]);

        task.tags = None;
        assert!(task.tag_list().is_empty());
    }

    #[test]
    fn new_task_rejects_blank_title() {
        assert!(NewTask::titled("   ").validate().is_err());
        assert!(NewTask::titled("Plan week").validate().is_ok());
    }

    #[test]
    fn new_task_omits_unset_fields() {
        let body = serde_json::to_value(NewTask::titled("Plan week").with_tags(&["a", " "]))
            .expect("serialize");
        assert_eq!(body, serde_json::json!({"title": "Plan week", "tags": "[\"a\"]"}));
    }

    #[test]
    fn completion_patch_sends_flag_as_integer() {
        let done = serde_json::to_value(TaskPatch::completion(true, "2026-02-16T09:00:00Z"))
            .expect("serialize");
        assert_eq!(done["is_completed"], serde_json::json!(1));
        assert_eq!(done["status"], serde_json::json!("completed"));
        assert_eq!(done["completed_at"], serde_json::json!("2026-02-16T09:00:00Z"));

        let undone = serde_json::to_value(TaskPatch::completion(false, "ignored")).expect("serialize");
        assert_eq!(undone["is_completed"], serde_json::json!(0));
        assert_eq!(undone["completed_at"], Value::Null);
        assert!(undone.get("title").is_none());
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(TaskPatch::default().validate().is_err());
    }

    #[test]
    fn timer_mode_parse_accepts_aliases() {
        assert_eq!(TimerMode::parse("short-break"), Some(TimerMode::ShortBreak));
        assert_eq!(TimerMode::parse("LONG"), Some(TimerMode::LongBreak));
        assert_eq!(TimerMode::parse("nap"), None);
    }

    #[test]
    fn default_timer_settings_are_valid() {
        let settings = TimerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.full_duration_seconds(TimerMode::Focus), 1500);
        assert_eq!(settings.full_duration_seconds(TimerMode::LongBreak), 900);
    }

    proptest! {
        #[test]
        fn server_settings_take_precedence(
            focus in 1u32..120u32,
            short in 1u32..30u32,
            long in 1u32..60u32,
            cycles in 1u32..10u32
        ) {
            let remote = UserSettings {
                focus_minutes: Some(focus),
                short_break_minutes: Some(short),
                long_break_minutes: Some(long),
                cycles_before_long_break: Some(cycles),
                timer_mode: None,
                extra: Map::new(),
            };
            let effective = remote.apply_to(&TimerSettings::default());
            prop_assert_eq!(effective.focus_minutes, focus);
            prop_assert_eq!(effective.short_break_minutes, short);
            prop_assert_eq!(effective.long_break_minutes, long);
            prop_assert_eq!(effective.cycles_before_long_break, cycles);
            prop_assert_eq!(effective.timer_mode, "pomodoro".to_string());
        }
    }

    #[test]
    fn settings_patch_rejects_zero_and_blank_fields() {
        let zero_focus = UserSettings {
            focus_minutes: Some(0),
            ..UserSettings::default()
        };
        assert!(zero_focus.validate_patch().is_err());

        let zero_cycles = UserSettings {
            cycles_before_long_break: Some(0),
            ..UserSettings::default()
        };
        assert!(zero_cycles.validate_patch().is_err());

        let blank_mode = UserSettings {
            timer_mode: Some("  ".to_string()),
            ..UserSettings::default()
        };
        assert!(blank_mode.validate_patch().is_err());

        let partial = UserSettings {
            long_break_minutes: Some(20),
            ..UserSettings::default()
        };
        assert!(partial.validate_patch().is_ok());
        assert!(UserSettings::default().validate_patch().is_ok());
    }

    #[test]
    fn zero_server_values_fall_back_to_base() {
        let remote = UserSettings {
            focus_minutes: Some(0),
            ..UserSettings::default()
        };
        let effective = remote.apply_to(&TimerSettings::default());
        assert_eq!(effective.focus_minutes, 25);
    }
}
