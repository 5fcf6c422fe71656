use crate::domain::models::TimerSettings;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000/";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
pub const API_URL_ENV: &str = "FOCUSFLOW_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    pub api: ApiConfig,
    pub timer: TimerSettings,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "apiBaseUrl": DEFAULT_API_BASE_URL,
                "requestTimeoutSeconds": DEFAULT_REQUEST_TIMEOUT_SECONDS
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "focusMinutes": 25,
                "shortBreakMinutes": 5,
                "longBreakMinutes": 15,
                "cyclesBeforeLongBreak": 4,
                "timerMode": "pomodoro"
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_u32(value: &serde_json::Value, key: &str, fallback: u32) -> u32 {
    value
        .get(key)
        .and_then(serde_json::Value::as_u64)
        .and_then(|raw| u32::try_from(raw).ok())
        .unwrap_or(fallback)
}

fn read_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn read_api_config<F>(config_dir: &Path, lookup: F) -> Result<ApiConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;
    let from_env = lookup(API_URL_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let base_url = from_env
        .or_else(|| read_str(&app, "apiBaseUrl").map(ToOwned::to_owned))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    url::Url::parse(&base_url)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid apiBaseUrl '{base_url}': {error}")))?;

    let request_timeout_seconds = app
        .get("requestTimeoutSeconds")
        .and_then(serde_json::Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);

    Ok(ApiConfig {
        base_url,
        request_timeout_seconds,
    })
}

pub fn read_timer_settings(config_dir: &Path) -> Result<TimerSettings, InfraError> {
    let timer = read_config(&config_dir.join(TIMER_JSON))?;
    let defaults = TimerSettings::default();
    let settings = TimerSettings {
        focus_minutes: read_u32(&timer, "focusMinutes", defaults.focus_minutes),
        short_break_minutes: read_u32(&timer, "shortBreakMinutes", defaults.short_break_minutes),
        long_break_minutes: read_u32(&timer, "longBreakMinutes", defaults.long_break_minutes),
        cycles_before_long_break: read_u32(
            &timer,
            "cyclesBeforeLongBreak",
            defaults.cycles_before_long_break,
        ),
        timer_mode: read_str(&timer, "timerMode")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.timer_mode),
    };
    settings.validate().map_err(InfraError::InvalidConfig)?;
    Ok(settings)
}

pub fn save_timer_settings(config_dir: &Path, settings: &TimerSettings) -> Result<(), InfraError> {
    settings.validate().map_err(InfraError::InvalidConfig)?;
    let path = config_dir.join(TIMER_JSON);
    let mut timer = read_config(&path)?;
    let object = timer.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert("focusMinutes".to_string(), settings.focus_minutes.into());
    object.insert("shortBreakMinutes".to_string(), settings.short_break_minutes.into());
    object.insert("longBreakMinutes".to_string(), settings.long_break_minutes.into());
    object.insert(
        "cyclesBeforeLongBreak".to_string(),
        settings.cycles_before_long_break.into(),
    );
    object.insert("timerMode".to_string(), settings.timer_mode.clone().into());

    let formatted = serde_json::to_string_pretty(&timer)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

pub fn load_configs<F>(config_dir: &Path, lookup: F) -> Result<ConfigBundle, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(ConfigBundle {
        api: read_api_config(config_dir, lookup)?,
        timer: read_timer_settings(config_dir)?,
    })
}
