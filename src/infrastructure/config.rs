use crate::domain::timeline::DayWindow;
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const PLANNER_JSON: &str = "planner.json";
const ASSISTANT_JSON: &str = "assistant.json";

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            PLANNER_JSON,
            serde_json::json!({
                "schema": 1,
                "startHour": 5,
                "endHour": 29,
                "slotMinutes": 15
            }),
        ),
        (
            ASSISTANT_JSON,
            serde_json::json!({
                "schema": 1,
                "model": DEFAULT_MODEL
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

/// Reads the timeline window; missing fields fall back to the defaults
/// (05:00 through 05:00 next day, 15-minute slots).
pub fn read_day_window(config_dir: &Path) -> Result<DayWindow, InfraError> {
    let planner = read_config(&config_dir.join(PLANNER_JSON))?;
    let defaults = DayWindow::default();

    let read_hour = |field: &str, fallback: u32| {
        planner
            .get(field)
            .and_then(serde_json::Value::as_u64)
            .map(|value| value as u32)
            .unwrap_or(fallback)
    };

    let window = DayWindow::new(
        read_hour("startHour", defaults.start_hour),
        read_hour("endHour", defaults.end_hour),
        read_hour("slotMinutes", defaults.slot_minutes),
    );
    if window.start_hour > 23 || window.end_hour <= window.start_hour || window.slot_minutes == 0 {
        return Err(InfraError::InvalidConfig(format!(
            "invalid timeline window in {}",
            config_dir.join(PLANNER_JSON).display()
        )));
    }
    Ok(window)
}

pub fn read_assistant_model(config_dir: &Path) -> Result<String, InfraError> {
    let assistant = read_config(&config_dir.join(ASSISTANT_JSON))?;
    let model = assistant
        .get("model")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MODEL);
    Ok(model.to_string())
}
