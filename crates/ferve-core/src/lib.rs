use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

pub mod wire;

pub const DEFAULT_POMODORO_MINUTES: u32 = 25;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
    #[serde(default)]
    pub git_enabled: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Project {
    /// Command keys paired with a button label, in key order.
    pub fn command_entries(&self) -> Vec<(String, String)> {
        self.commands
            .keys()
            .map(|key| (key.clone(), command_label(key)))
            .collect()
    }
}

fn command_label(key: &str) -> String {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();
    format!("{}{}", first.to_uppercase(), rest.replacen('_', " ", 1))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GitStatus {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub last_commit: String,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    #[serde(deserialize_with = "deserialize_id_u64")]
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PomodoroPhase {
    #[default]
    Work,
    Break,
}

impl PomodoroPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroPhase::Work => "work",
            PomodoroPhase::Break => "break",
        }
    }
}

impl fmt::Display for PomodoroPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PomodoroPhase {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "work" => Ok(PomodoroPhase::Work),
            "break" | "pause" => Ok(PomodoroPhase::Break),
            other => Err(format!("Unknown pomodoro phase: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PomodoroStatus {
    pub active: bool,
    #[serde(rename = "type")]
    pub phase: PomodoroPhase,
    pub remaining_minutes: u32,
    pub count: u32,
}

impl Default for PomodoroStatus {
    fn default() -> Self {
        Self {
            active: false,
            phase: PomodoroPhase::Work,
            remaining_minutes: DEFAULT_POMODORO_MINUTES,
            count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnkiStats {
    #[serde(default)]
    pub total_decks: u32,
    #[serde(default)]
    pub total_size_mb: f64,
    #[serde(default)]
    pub topics: BTreeMap<String, u32>,
    #[serde(default)]
    pub decks: Vec<AnkiDeck>,
}

impl AnkiStats {
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnkiDeck {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: String,
}

impl AnkiDeck {
    pub fn size_label(&self) -> String {
        format_size(self.size)
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let value = bytes as f64;
    if value < KB * KB {
        return format!("{:.1} KB", value / KB);
    }
    format!("{:.1} MB", value / KB / KB)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadFile {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkContext {
    Dev,
    Study,
    Focus,
}

impl WorkContext {
    pub const ALL: [WorkContext; 3] = [WorkContext::Dev, WorkContext::Study, WorkContext::Focus];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkContext::Dev => "DEV",
            WorkContext::Study => "STUDY",
            WorkContext::Focus => "FOCUS",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkContext::Dev => "Development",
            WorkContext::Study => "Study",
            WorkContext::Focus => "Deep focus",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorkContext::Dev => "Editor + browser",
            WorkContext::Study => "Anki + PDFs",
            WorkContext::Focus => "No distractions",
        }
    }
}

impl fmt::Display for WorkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkContext {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_uppercase().as_str() {
            "DEV" => Ok(WorkContext::Dev),
            "STUDY" => Ok(WorkContext::Study),
            "FOCUS" => Ok(WorkContext::Focus),
            other => Err(format!("Unknown context: {other}")),
        }
    }
}

/// Deserialize an ID that can be either a string or a number into a u64
fn deserialize_id_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => s.trim().parse::<u64>().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("invalid u64")),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_ids_accept_strings_and_numbers() {
        let tasks: Vec<Task> = serde_json::from_value(json!([
            {"id": 1, "text": "write tests", "completed": false, "created_at": "2026-10-18T09:00:00"},
            {"id": "2", "text": "ship"}
        ]))
        .expect("tasks");
        assert_eq!(tasks[0].id, 1);
        assert_eq!(tasks[1].id, 2);
        assert!(!tasks[1].completed);
        assert!(tasks[1].created_at.is_none());

        let bad = serde_json::from_value::<Task>(json!({"id": [1], "text": "nope"}));
        assert!(bad.is_err());
    }

    #[test]
    fn pomodoro_status_fills_missing_fields() {
        let idle: PomodoroStatus =
            serde_json::from_value(json!({"active": false, "count": 3})).expect("idle");
        assert_eq!(idle.remaining_minutes, DEFAULT_POMODORO_MINUTES);
        assert_eq!(idle.phase, PomodoroPhase::Work);
        assert_eq!(idle.count, 3);

        let running: PomodoroStatus = serde_json::from_value(
            json!({"active": true, "type": "break", "remaining_minutes": 4, "count": 1}),
        )
        .expect("running");
        assert!(running.active);
        assert_eq!(running.phase, PomodoroPhase::Break);
        assert_eq!("pause".parse::<PomodoroPhase>(), Ok(PomodoroPhase::Break));
    }

    #[test]
    fn project_command_labels_follow_key_names() {
        let project: Project = serde_json::from_value(json!({
            "name": "Dashboard 2",
            "path": "/srv/dashboard",
            "type": "fullstack",
            "commands": {"install_all": "npm install", "dev": "npm run dev", "run_e2e_tests": "npm test"},
            "git_enabled": true,
            "favorite": true,
            "owner": "ops"
        }))
        .expect("project");
        assert_eq!(project.kind, "fullstack");
        assert_eq!(project.extra.get("owner"), Some(&json!("ops")));
        assert_eq!(
            project.command_entries(),
            vec![
                ("dev".to_string(), "Dev".to_string()),
                ("install_all".to_string(), "Install all".to_string()),
                ("run_e2e_tests".to_string(), "Run e2e_tests".to_string()),
            ]
        );
    }

    #[test]
    fn deck_sizes_render_with_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");

        let stats: AnkiStats = serde_json::from_value(json!({
            "total_decks": 1,
            "total_size_mb": 0.5,
            "topics": {"Science": 1},
            "decks": [{"name": "anatomy basics", "size": 2048, "modified": "01/10/2026"}]
        }))
        .expect("anki");
        assert_eq!(stats.topic_count(), 1);
        assert_eq!(stats.decks[0].size_label(), "2.0 KB");
    }

    #[test]
    fn work_contexts_use_uppercase_wire_ids() {
        assert_eq!(serde_json::to_value(WorkContext::Study).unwrap(), json!("STUDY"));
        assert_eq!("focus".parse::<WorkContext>(), Ok(WorkContext::Focus));
        assert!("gaming".parse::<WorkContext>().is_err());
        assert_eq!(WorkContext::ALL.len(), 3);
    }
}
