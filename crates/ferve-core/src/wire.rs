use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const COMMAND_COMPLETED_TEXT: &str = "Command completed";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Commands the dashboard sends to the daemon. The protocol carries no
/// request id, so nothing here can be matched to a specific reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    TerminalCommand { command: String },
    AiChat { message: String },
    GetProjects,
    GitStatus { project_id: String },
    ProjectCommand { project_id: String, command: String },
    GitPull { project_id: String },
    OpenVscode { project_id: String },
    PomodoroStatus,
    StartPomodoro { duration: u32 },
    AddTask { text: String },
    ToggleTask { task_id: u64 },
    GetTasks,
    GetAnkiStats,
    ScanDownloads,
    SwitchContext { context: String },
}

impl OutboundEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEnvelope::TerminalCommand { .. } => "terminal_command",
            OutboundEnvelope::AiChat { .. } => "ai_chat",
            OutboundEnvelope::GetProjects => "get_projects",
            OutboundEnvelope::GitStatus { .. } => "git_status",
            OutboundEnvelope::ProjectCommand { .. } => "project_command",
            OutboundEnvelope::GitPull { .. } => "git_pull",
            OutboundEnvelope::OpenVscode { .. } => "open_vscode",
            OutboundEnvelope::PomodoroStatus => "pomodoro_status",
            OutboundEnvelope::StartPomodoro { .. } => "start_pomodoro",
            OutboundEnvelope::AddTask { .. } => "add_task",
            OutboundEnvelope::ToggleTask { .. } => "toggle_task",
            OutboundEnvelope::GetTasks => "get_tasks",
            OutboundEnvelope::GetAnkiStats => "get_anki_stats",
            OutboundEnvelope::ScanDownloads => "scan_downloads",
            OutboundEnvelope::SwitchContext { .. } => "switch_context",
        }
    }
}

/// A daemon frame. Only `type` is validated; `data` stays untyped until a
/// consumer asks for a concrete payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl InboundEnvelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, FrameError> {
        serde_json::from_value(self.data.clone())
            .map_err(|err| FrameError::Decode(format!("{} payload: {err}", self.kind)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub used: f64,
    pub total: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemStats {
    pub cpu: f64,
    pub memory: UsageStats,
    pub disk: UsageStats,
}

impl Default for SystemStats {
    fn default() -> Self {
        Self {
            cpu: 0.0,
            memory: UsageStats {
                used: 0.0,
                total: 1.0,
                percent: 0.0,
            },
            disk: UsageStats {
                used: 0.0,
                total: 1.0,
                percent: 0.0,
            },
        }
    }
}

impl SystemStats {
    pub fn memory_used_gb(&self) -> f64 {
        self.memory.used / BYTES_PER_GB
    }

    pub fn memory_total_gb(&self) -> f64 {
        self.memory.total / BYTES_PER_GB
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    pub source: String,
}

impl LogEntry {
    pub fn new(
        timestamp: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TerminalOutput {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl TerminalOutput {
    /// First non-empty of stdout, stderr and error.
    pub fn summary(&self) -> &str {
        [&self.stdout, &self.stderr, &self.error]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|text| !text.is_empty())
            .unwrap_or(COMMAND_COMPLETED_TEXT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiResponse {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

pub fn encode_frame(
    envelope: &OutboundEnvelope,
    max_frame_bytes: usize,
) -> Result<String, FrameError> {
    let encoded =
        serde_json::to_string(envelope).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}

pub fn decode_frame(text: &str, max_frame_bytes: usize) -> Result<InboundEnvelope, FrameError> {
    let raw = text.trim_end_matches(['\n', '\r']);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|err| FrameError::Decode(err.to_string()))?;
    // serde would happily read a struct out of a JSON array
    if !value.is_object() {
        return Err(FrameError::Decode("frame is not a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|err| FrameError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_envelopes_are_flat_type_tagged_objects() {
        let cases = [
            (
                OutboundEnvelope::TerminalCommand {
                    command: "ls".to_string(),
                },
                json!({"type": "terminal_command", "command": "ls"}),
            ),
            (
                OutboundEnvelope::GetProjects,
                json!({"type": "get_projects"}),
            ),
            (
                OutboundEnvelope::ProjectCommand {
                    project_id: "ferve-labs".to_string(),
                    command: "build".to_string(),
                },
                json!({"type": "project_command", "project_id": "ferve-labs", "command": "build"}),
            ),
            (
                OutboundEnvelope::OpenVscode {
                    project_id: "dashboard".to_string(),
                },
                json!({"type": "open_vscode", "project_id": "dashboard"}),
            ),
            (
                OutboundEnvelope::ToggleTask { task_id: 3 },
                json!({"type": "toggle_task", "task_id": 3}),
            ),
            (
                OutboundEnvelope::StartPomodoro { duration: 25 },
                json!({"type": "start_pomodoro", "duration": 25}),
            ),
        ];

        for (envelope, expected) in cases {
            let frame = encode_frame(&envelope, DEFAULT_MAX_FRAME_BYTES).expect("encode");
            let value: Value = serde_json::from_str(&frame).expect("json");
            assert_eq!(value, expected);
            assert_eq!(value["type"], envelope.kind());
        }
    }

    #[test]
    fn decode_accepts_missing_data_and_unknown_types() {
        let envelope = decode_frame(r#"{"type":"pomodoro_complete"}"#, DEFAULT_MAX_FRAME_BYTES)
            .expect("decode");
        assert_eq!(envelope.kind, "pomodoro_complete");
        assert_eq!(envelope.data, Value::Null);

        let envelope = decode_frame(
            "{\"type\":\"brand_new\",\"data\":{\"x\":1}}\n",
            DEFAULT_MAX_FRAME_BYTES,
        )
        .expect("decode with trailing newline");
        assert_eq!(envelope.kind, "brand_new");
        assert_eq!(envelope.data, json!({"x": 1}));
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        for frame in [
            "not json",
            "{\"type\":",
            "42",
            "[\"system_stats\"]",
            "{\"data\":{}}",
            "{\"type\":7,\"data\":{}}",
        ] {
            let result = decode_frame(frame, DEFAULT_MAX_FRAME_BYTES);
            assert!(
                matches!(result, Err(FrameError::Decode(_))),
                "expected decode error for {frame:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn oversized_frames_are_rejected_both_ways() {
        let envelope = OutboundEnvelope::AiChat {
            message: "x".repeat(128),
        };
        assert!(matches!(
            encode_frame(&envelope, 64),
            Err(FrameError::OversizedFrame { .. })
        ));

        let inbound = format!("{{\"type\":\"log\",\"data\":\"{}\"}}", "y".repeat(2_000));
        assert!(matches!(
            decode_frame(&inbound, 1_024),
            Err(FrameError::OversizedFrame { .. })
        ));
    }

    #[test]
    fn system_stats_payload_parses_exactly() {
        let envelope = InboundEnvelope::new(
            "system_stats",
            json!({
                "cpu": 42.5,
                "memory": {"used": 4e9, "total": 8e9, "percent": 50},
                "disk": {"used": 1e9, "total": 1e10, "percent": 10}
            }),
        );
        let stats: SystemStats = envelope.payload().expect("stats");
        assert_eq!(stats.cpu, 42.5);
        assert_eq!(stats.memory.used, 4e9);
        assert_eq!(stats.memory.percent, 50.0);
        assert_eq!(stats.disk.total, 1e10);
        assert!(stats.memory_total_gb() > 7.4 && stats.memory_total_gb() < 7.5);
    }

    #[test]
    fn payload_reports_shape_errors_with_type() {
        let envelope = InboundEnvelope::new("system_stats", json!({"cpu": "high"}));
        let err = envelope.payload::<SystemStats>().unwrap_err();
        match err {
            FrameError::Decode(message) => assert!(message.starts_with("system_stats payload")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn terminal_summary_prefers_first_non_empty_stream() {
        let output = TerminalOutput {
            success: true,
            stdout: Some(String::new()),
            stderr: Some("warning: dirty tree".to_string()),
            error: Some("ignored".to_string()),
            exit_code: Some(0),
        };
        assert_eq!(output.summary(), "warning: dirty tree");

        let silent = TerminalOutput {
            success: true,
            ..TerminalOutput::default()
        };
        assert_eq!(silent.summary(), COMMAND_COMPLETED_TEXT);
    }

    #[test]
    fn default_stats_never_divide_by_zero() {
        let stats = SystemStats::default();
        assert_eq!(stats.memory.total, 1.0);
        assert_eq!(stats.disk.total, 1.0);
        assert_eq!(stats.cpu, 0.0);
    }
}
