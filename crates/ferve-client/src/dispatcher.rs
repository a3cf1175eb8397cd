use crate::store::StateStore;
use chrono::Local;
use ferve_core::wire::{AiResponse, FrameError, InboundEnvelope, LogEntry, SystemStats, TerminalOutput};
use tracing::{debug, warn};

pub const TERMINAL_SOURCE: &str = "TERMINAL";
pub const AI_SOURCE: &str = "AI";
pub const AI_MESSAGE_PREFIX: &str = "AI: ";

/// What a single inbound frame did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    SystemStats,
    Log,
    TerminalOutput,
    AiResponse,
    /// Not interpreted here; handed to the feature bus as-is.
    Forwarded,
    /// Known type with a payload of the wrong shape. Nothing changed.
    Malformed,
}

/// Applies one decoded frame to the store. Effects of a frame are complete
/// when this returns.
pub fn dispatch(store: &StateStore, envelope: InboundEnvelope) -> DispatchOutcome {
    match envelope.kind.as_str() {
        "system_stats" => match envelope.payload::<SystemStats>() {
            Ok(stats) => {
                store.set_system_stats(stats);
                DispatchOutcome::SystemStats
            }
            Err(err) => malformed(err),
        },
        "log" => match envelope.payload::<LogEntry>() {
            Ok(entry) => {
                store.push_log(entry);
                DispatchOutcome::Log
            }
            Err(err) => malformed(err),
        },
        "terminal_output" => match envelope.payload::<TerminalOutput>() {
            Ok(output) => {
                let entry = LogEntry::new(clock_now(), output.summary(), TERMINAL_SOURCE);
                store.set_terminal_output(output);
                store.push_log(entry);
                DispatchOutcome::TerminalOutput
            }
            Err(err) => malformed(err),
        },
        "ai_response" => match envelope.payload::<AiResponse>() {
            Ok(response) => {
                let entry = LogEntry::new(
                    response.timestamp.clone(),
                    format!("{AI_MESSAGE_PREFIX}{}", response.message),
                    AI_SOURCE,
                );
                store.set_ai_response(response);
                store.push_log(entry);
                DispatchOutcome::AiResponse
            }
            Err(err) => malformed(err),
        },
        _ => {
            debug!(event = "feature_frame", kind = %envelope.kind);
            store.forward_feature(envelope);
            DispatchOutcome::Forwarded
        }
    }
}

fn malformed(err: FrameError) -> DispatchOutcome {
    warn!(event = "frame_payload_invalid", error = %err);
    DispatchOutcome::Malformed
}

/// Wall-clock time in the format the daemon uses for log entries.
pub fn clock_now() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_stats_replace_the_slice_exactly() {
        let store = StateStore::default();
        let payload = json!({
            "cpu": 42.5,
            "memory": {"used": 4e9, "total": 8e9, "percent": 50},
            "disk": {"used": 1e9, "total": 1e10, "percent": 10}
        });
        let outcome = dispatch(&store, InboundEnvelope::new("system_stats", payload.clone()));
        assert_eq!(outcome, DispatchOutcome::SystemStats);

        let expected: SystemStats = serde_json::from_value(payload).expect("stats");
        assert_eq!(store.system_stats().get(), expected);
        assert!(store.event_log().get().is_empty());
    }

    #[test]
    fn ai_response_updates_slice_and_log_head() {
        let store = StateStore::default();
        dispatch(
            &store,
            InboundEnvelope::new("ai_response", json!({"message": "ok", "timestamp": "10:00:00"})),
        );

        let response = store.ai_response().get().expect("ai response");
        assert_eq!(response.message, "ok");
        let log = store.event_log().get();
        assert_eq!(
            log.head(),
            Some(&LogEntry::new("10:00:00", "AI: ok", "AI"))
        );
    }

    #[test]
    fn terminal_output_updates_slice_and_log_head() {
        let store = StateStore::default();
        dispatch(
            &store,
            InboundEnvelope::new("terminal_output", json!({"success": true, "stdout": "a.txt"})),
        );

        let output = store.terminal_output().get().expect("terminal output");
        assert!(output.success);
        let log = store.event_log().get();
        let head = log.head().expect("head");
        assert_eq!(head.message, "a.txt");
        assert_eq!(head.source, TERMINAL_SOURCE);
        assert_eq!(head.timestamp.len(), "10:00:00".len());
    }

    #[test]
    fn silent_command_logs_fallback_text() {
        let store = StateStore::default();
        dispatch(
            &store,
            InboundEnvelope::new("terminal_output", json!({"success": true, "stdout": ""})),
        );
        let log = store.event_log().get();
        assert_eq!(log.head().map(|e| e.message.as_str()), Some("Command completed"));
    }

    #[test]
    fn fifty_one_log_frames_evict_the_first() {
        let store = StateStore::default();
        for n in 0..51 {
            dispatch(
                &store,
                InboundEnvelope::new(
                    "log",
                    json!({"timestamp": "09:00:00", "message": format!("entry {n}"), "source": "SYSTEM"}),
                ),
            );
        }
        let log = store.event_log().get();
        assert_eq!(log.len(), 50);
        assert_eq!(log.head().map(|e| e.message.as_str()), Some("entry 50"));
        assert!(log.iter().all(|e| e.message != "entry 0"));
    }

    #[test]
    fn malformed_payloads_change_nothing() {
        let store = StateStore::default();
        for envelope in [
            InboundEnvelope::new("system_stats", json!({"cpu": "hot"})),
            InboundEnvelope::new("log", json!("just a string")),
            InboundEnvelope::new("terminal_output", json!([1, 2, 3])),
            InboundEnvelope::new("ai_response", json!({"message": "missing timestamp"})),
        ] {
            assert_eq!(dispatch(&store, envelope), DispatchOutcome::Malformed);
        }
        assert_eq!(store.system_stats().get(), SystemStats::default());
        assert!(store.event_log().get().is_empty());
        assert!(store.terminal_output().get().is_none());
        assert!(store.ai_response().get().is_none());
    }

    #[test]
    fn unknown_types_are_forwarded_untouched() {
        let store = StateStore::default();
        let mut features = store.subscribe_features();
        let envelope = InboundEnvelope::new("tasks", json!([{"id": 1, "text": "ship"}]));

        assert_eq!(dispatch(&store, envelope.clone()), DispatchOutcome::Forwarded);
        assert_eq!(features.try_recv().expect("forwarded"), envelope);
        assert!(store.event_log().get().is_empty());

        // nobody listening is not an error
        drop(features);
        assert_eq!(
            dispatch(&store, InboundEnvelope::new("hologram", json!({}))),
            DispatchOutcome::Forwarded
        );
    }
}
