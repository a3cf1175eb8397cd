use super::{on_every_open, on_feature_frames, send_later};
use crate::config::AdapterTimings;
use crate::connection::ConnectionHandle;
use crate::store::{ObserverSet, Slice, SliceReader, StateStore};
use ferve_core::wire::{InboundEnvelope, OutboundEnvelope};
use ferve_core::{PomodoroPhase, PomodoroStatus, Task};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub command: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickActionCategory {
    pub name: &'static str,
    pub label: &'static str,
    pub actions: &'static [QuickAction],
}

const fn action(label: &'static str, command: &'static str) -> QuickAction {
    QuickAction { label, command }
}

pub const QUICK_ACTIONS: &[QuickActionCategory] = &[
    QuickActionCategory {
        name: "git",
        label: "Git",
        actions: &[
            action("Status", "git status"),
            action("Pull", "git pull"),
            action("Log", "git log --oneline -10"),
        ],
    },
    QuickActionCategory {
        name: "docker",
        label: "Docker",
        actions: &[
            action("PS", "docker ps"),
            action("Images", "docker images"),
            action("Prune", "docker system prune -f"),
        ],
    },
    QuickActionCategory {
        name: "system",
        label: "System",
        actions: &[
            action("Ports", "lsof -i -P -n | grep LISTEN"),
            action("Disk", "df -h"),
            action("Memory", "free -h"),
        ],
    },
    QuickActionCategory {
        name: "node",
        label: "Node",
        actions: &[
            action("Version", "node --version && npm --version"),
            action("Outdated", "npm outdated"),
        ],
    },
];

#[derive(Debug, Deserialize)]
struct PomodoroStarted {
    duration: u32,
    #[serde(default, rename = "type")]
    phase: PomodoroPhase,
}

#[derive(Debug, Deserialize)]
struct PomodoroComplete {
    #[serde(default)]
    next: PomodoroPhase,
    #[serde(default)]
    count: u32,
}

pub struct ProductivityAdapter {
    connection: ConnectionHandle,
    pomodoro: Slice<PomodoroStatus>,
    tasks: Slice<Vec<Task>>,
    task_refresh_delay: Duration,
    observers: ObserverSet,
}

impl ProductivityAdapter {
    pub fn attach(connection: ConnectionHandle, store: &StateStore, timings: &AdapterTimings) -> Self {
        let pomodoro = Slice::new(PomodoroStatus::default());
        let tasks = Slice::new(Vec::new());
        let observers = ObserverSet::new();

        let (status, list) = (pomodoro.clone(), tasks.clone());
        observers.push(on_feature_frames(store, "productivity", move |envelope| {
            apply(&status, &list, envelope)
        }));

        let on_open = connection.clone();
        observers.push(on_every_open(connection.state_reader(), move || {
            on_open.send(OutboundEnvelope::PomodoroStatus);
            on_open.send(OutboundEnvelope::GetTasks);
        }));

        let poll = connection.clone();
        let period = timings.pomodoro_poll_interval;
        observers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if poll.is_connected() {
                    poll.send(OutboundEnvelope::PomodoroStatus);
                }
            }
        }));

        Self {
            connection,
            pomodoro,
            tasks,
            task_refresh_delay: timings.task_refresh_delay,
            observers,
        }
    }

    pub fn pomodoro(&self) -> SliceReader<PomodoroStatus> {
        self.pomodoro.reader()
    }

    pub fn tasks(&self) -> SliceReader<Vec<Task>> {
        self.tasks.reader()
    }

    pub fn start_pomodoro(&self, minutes: u32) {
        self.connection
            .send(OutboundEnvelope::StartPomodoro { duration: minutes });
    }

    pub fn add_task(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.connection.send(OutboundEnvelope::AddTask {
            text: text.to_string(),
        });
        self.refresh_tasks_later();
        true
    }

    pub fn toggle_task(&self, task_id: u64) {
        self.connection.send(OutboundEnvelope::ToggleTask { task_id });
        self.refresh_tasks_later();
    }

    pub fn refresh_tasks(&self) {
        self.connection.send(OutboundEnvelope::GetTasks);
    }

    pub fn run_quick_action(&self, command: &str) {
        self.connection.send(OutboundEnvelope::TerminalCommand {
            command: command.to_string(),
        });
    }

    fn refresh_tasks_later(&self) {
        self.observers.push(send_later(
            &self.connection,
            self.task_refresh_delay,
            OutboundEnvelope::GetTasks,
        ));
    }
}

fn apply(pomodoro: &Slice<PomodoroStatus>, tasks: &Slice<Vec<Task>>, envelope: InboundEnvelope) {
    match envelope.kind.as_str() {
        "pomodoro_status" => match envelope.payload::<PomodoroStatus>() {
            Ok(status) => pomodoro.replace(status),
            Err(err) => warn!(event = "pomodoro_payload_invalid", error = %err),
        },
        "pomodoro_started" => match envelope.payload::<PomodoroStarted>() {
            Ok(started) => pomodoro.modify(|status| {
                status.active = true;
                status.phase = started.phase;
                status.remaining_minutes = started.duration;
            }),
            Err(err) => warn!(event = "pomodoro_payload_invalid", error = %err),
        },
        "pomodoro_complete" => match envelope.payload::<PomodoroComplete>() {
            Ok(done) => pomodoro.replace(PomodoroStatus {
                active: false,
                phase: done.next,
                count: done.count,
                ..PomodoroStatus::default()
            }),
            Err(err) => warn!(event = "pomodoro_payload_invalid", error = %err),
        },
        "tasks" => match envelope.payload::<Vec<Task>>() {
            Ok(list) => tasks.replace(list),
            Err(err) => warn!(event = "tasks_payload_invalid", error = %err),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::{settle, Harness};
    use crate::connection::ConnectionState;
    use crate::dispatcher::dispatch;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn attach_queries_status_and_tasks_when_open() {
        let mut harness = Harness::open();
        let _productivity =
            ProductivityAdapter::attach(harness.connection.clone(), &harness.store, &AdapterTimings::default());
        settle().await;
        assert_eq!(
            harness.sent(),
            vec![OutboundEnvelope::PomodoroStatus, OutboundEnvelope::GetTasks]
        );

        harness.store.set_connection(ConnectionState::ReconnectPending);
        settle().await;
        harness.store.set_connection(ConnectionState::Open);
        settle().await;
        assert_eq!(
            harness.sent(),
            vec![OutboundEnvelope::PomodoroStatus, OutboundEnvelope::GetTasks]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pomodoro_is_polled_every_five_seconds_while_connected() {
        let mut harness = Harness::open();
        let _productivity =
            ProductivityAdapter::attach(harness.connection.clone(), &harness.store, &AdapterTimings::default());
        settle().await;
        harness.sent();

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        assert_eq!(
            harness.sent(),
            vec![OutboundEnvelope::PomodoroStatus, OutboundEnvelope::PomodoroStatus]
        );

        harness.store.set_connection(ConnectionState::ReconnectPending);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(harness.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn task_mutations_requery_after_delay() {
        let mut harness = Harness::open();
        let productivity =
            ProductivityAdapter::attach(harness.connection.clone(), &harness.store, &AdapterTimings::default());
        settle().await;
        harness.sent();

        assert!(!productivity.add_task("   "));
        assert!(productivity.add_task(" write docs "));
        productivity.toggle_task(1);
        assert_eq!(
            harness.sent(),
            vec![
                OutboundEnvelope::AddTask {
                    text: "write docs".to_string()
                },
                OutboundEnvelope::ToggleTask { task_id: 1 },
            ]
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(harness.sent().is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            harness.sent(),
            vec![OutboundEnvelope::GetTasks, OutboundEnvelope::GetTasks]
        );

        dispatch(
            &harness.store,
            InboundEnvelope::new(
                "tasks",
                json!([{"id": 1, "text": "write docs", "completed": true, "created_at": "2026-10-18T09:00:00"}]),
            ),
        );
        settle().await;
        let tasks = productivity.tasks().get();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].completed);
    }

    #[tokio::test(start_paused = true)]
    async fn pomodoro_frames_update_status() {
        let mut harness = Harness::open();
        let productivity =
            ProductivityAdapter::attach(harness.connection.clone(), &harness.store, &AdapterTimings::default());

        productivity.start_pomodoro(25);
        productivity.run_quick_action("git status");
        settle().await;
        let sent = harness.sent();
        assert!(sent.contains(&OutboundEnvelope::StartPomodoro { duration: 25 }));
        assert!(sent.contains(&OutboundEnvelope::TerminalCommand {
            command: "git status".to_string()
        }));

        dispatch(
            &harness.store,
            InboundEnvelope::new("pomodoro_started", json!({"duration": 25, "type": "work"})),
        );
        settle().await;
        let status = productivity.pomodoro().get();
        assert!(status.active);
        assert_eq!(status.remaining_minutes, 25);

        dispatch(
            &harness.store,
            InboundEnvelope::new("pomodoro_complete", json!({"type": "work", "next": "break", "count": 1})),
        );
        settle().await;
        let status = productivity.pomodoro().get();
        assert!(!status.active);
        assert_eq!(status.phase, PomodoroPhase::Break);
        assert_eq!(status.count, 1);
    }

    #[test]
    fn quick_action_catalogue_covers_common_tools() {
        let names: Vec<_> = QUICK_ACTIONS.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["git", "docker", "system", "node"]);
        assert!(QUICK_ACTIONS.iter().all(|c| !c.actions.is_empty()));
    }
}
