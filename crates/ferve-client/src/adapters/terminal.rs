use crate::config::AdapterTimings;
use crate::connection::ConnectionHandle;
use crate::dispatcher::{clock_now, TERMINAL_SOURCE};
use crate::store::{ObserverSet, Slice, SliceReader, StateStore};
use ferve_core::wire::{LogEntry, OutboundEnvelope, TerminalOutput, COMMAND_COMPLETED_TEXT};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const READY_BANNER: &str = "Ferve Terminal v1.0 - Ready for commands";
const EXECUTING_PREFIX: &str = "Executing:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Command,
    Output,
    Error,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalLine {
    pub kind: LineKind,
    pub content: String,
    pub timestamp: String,
}

impl TerminalLine {
    fn new(kind: LineKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: clock_now(),
        }
    }
}

pub struct TerminalAdapter {
    connection: ConnectionHandle,
    history: Slice<Vec<TerminalLine>>,
    executing: Slice<bool>,
    busy_timeout: Duration,
    observers: ObserverSet,
}

impl TerminalAdapter {
    pub fn attach(connection: ConnectionHandle, store: &StateStore, timings: &AdapterTimings) -> Self {
        let history = Slice::new(vec![TerminalLine::new(LineKind::System, READY_BANNER)]);
        let executing = Slice::new(false);
        let observers = ObserverSet::new();
        observers.push(watch_daemon(store, history.clone(), executing.clone()));
        Self {
            connection,
            history,
            executing,
            busy_timeout: timings.terminal_busy_timeout,
            observers,
        }
    }

    pub fn history(&self) -> SliceReader<Vec<TerminalLine>> {
        self.history.reader()
    }

    pub fn executing(&self) -> SliceReader<bool> {
        self.executing.reader()
    }

    /// Returns false when the input was ignored (blank, busy or offline).
    pub fn execute(&self, input: &str) -> bool {
        let command = input.trim();
        if command.is_empty() || self.executing.get() || !self.connection.is_connected() {
            return false;
        }
        self.history
            .modify(|lines| lines.push(TerminalLine::new(LineKind::Command, command)));
        self.connection.send(OutboundEnvelope::TerminalCommand {
            command: command.to_string(),
        });
        self.executing.replace(true);

        // Not tied to the reply: a command still running past the timeout
        // shows as idle, and a late timer may clear a newer command's flag.
        let executing = self.executing.clone();
        let timeout = self.busy_timeout;
        self.observers.push(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            executing.replace(false);
        }));
        true
    }
}

/// Log entries and terminal output may arrive in one wakeup. The busy flag
/// follows whichever came last: a fresh `Executing:` entry newer than the
/// output's own log entry keeps the terminal busy.
fn watch_daemon(
    store: &StateStore,
    history: Slice<Vec<TerminalLine>>,
    executing: Slice<bool>,
) -> JoinHandle<()> {
    let mut log_rx = store.event_log().subscribe();
    let mut output_rx = store.terminal_output().subscribe();
    let mut mark = log_rx.borrow_and_update().pushed();
    output_rx.borrow_and_update();

    tokio::spawn(async move {
        loop {
            let (mut log_dirty, mut output_dirty) = (false, false);
            tokio::select! {
                changed = log_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    log_dirty = true;
                }
                changed = output_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    output_dirty = true;
                }
            }
            output_dirty |= output_rx.has_changed().unwrap_or(false);
            let output = if output_dirty {
                output_rx.borrow_and_update().clone()
            } else {
                None
            };
            // read after the output so its log entry is already pushed
            log_dirty |= log_rx.has_changed().unwrap_or(false);

            let (started, finished) = if log_dirty {
                let log = log_rx.borrow_and_update();
                let fresh = log.since(mark);
                mark = log.pushed();
                let started = fresh.iter().rposition(|entry| is_executing(entry));
                let finished = output.as_ref().and_then(|output| {
                    let summary = output.summary();
                    fresh.iter().rposition(|entry| {
                        entry.source == TERMINAL_SOURCE
                            && entry.message == summary
                            && !is_executing(entry)
                    })
                });
                (started, finished)
            } else {
                (None, None)
            };

            match output {
                Some(output) => {
                    history.modify(|lines| lines.extend(output_lines(&output)));
                    let still_running = match (started, finished) {
                        (Some(started), Some(finished)) => started > finished,
                        _ => false,
                    };
                    executing.replace(still_running);
                }
                None if started.is_some() => executing.replace(true),
                None => {}
            }
        }
    })
}

fn is_executing(entry: &LogEntry) -> bool {
    entry.source == TERMINAL_SOURCE && entry.message.starts_with(EXECUTING_PREFIX)
}

fn output_lines(output: &TerminalOutput) -> Vec<TerminalLine> {
    let mut lines = Vec::new();
    let streams = [
        (LineKind::Output, &output.stdout),
        (LineKind::Error, &output.stderr),
        (LineKind::Error, &output.error),
    ];
    for (kind, text) in streams {
        if let Some(text) = text.as_deref().map(str::trim_end).filter(|t| !t.is_empty()) {
            lines.push(TerminalLine::new(kind, text));
        }
    }
    if lines.is_empty() {
        lines.push(TerminalLine::new(LineKind::System, COMMAND_COMPLETED_TEXT));
    }
    lines
}
