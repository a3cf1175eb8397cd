use crate::connection::ConnectionState;
use crate::event_log::EventLog;
use ferve_core::wire::{AiResponse, InboundEnvelope, LogEntry, SystemStats, TerminalOutput};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

pub const FEATURE_BUS_CAPACITY: usize = 64;

/// One independently observable piece of state.
///
/// Clones share the same value. Whoever holds a `Slice` may replace it;
/// hand out a [`SliceReader`] to everybody else.
pub struct Slice<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Slice<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Slice<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn replace(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn modify(&self, update: impl FnOnce(&mut T)) {
        self.tx.send_modify(update);
    }

    pub fn reader(&self) -> SliceReader<T> {
        SliceReader {
            tx: self.tx.clone(),
        }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn observe<F>(&self, on_change: F) -> JoinHandle<()>
    where
        F: FnMut(&T) + Send + 'static,
    {
        observe_channel(self.tx.subscribe(), on_change)
    }
}

/// Read-only view of a [`Slice`].
pub struct SliceReader<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for SliceReader<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SliceReader<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Spawns a task that calls `on_change` after every replacement. Several
    /// quick replacements may be observed as one call with the latest value.
    pub fn observe<F>(&self, on_change: F) -> JoinHandle<()>
    where
        F: FnMut(&T) + Send + 'static,
    {
        observe_channel(self.tx.subscribe(), on_change)
    }
}

fn observe_channel<T, F>(mut rx: watch::Receiver<T>, mut on_change: F) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: FnMut(&T) + Send + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let value = rx.borrow_and_update().clone();
            on_change(&value);
        }
    })
}

/// Background tasks owned by one adapter; aborted when the set is dropped.
#[derive(Default)]
pub struct ObserverSet {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ObserverSet {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Shared client state. The connection task and the dispatcher are the only
/// writers; everything public is read-only.
#[derive(Clone)]
pub struct StateStore {
    connection: Slice<ConnectionState>,
    system_stats: Slice<SystemStats>,
    event_log: Slice<EventLog>,
    terminal_output: Slice<Option<TerminalOutput>>,
    ai_response: Slice<Option<AiResponse>>,
    features: broadcast::Sender<InboundEnvelope>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(crate::event_log::DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl StateStore {
    pub fn new(event_log_capacity: usize) -> Self {
        let (features, _rx) = broadcast::channel(FEATURE_BUS_CAPACITY);
        Self {
            connection: Slice::new(ConnectionState::Disconnected),
            system_stats: Slice::new(SystemStats::default()),
            event_log: Slice::new(EventLog::with_capacity(event_log_capacity)),
            terminal_output: Slice::new(None),
            ai_response: Slice::new(None),
            features,
        }
    }

    pub fn connection(&self) -> SliceReader<ConnectionState> {
        self.connection.reader()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get() == ConnectionState::Open
    }

    pub fn system_stats(&self) -> SliceReader<SystemStats> {
        self.system_stats.reader()
    }

    pub fn event_log(&self) -> SliceReader<EventLog> {
        self.event_log.reader()
    }

    pub fn terminal_output(&self) -> SliceReader<Option<TerminalOutput>> {
        self.terminal_output.reader()
    }

    pub fn ai_response(&self) -> SliceReader<Option<AiResponse>> {
        self.ai_response.reader()
    }

    /// Daemon frames the dispatcher does not interpret (projects, tasks,
    /// pomodoro, anki, ...), forwarded unchanged.
    pub fn subscribe_features(&self) -> broadcast::Receiver<InboundEnvelope> {
        self.features.subscribe()
    }

    pub(crate) fn set_connection(&self, state: ConnectionState) {
        self.connection.send_if_changed(state);
    }

    pub(crate) fn set_system_stats(&self, stats: SystemStats) {
        self.system_stats.replace(stats);
    }

    pub(crate) fn set_terminal_output(&self, output: TerminalOutput) {
        self.terminal_output.replace(Some(output));
    }

    pub(crate) fn set_ai_response(&self, response: AiResponse) {
        self.ai_response.replace(Some(response));
    }

    pub(crate) fn push_log(&self, entry: LogEntry) {
        self.event_log.modify(|log| log.push(entry));
    }

    pub(crate) fn forward_feature(&self, envelope: InboundEnvelope) {
        if self.features.send(envelope).is_err() {
            debug!(event = "feature_frame_unobserved");
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Slice<T> {
    /// Replaces the value only when it differs, so observers are not woken
    /// for no-op transitions.
    pub fn send_if_changed(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
