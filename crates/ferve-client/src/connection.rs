use crate::config::ClientConfig;
use crate::dispatcher;
use crate::store::{SliceReader, StateStore};
use ferve_core::wire::{decode_frame, encode_frame, OutboundEnvelope};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type DaemonSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    ReconnectPending,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::ReconnectPending => "reconnect_pending",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    None,
    Dial,
    ScheduleReconnect,
}

/// Socket-free bookkeeping of the connection state machine.
///
/// There is no terminal state: every drop leads back to `Connecting` through
/// exactly one pending reconnect.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Explicit connect request. From `ReconnectPending` this replaces the
    /// pending timer.
    pub fn connect(&mut self) -> LifecycleAction {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::ReconnectPending => {
                self.state = ConnectionState::Connecting;
                LifecycleAction::Dial
            }
            ConnectionState::Connecting | ConnectionState::Open => LifecycleAction::None,
        }
    }

    pub fn opened(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        true
    }

    pub fn closed(&mut self) -> LifecycleAction {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                self.state = ConnectionState::ReconnectPending;
                LifecycleAction::ScheduleReconnect
            }
            ConnectionState::ReconnectPending | ConnectionState::Disconnected => {
                LifecycleAction::None
            }
        }
    }

    /// Dial failures and socket errors take the same path as a close.
    pub fn failed(&mut self) -> LifecycleAction {
        self.closed()
    }

    pub fn timer_fired(&mut self) -> LifecycleAction {
        if self.state != ConnectionState::ReconnectPending {
            return LifecycleAction::None;
        }
        self.state = ConnectionState::Connecting;
        LifecycleAction::Dial
    }

    pub fn shutdown(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Connect,
    Shutdown,
}

enum Step {
    Dial,
    Reconnect,
    Stop,
}

enum SessionEnd {
    Closed,
    Failed,
    Stop,
}

/// Owns the single daemon socket. Only reachable through a
/// [`ConnectionHandle`].
pub struct ConnectionManager {
    config: ClientConfig,
    store: StateStore,
    lifecycle: Lifecycle,
    outbound_rx: mpsc::Receiver<OutboundEnvelope>,
    control_rx: mpsc::Receiver<Control>,
}

impl ConnectionManager {
    pub fn spawn(config: ClientConfig, store: StateStore) -> ConnectionHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(8);
        let state = store.connection();
        let manager = ConnectionManager {
            config,
            store,
            lifecycle: Lifecycle::new(),
            outbound_rx,
            control_rx,
        };
        let task = tokio::spawn(manager.run());
        ConnectionHandle {
            inner: Arc::new(HandleInner {
                outbound: outbound_tx,
                control: control_tx,
                state,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    async fn run(mut self) {
        let mut step = match self.lifecycle.connect() {
            LifecycleAction::Dial => Step::Dial,
            _ => Step::Stop,
        };
        loop {
            step = match step {
                Step::Dial => self.dial().await,
                Step::Reconnect => self.wait_reconnect().await,
                Step::Stop => break,
            };
        }
        self.lifecycle.shutdown();
        self.publish();
        info!(event = "connection_shutdown");
    }

    fn publish(&self) {
        self.store.set_connection(self.lifecycle.state());
    }

    fn on_drop(&mut self, failed: bool) -> Step {
        let action = if failed {
            self.lifecycle.failed()
        } else {
            self.lifecycle.closed()
        };
        self.publish();
        if action == LifecycleAction::ScheduleReconnect {
            info!(
                event = "reconnect_scheduled",
                delay_ms = self.config.reconnect_delay.as_millis() as u64
            );
        }
        Step::Reconnect
    }

    async fn dial(&mut self) -> Step {
        self.publish();
        let url = self.config.daemon_url.clone();
        debug!(event = "daemon_connecting", url = %url);
        let connecting = connect_async(url.as_str());
        tokio::pin!(connecting);
        let connect = loop {
            tokio::select! {
                result = &mut connecting => break result,
                control = self.control_rx.recv() => match control {
                    Some(Control::Connect) => {}
                    Some(Control::Shutdown) | None => return Step::Stop,
                },
            }
        };
        let ws = match connect {
            Ok((ws, _)) => ws,
            Err(err) => {
                warn!(event = "daemon_connect_error", url = %url, error = %err);
                return self.on_drop(true);
            }
        };

        // stale envelopes from the previous socket are never replayed
        self.discard_queued();
        self.lifecycle.opened();
        self.publish();
        info!(event = "daemon_connected", url = %url);

        match self.session(ws).await {
            SessionEnd::Closed => {
                info!(event = "daemon_closed");
                self.discard_queued();
                self.on_drop(false)
            }
            SessionEnd::Failed => {
                self.discard_queued();
                self.on_drop(true)
            }
            SessionEnd::Stop => Step::Stop,
        }
    }

    async fn session(&mut self, mut ws: DaemonSocket) -> SessionEnd {
        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.handle_text(&text),
                        Err(err) => warn!(event = "frame_decode_error", error = %err),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "daemon_socket_error", error = %err);
                        return SessionEnd::Failed;
                    }
                },
                out = self.outbound_rx.recv() => match out {
                    Some(envelope) => {
                        let frame = match encode_frame(&envelope, self.config.max_frame_bytes) {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(event = "frame_encode_error", kind = envelope.kind(), error = %err);
                                continue;
                            }
                        };
                        if let Err(err) = ws.send(Message::Text(frame)).await {
                            warn!(event = "daemon_send_error", kind = envelope.kind(), error = %err);
                            return SessionEnd::Failed;
                        }
                        debug!(event = "envelope_sent", kind = envelope.kind());
                    }
                    None => {
                        let _ = ws.close(None).await;
                        return SessionEnd::Stop;
                    }
                },
                control = self.control_rx.recv() => match control {
                    Some(Control::Connect) => {}
                    Some(Control::Shutdown) | None => {
                        let _ = ws.close(None).await;
                        return SessionEnd::Stop;
                    }
                },
            }
        }
    }

    async fn wait_reconnect(&mut self) -> Step {
        let timer = tokio::time::sleep(self.config.reconnect_delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => {
                    return match self.lifecycle.timer_fired() {
                        LifecycleAction::Dial => Step::Dial,
                        _ => Step::Reconnect,
                    };
                }
                control = self.control_rx.recv() => match control {
                    Some(Control::Connect) => {
                        if self.lifecycle.connect() == LifecycleAction::Dial {
                            debug!(event = "reconnect_timer_cancelled");
                            return Step::Dial;
                        }
                    }
                    Some(Control::Shutdown) | None => return Step::Stop,
                },
                out = self.outbound_rx.recv() => match out {
                    Some(envelope) => {
                        debug!(event = "envelope_dropped", kind = envelope.kind(), state = %self.lifecycle.state());
                    }
                    None => return Step::Stop,
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match decode_frame(text, self.config.max_frame_bytes) {
            Ok(envelope) => {
                dispatcher::dispatch(&self.store, envelope);
            }
            Err(err) => warn!(event = "frame_decode_error", error = %err),
        }
    }

    fn discard_queued(&mut self) {
        while let Ok(envelope) = self.outbound_rx.try_recv() {
            debug!(event = "envelope_dropped", kind = envelope.kind(), state = %self.lifecycle.state());
        }
    }
}

struct HandleInner {
    outbound: mpsc::Sender<OutboundEnvelope>,
    control: mpsc::Sender<Control>,
    state: SliceReader<ConnectionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap clone of the connection, handed to every adapter. The socket task
/// stops once every handle is gone.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Fire-and-forget. Silently dropped unless the connection is open.
    pub fn send(&self, envelope: OutboundEnvelope) {
        let state = self.state();
        if state != ConnectionState::Open {
            debug!(event = "envelope_dropped", kind = envelope.kind(), state = %state);
            return;
        }
        if let Err(err) = self.inner.outbound.try_send(envelope) {
            let kind = match &err {
                mpsc::error::TrySendError::Full(envelope)
                | mpsc::error::TrySendError::Closed(envelope) => envelope.kind(),
            };
            debug!(event = "envelope_dropped", kind, reason = "queue");
        }
    }

    /// Dial now. Cancels a pending reconnect; ignored while connecting or
    /// open. Returns false once the connection task is gone (after
    /// [`shutdown`](Self::shutdown)): a shut-down handle never dials again.
    pub fn connect(&self) -> bool {
        match self.inner.control.try_send(Control::Connect) {
            Ok(()) => true,
            Err(err) => {
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue",
                    mpsc::error::TrySendError::Closed(_) => "shutdown",
                };
                debug!(event = "connect_request_dropped", reason);
                false
            }
        }
    }

    /// Closes the socket and waits for the connection task to finish.
    pub async fn shutdown(&self) {
        let _ = self.inner.control.send(Control::Shutdown).await;
        let task = self.inner.task.lock().ok().and_then(|mut task| task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn state_reader(&self) -> SliceReader<ConnectionState> {
        self.inner.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub async fn wait_until_open(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.state.subscribe();
        let opened = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|state| *state == ConnectionState::Open)).await,
            Ok(Ok(_))
        );
        opened
    }

    /// A handle with no socket task behind it. The returned receiver sees
    /// whatever passes the `send` gate.
    #[cfg(test)]
    pub(crate) fn detached(store: &StateStore) -> (Self, mpsc::Receiver<OutboundEnvelope>) {
        let (outbound, outbound_rx) = mpsc::channel(256);
        let (control, _control_rx) = mpsc::channel(8);
        let handle = ConnectionHandle {
            inner: Arc::new(HandleInner {
                outbound,
                control,
                state: store.connection(),
                task: Mutex::new(None),
            }),
        };
        (handle, outbound_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_follows_connect_open_close() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ConnectionState::Disconnected);

        assert_eq!(lifecycle.connect(), LifecycleAction::Dial);
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
        assert_eq!(lifecycle.connect(), LifecycleAction::None);

        assert!(lifecycle.opened());
        assert_eq!(lifecycle.state(), ConnectionState::Open);
        assert_eq!(lifecycle.connect(), LifecycleAction::None);

        assert_eq!(lifecycle.closed(), LifecycleAction::ScheduleReconnect);
        assert_eq!(lifecycle.state(), ConnectionState::ReconnectPending);
        assert_eq!(lifecycle.timer_fired(), LifecycleAction::Dial);
        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
    }

    #[test]
    fn repeated_drops_schedule_a_single_reconnect() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.connect();
        lifecycle.opened();

        assert_eq!(lifecycle.failed(), LifecycleAction::ScheduleReconnect);
        for _ in 0..5 {
            assert_eq!(lifecycle.closed(), LifecycleAction::None);
            assert_eq!(lifecycle.failed(), LifecycleAction::None);
        }
        assert_eq!(lifecycle.state(), ConnectionState::ReconnectPending);
        assert_eq!(lifecycle.timer_fired(), LifecycleAction::Dial);
        assert_eq!(lifecycle.timer_fired(), LifecycleAction::None);
    }

    #[test]
    fn dial_failure_funnels_into_reconnect() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.connect();
        assert_eq!(lifecycle.failed(), LifecycleAction::ScheduleReconnect);
        assert!(!lifecycle.opened());
    }

    #[test]
    fn explicit_connect_replaces_pending_timer() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.connect();
        lifecycle.closed();
        assert_eq!(lifecycle.connect(), LifecycleAction::Dial);
        // the old timer firing later must not start a second dial
        assert_eq!(lifecycle.timer_fired(), LifecycleAction::None);
    }

    #[tokio::test]
    async fn send_is_a_no_op_unless_open() {
        let store = StateStore::default();
        let (handle, mut outbound) = ConnectionHandle::detached(&store);

        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::ReconnectPending,
        ] {
            store.set_connection(state);
            handle.send(OutboundEnvelope::GetTasks);
            assert!(outbound.try_recv().is_err(), "sent while {state}");
        }

        store.set_connection(ConnectionState::Open);
        handle.send(OutboundEnvelope::GetTasks);
        assert_eq!(outbound.try_recv().ok(), Some(OutboundEnvelope::GetTasks));
        assert!(handle.is_connected());
    }

    #[tokio::test]
    async fn wait_until_open_times_out() {
        let store = StateStore::default();
        let (handle, _outbound) = ConnectionHandle::detached(&store);
        assert!(!handle.wait_until_open(Duration::from_millis(20)).await);

        store.set_connection(ConnectionState::Open);
        assert!(handle.wait_until_open(Duration::from_millis(20)).await);
    }
}
