//! Feature-local logic that fakes request/response over the daemon's
//! broadcast stream, using timeouts, delayed re-queries and type matching.

pub mod architecture;
pub mod chat;
pub mod productivity;
pub mod projects;
pub mod studies;
pub mod terminal;

pub use architecture::ArchitectureAdapter;
pub use chat::{ChatAdapter, ChatMessage, ChatRole};
pub use productivity::{ProductivityAdapter, QuickAction, QuickActionCategory, QUICK_ACTIONS};
pub use projects::{ProjectEntry, ProjectsAdapter};
pub use studies::StudiesAdapter;
pub use terminal::{LineKind, TerminalAdapter, TerminalLine};

use crate::connection::{ConnectionHandle, ConnectionState};
use crate::store::{SliceReader, StateStore};
use ferve_core::wire::{InboundEnvelope, OutboundEnvelope};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

/// Calls `on_open` on every transition into `Open`, and once right away if
/// the connection is already open.
pub(crate) fn on_every_open<F>(state: SliceReader<ConnectionState>, mut on_open: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let mut rx = state.subscribe();
    tokio::spawn(async move {
        let mut was_open = false;
        loop {
            let open = *rx.borrow_and_update() == ConnectionState::Open;
            if open && !was_open {
                on_open();
            }
            was_open = open;
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Feeds every feature frame to `on_frame` until the store goes away.
pub(crate) fn on_feature_frames<F>(store: &StateStore, adapter: &'static str, mut on_frame: F) -> JoinHandle<()>
where
    F: FnMut(InboundEnvelope) + Send + 'static,
{
    let mut rx = store.subscribe_features();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => on_frame(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(event = "feature_frames_lagged", adapter, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Sends `envelope` after `delay`, if the connection is still open then.
pub(crate) fn send_later(
    connection: &ConnectionHandle,
    delay: Duration,
    envelope: OutboundEnvelope,
) -> JoinHandle<()> {
    let connection = connection.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        connection.send(envelope);
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::connection::{ConnectionHandle, ConnectionState};
    use crate::store::StateStore;
    use ferve_core::wire::OutboundEnvelope;
    use std::time::Duration;
    use tokio::sync::mpsc;

    pub struct Harness {
        pub store: StateStore,
        pub connection: ConnectionHandle,
        pub outbound: mpsc::Receiver<OutboundEnvelope>,
    }

    impl Harness {
        pub fn open() -> Self {
            let harness = Self::closed();
            harness.store.set_connection(ConnectionState::Open);
            harness
        }

        pub fn closed() -> Self {
            let store = StateStore::default();
            let (connection, outbound) = ConnectionHandle::detached(&store);
            Self {
                store,
                connection,
                outbound,
            }
        }

        pub fn sent(&mut self) -> Vec<OutboundEnvelope> {
            let mut sent = Vec::new();
            while let Ok(envelope) = self.outbound.try_recv() {
                sent.push(envelope);
            }
            sent
        }
    }

    /// Lets spawned observers run. On a paused clock this also advances time
    /// by a millisecond.
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
