//! Real-time sync core between the Ferve dashboard and its host daemon.
//!
//! One [`ConnectionManager`] owns the socket and feeds decoded frames through
//! the [`dispatcher`] into a [`StateStore`]. Feature adapters read the store
//! and talk back through a [`ConnectionHandle`].

pub mod adapters;
pub mod ai;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod event_log;
pub mod logging;
pub mod store;

pub use config::{AdapterTimings, ClientConfig, ConfigError};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, Lifecycle, LifecycleAction};
pub use dispatcher::{dispatch, DispatchOutcome};
pub use event_log::EventLog;
pub use store::{ObserverSet, Slice, SliceReader, StateStore};

pub use ferve_core::wire::{InboundEnvelope, LogEntry, OutboundEnvelope, SystemStats};
