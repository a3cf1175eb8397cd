use super::{on_every_open, on_feature_frames};
use crate::connection::ConnectionHandle;
use crate::store::{ObserverSet, Slice, SliceReader, StateStore};
use ferve_core::wire::{InboundEnvelope, OutboundEnvelope};
use ferve_core::{AnkiStats, DownloadFile, WorkContext};
use serde::Deserialize;
use tracing::{info, warn};

/// The daemon has sent both a bare list and `{files: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DownloadsPayload {
    List(Vec<DownloadFile>),
    Wrapped { files: Vec<DownloadFile> },
}

#[derive(Debug, Deserialize)]
struct ContextSwitched {
    context: WorkContext,
    #[serde(default)]
    message: Option<String>,
}

pub struct StudiesAdapter {
    connection: ConnectionHandle,
    anki: Slice<Option<AnkiStats>>,
    downloads: Slice<Vec<DownloadFile>>,
    context: Slice<Option<WorkContext>>,
    _observers: ObserverSet,
}

impl StudiesAdapter {
    pub fn attach(connection: ConnectionHandle, store: &StateStore) -> Self {
        let anki = Slice::new(None);
        let downloads = Slice::new(Vec::new());
        let context = Slice::new(None);
        let observers = ObserverSet::new();

        let (stats, files, active) = (anki.clone(), downloads.clone(), context.clone());
        observers.push(on_feature_frames(store, "studies", move |envelope| {
            apply(&stats, &files, &active, envelope)
        }));
        let on_open = connection.clone();
        observers.push(on_every_open(connection.state_reader(), move || {
            on_open.send(OutboundEnvelope::GetAnkiStats);
        }));

        Self {
            connection,
            anki,
            downloads,
            context,
            _observers: observers,
        }
    }

    pub fn anki(&self) -> SliceReader<Option<AnkiStats>> {
        self.anki.reader()
    }

    pub fn downloads(&self) -> SliceReader<Vec<DownloadFile>> {
        self.downloads.reader()
    }

    pub fn context(&self) -> SliceReader<Option<WorkContext>> {
        self.context.reader()
    }

    pub fn contexts(&self) -> &'static [WorkContext] {
        &WorkContext::ALL
    }

    pub fn refresh_anki(&self) -> bool {
        self.send_if_connected(OutboundEnvelope::GetAnkiStats)
    }

    pub fn scan_downloads(&self) -> bool {
        self.send_if_connected(OutboundEnvelope::ScanDownloads)
    }

    pub fn switch_context(&self, context: WorkContext) -> bool {
        self.send_if_connected(OutboundEnvelope::SwitchContext {
            context: context.as_str().to_string(),
        })
    }

    fn send_if_connected(&self, envelope: OutboundEnvelope) -> bool {
        if !self.connection.is_connected() {
            return false;
        }
        self.connection.send(envelope);
        true
    }
}

fn apply(
    anki: &Slice<Option<AnkiStats>>,
    downloads: &Slice<Vec<DownloadFile>>,
    context: &Slice<Option<WorkContext>>,
    envelope: InboundEnvelope,
) {
    match envelope.kind.as_str() {
        "anki_stats" => match envelope.payload::<AnkiStats>() {
            Ok(stats) => anki.replace(Some(stats)),
            Err(err) => warn!(event = "anki_payload_invalid", error = %err),
        },
        "downloads" => match envelope.payload::<DownloadsPayload>() {
            Ok(DownloadsPayload::List(files)) | Ok(DownloadsPayload::Wrapped { files }) => {
                downloads.replace(files)
            }
            Err(err) => warn!(event = "downloads_payload_invalid", error = %err),
        },
        "context_switched" => match envelope.payload::<ContextSwitched>() {
            Ok(switched) => {
                info!(
                    event = "context_switched",
                    context = %switched.context,
                    message = switched.message.as_deref().unwrap_or("")
                );
                context.replace(Some(switched.context));
            }
            Err(err) => warn!(event = "context_payload_invalid", error = %err),
        },
        _ => {}
    }
}
