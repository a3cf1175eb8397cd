use super::{on_every_open, on_feature_frames};
use crate::config::AdapterTimings;
use crate::connection::ConnectionHandle;
use crate::store::{ObserverSet, Slice, SliceReader, StateStore};
use ferve_core::wire::{InboundEnvelope, OutboundEnvelope, TerminalOutput};
use ferve_core::{GitStatus, Project};
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

pub const RUNNING_PLACEHOLDER: &str = "⏳ Running...";

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectEntry {
    pub id: String,
    pub project: Project,
    pub git_status: Option<GitStatus>,
    pub command_output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectOutput {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(flatten)]
    output: TerminalOutput,
}

/// Project ids awaiting a reply, oldest first. Neither `project_output` nor
/// `git_status` replies are guaranteed to name their project.
#[derive(Default)]
struct PendingReplies {
    ids: Mutex<VecDeque<String>>,
}

impl PendingReplies {
    fn push(&self, project_id: &str) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.push_back(project_id.to_string());
        }
    }

    /// A named reply settles its own request; an unnamed one the oldest.
    fn settle(&self, named: Option<String>) -> Option<String> {
        let mut ids = self.ids.lock().ok()?;
        match named {
            Some(project_id) => {
                if let Some(index) = ids.iter().position(|id| *id == project_id) {
                    ids.remove(index);
                }
                Some(project_id)
            }
            None => ids.pop_front(),
        }
    }
}

pub struct ProjectsAdapter {
    inner: Arc<Inner>,
    observers: ObserverSet,
}

struct Inner {
    connection: ConnectionHandle,
    projects: Slice<Vec<ProjectEntry>>,
    commands: PendingReplies,
    git_requests: PendingReplies,
    git_status_delay: Duration,
}

impl ProjectsAdapter {
    pub fn attach(connection: ConnectionHandle, store: &StateStore, timings: &AdapterTimings) -> Self {
        let inner = Arc::new(Inner {
            connection,
            projects: Slice::new(Vec::new()),
            commands: PendingReplies::default(),
            git_requests: PendingReplies::default(),
            git_status_delay: timings.git_status_delay,
        });
        let observers = ObserverSet::new();

        let frames = inner.clone();
        observers.push(on_feature_frames(store, "projects", move |envelope| {
            frames.apply(envelope)
        }));
        let refresh = inner.clone();
        observers.push(on_every_open(inner.connection.state_reader(), move || {
            refresh.refresh();
        }));

        Self { inner, observers }
    }

    pub fn projects(&self) -> SliceReader<Vec<ProjectEntry>> {
        self.inner.projects.reader()
    }

    pub fn refresh(&self) {
        if let Some(task) = self.inner.refresh() {
            self.observers.push(task);
        }
    }

    pub fn run_command(&self, project_id: &str, command_key: &str) -> bool {
        if !self.inner.connection.is_connected() {
            return false;
        }
        self.inner.connection.send(OutboundEnvelope::ProjectCommand {
            project_id: project_id.to_string(),
            command: command_key.to_string(),
        });
        self.inner.set_output(project_id, RUNNING_PLACEHOLDER.to_string());
        self.inner.commands.push(project_id);
        self.follow_up_git_status(project_id);
        true
    }

    pub fn git_pull(&self, project_id: &str) -> bool {
        if !self.inner.connection.is_connected() {
            return false;
        }
        self.inner.connection.send(OutboundEnvelope::GitPull {
            project_id: project_id.to_string(),
        });
        self.follow_up_git_status(project_id);
        true
    }

    pub fn open_in_editor(&self, project_id: &str) {
        self.inner.connection.send(OutboundEnvelope::OpenVscode {
            project_id: project_id.to_string(),
        });
    }

    fn follow_up_git_status(&self, project_id: &str) {
        let inner = self.inner.clone();
        let project_id = project_id.to_string();
        self.observers.push(tokio::spawn(async move {
            tokio::time::sleep(inner.git_status_delay).await;
            inner.request_git_status(&project_id);
        }));
    }
}

impl Inner {
    /// `get_projects` now, then `git_status` for every git-enabled project
    /// known once the delay has passed.
    fn refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.connection.is_connected() {
            return None;
        }
        self.connection.send(OutboundEnvelope::GetProjects);
        let inner = self.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(inner.git_status_delay).await;
            let ids: Vec<String> = inner.projects.with(|projects| {
                projects
                    .iter()
                    .filter(|entry| entry.project.git_enabled)
                    .map(|entry| entry.id.clone())
                    .collect()
            });
            for project_id in ids {
                inner.request_git_status(&project_id);
            }
        }))
    }

    fn request_git_status(&self, project_id: &str) {
        if !self.connection.is_connected() {
            return;
        }
        self.git_requests.push(project_id);
        self.connection.send(OutboundEnvelope::GitStatus {
            project_id: project_id.to_string(),
        });
    }

    fn apply(&self, envelope: InboundEnvelope) {
        match envelope.kind.as_str() {
            "projects" => match envelope.payload::<BTreeMap<String, Project>>() {
                Ok(projects) => self.replace_projects(projects),
                Err(err) => warn!(event = "projects_payload_invalid", error = %err),
            },
            "git_status" => match envelope.payload::<GitStatus>() {
                Ok(status) => {
                    let Some(project_id) = self.git_requests.settle(status.project_id.clone())
                    else {
                        debug!(event = "git_status_unattributed");
                        return;
                    };
                    self.projects.modify(|projects| {
                        if let Some(entry) = projects.iter_mut().find(|e| e.id == project_id) {
                            entry.git_status = Some(status);
                        }
                    });
                }
                Err(err) => warn!(event = "git_status_payload_invalid", error = %err),
            },
            "project_output" => match envelope.payload::<ProjectOutput>() {
                Ok(result) => {
                    let Some(project_id) = self.commands.settle(result.project_id) else {
                        debug!(event = "project_output_unattributed");
                        return;
                    };
                    self.set_output(&project_id, result.output.summary().to_string());
                }
                Err(err) => warn!(event = "project_output_payload_invalid", error = %err),
            },
            _ => {}
        }
    }

    fn replace_projects(&self, incoming: BTreeMap<String, Project>) {
        self.projects.modify(|projects| {
            let mut previous: BTreeMap<String, ProjectEntry> = projects
                .drain(..)
                .map(|entry| (entry.id.clone(), entry))
                .collect();
            *projects = incoming
                .into_iter()
                .map(|(id, project)| {
                    let kept = previous.remove(&id);
                    ProjectEntry {
                        git_status: kept.as_ref().and_then(|e| e.git_status.clone()),
                        command_output: kept.and_then(|e| e.command_output),
                        id,
                        project,
                    }
                })
                .collect();
        });
    }

    fn set_output(&self, project_id: &str, output: String) {
        self.projects.modify(|projects| {
            if let Some(entry) = projects.iter_mut().find(|e| e.id == project_id) {
                entry.command_output = Some(output);
            }
        });
    }
}
