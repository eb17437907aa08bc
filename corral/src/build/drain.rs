//! Normalizes raw build status snapshots into progress events.

use std::{
    collections::{HashMap, HashSet},
    sync::OnceLock,
    time::SystemTime,
};

use log::{error, info};
use regex::Regex;

use crate::progress::{format_step_label, BuildProgressEvent, OnProgress, StepStatus};

/// One delivery from the build status stream.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusSnapshot {
    pub(crate) vertexes: Vec<VertexUpdate>,
    pub(crate) logs: Vec<VertexLogChunk>,
}

/// Current state of one vertex, as the daemon reports it.
#[derive(Debug, Clone, Default)]
pub(crate) struct VertexUpdate {
    pub(crate) digest: String,
    pub(crate) name: String,
    pub(crate) started_at: Option<SystemTime>,
    pub(crate) completed_at: Option<SystemTime>,
    pub(crate) cached: bool,
    pub(crate) error: String,
}

impl VertexUpdate {
    fn status(&self) -> StepStatus {
        match (self.started_at.is_some(), self.completed_at.is_some(), self.cached) {
            (_, true, true) => StepStatus::Cached,
            (_, true, false) => StepStatus::Complete,
            (true, false, _) => StepStatus::Running,
            (false, false, _) => StepStatus::Pending,
        }
    }
}

/// Raw log bytes attributed to a vertex.
#[derive(Debug, Clone, Default)]
pub(crate) struct VertexLogChunk {
    pub(crate) vertex: String,
    pub(crate) data: Vec<u8>,
}

/// Where normalized events go: the caller's callback, or the crate logger
/// when no callback was supplied.
pub(crate) enum EventSink {
    Callback(OnProgress),
    /// `quiet` drops everything except vertex errors.
    Logger { quiet: bool },
}

/// Drains status snapshots, deduplicating per-vertex transitions and
/// assigning stable step indices in observation order.
pub(crate) struct StatusDrain {
    sink: EventSink,
    step_index: HashMap<String, i32>,
    last_status: HashMap<String, StepStatus>,
    already_logged: HashSet<String>,
    first_error: Option<String>,
}

impl StatusDrain {
    pub(crate) fn new(sink: EventSink) -> Self {
        Self {
            sink,
            step_index: HashMap::new(),
            last_status: HashMap::new(),
            already_logged: HashSet::new(),
            first_error: None,
        }
    }

    /// The first vertex error seen during the build, kept as a diagnostic;
    /// the solve result stays authoritative.
    pub(crate) fn first_error(&self) -> Option<&str> {
        self.first_error.as_deref()
    }

    pub(crate) fn absorb(&mut self, snapshot: &StatusSnapshot) {
        for vertex in &snapshot.vertexes {
            self.absorb_vertex(vertex);
        }
        for chunk in &snapshot.logs {
            self.absorb_log(chunk);
        }
    }

    fn absorb_vertex(&mut self, vertex: &VertexUpdate) {
        if !vertex.error.is_empty() {
            if self.last_status.get(&vertex.digest) == Some(&StepStatus::Error) {
                return;
            }
            if self.first_error.is_none() {
                self.first_error = Some(vertex.error.clone());
            }
            let step_index = self.index_for(&vertex.digest);
            self.last_status.insert(vertex.digest.clone(), StepStatus::Error);
            self.emit(BuildProgressEvent {
                step_id: vertex.digest.clone(),
                step_name: vertex.name.clone(),
                step_index,
                status: StepStatus::Error,
                error: vertex.error.clone(),
                cached: vertex.cached,
                ..BuildProgressEvent::default()
            });
            return;
        }

        // Nameless placeholder vertices carry nothing worth showing.
        if vertex.name.is_empty() {
            return;
        }

        let status = vertex.status();
        if self.last_status.get(&vertex.digest) == Some(&status) {
            return;
        }

        let step_index = self.index_for(&vertex.digest);
        self.last_status.insert(vertex.digest.clone(), status);
        self.emit(BuildProgressEvent {
            step_id: vertex.digest.clone(),
            step_name: vertex.name.clone(),
            step_index,
            status,
            cached: vertex.cached,
            ..BuildProgressEvent::default()
        });
    }

    fn absorb_log(&mut self, chunk: &VertexLogChunk) {
        let text = String::from_utf8_lossy(&chunk.data);
        for line in split_log_lines(&text) {
            self.emit(BuildProgressEvent {
                step_id: chunk.vertex.clone(),
                status: StepStatus::Running,
                log_line: line,
                ..BuildProgressEvent::default()
            });
        }
    }

    fn index_for(&mut self, digest: &str) -> i32 {
        let next = self.step_index.len() as i32;
        *self.step_index.entry(digest.to_owned()).or_insert(next)
    }

    fn emit(&mut self, event: BuildProgressEvent) {
        match &self.sink {
            EventSink::Callback(on_progress) => on_progress(event),
            EventSink::Logger { quiet } => {
                if event.status == StepStatus::Error {
                    error!("build step {:?} failed: {}", event.step_name, event.error);
                } else if !quiet {
                    if event.is_log() {
                        info!("build: {}", event.log_line);
                    } else if self.already_logged.insert(event.step_id.clone()) {
                        info!("build step #{}: {}", event.step_index, format_step_label(&event.step_name));
                    }
                }
            }
        }
    }
}

/// Splits raw log bytes into displayable lines: trailing newline trimmed,
/// carriage-return progress rewrites collapsed to their final form, ANSI
/// escapes stripped, empties dropped.
fn split_log_lines(data: &str) -> Vec<String> {
    data.trim_end_matches(['\n', '\r'])
        .split('\n')
        .filter_map(|line| {
            // What a terminal would show after CR-based rewrites (apt, pip, npm).
            let line = line.rsplit('\r').next().unwrap_or(line);
            let line = strip_ansi(line);
            (!line.is_empty()).then_some(line)
        })
        .collect()
}

fn strip_ansi(line: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("static pattern"));
    ansi.replace_all(line, "").into_owned()
}
