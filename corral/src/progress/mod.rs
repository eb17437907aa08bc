//! Build progress events and the helpers UIs use to render them.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

pub mod record;
pub mod replay;
pub mod scenario;

/// Caller-supplied progress sink. Invoked from the drain task; must be cheap
/// and must not block.
pub type OnProgress = Arc<dyn Fn(BuildProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Cached,
    Error,
}

impl StepStatus {
    /// Complete, cached, and error are all terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cached | Self::Error)
    }
}

/// One normalized observation from a build: either a step status transition
/// or a single cleaned log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildProgressEvent {
    /// Stable identifier derived from the vertex digest.
    pub step_id: String,
    /// Human-readable step name; empty for log-only events.
    pub step_name: String,
    /// Assigned in observation order; `-1` for log-only events.
    pub step_index: i32,
    /// `-1`: BuildKit does not know the total up front.
    pub total_steps: i32,
    pub status: StepStatus,
    /// One logical, already-cleaned log line; empty on status transitions.
    pub log_line: String,
    /// Populated iff `status` is [`StepStatus::Error`].
    pub error: String,
    /// True iff the step was fully satisfied from cache.
    pub cached: bool,
}

impl Default for BuildProgressEvent {
    fn default() -> Self {
        Self {
            step_id: String::new(),
            step_name: String::new(),
            step_index: -1,
            total_steps: -1,
            status: StepStatus::Pending,
            log_line: String::new(),
            error: String::new(),
            cached: false,
        }
    }
}

impl BuildProgressEvent {
    /// True for events that carry a log line rather than a status transition.
    #[must_use]
    pub fn is_log(&self) -> bool {
        !self.log_line.is_empty()
    }
}

/// Housekeeping vertices (`[internal] load build definition`, ...) that a UI
/// typically hides.
#[must_use]
pub fn is_internal_step(name: &str) -> bool {
    name.starts_with("[internal]")
}

/// Drops `--mount=...` flags from RUN steps and collapses whitespace runs.
#[must_use]
pub fn clean_step_name(name: &str) -> String {
    name.split_whitespace()
        .filter(|token| !token.starts_with("--mount="))
        .collect::<Vec<_>>()
        .join(" ")
}

/// First token inside the leading bracket: `"[stage-0 2/3] RUN x"` is
/// `"stage-0"`. Empty when the name has no stage prefix.
#[must_use]
pub fn parse_build_stage(name: &str) -> String {
    let Some(rest) = name.strip_prefix('[') else { return String::new() };
    let Some((inside, _)) = rest.split_once(']') else { return String::new() };
    inside.split_whitespace().next().unwrap_or_default().to_owned()
}

/// Compact duration for progress lines: `4.2s`, `3m 07s`, `1h 02m`.
#[must_use]
pub fn format_build_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Stage-qualified cleaned name, the label the fallback logger prints.
#[must_use]
pub fn format_step_label(name: &str) -> String {
    let cleaned = clean_step_name(name);
    let stage = parse_build_stage(&cleaned);
    if stage.is_empty() {
        cleaned
    } else {
        format!("{stage}: {cleaned}")
    }
}
