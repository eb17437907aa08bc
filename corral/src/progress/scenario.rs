//! Recorded build scenarios: named, timed event sequences that make a build
//! replayable in tests without a daemon.

use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::progress::{is_internal_step, BuildProgressEvent};

/// An event plus the wall-clock delay since the previous one (zero for the
/// first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub delay_ms: u64,
    pub event: BuildProgressEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildScenario {
    pub name: String,
    pub description: String,
    pub events: Vec<TimedEvent>,
}

/// Distinct delays per event class, for scenarios that should feel like a
/// real build when replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub internal: Duration,
    pub running: Duration,
    pub log: Duration,
    pub terminal: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            internal: Duration::from_millis(40),
            running: Duration::from_millis(250),
            log: Duration::from_millis(80),
            terminal: Duration::from_millis(120),
        }
    }
}

impl BuildScenario {
    /// Same gap between every pair of consecutive events.
    #[must_use]
    pub fn uniform(
        name: &str,
        description: &str,
        events: Vec<BuildProgressEvent>,
        delay: Duration,
    ) -> Self {
        let delay_ms = delay.as_millis() as u64;
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| TimedEvent { delay_ms: if i == 0 { 0 } else { delay_ms }, event })
            .collect();
        Self { name: name.to_owned(), description: description.to_owned(), events }
    }

    /// Gap chosen per event: internal steps, running transitions, log lines,
    /// and terminal transitions each get their own delay.
    #[must_use]
    pub fn paced(
        name: &str,
        description: &str,
        events: Vec<BuildProgressEvent>,
        pacing: &Pacing,
    ) -> Self {
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                let delay = if i == 0 {
                    Duration::ZERO
                } else if event.is_log() {
                    pacing.log
                } else if is_internal_step(&event.step_name) {
                    pacing.internal
                } else if event.status.is_terminal() {
                    pacing.terminal
                } else {
                    pacing.running
                };
                TimedEvent { delay_ms: delay.as_millis() as u64, event }
            })
            .collect();
        Self { name: name.to_owned(), description: description.to_owned(), events }
    }

    pub fn from_slice(bytes: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(bytes).map_err(io::Error::from)
    }

    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(io::Error::from)
    }

    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_slice(&fs::read(path)?)
    }

    /// Writes the scenario as JSON, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_vec()?)
    }

    /// The events without their timing, for equality comparisons.
    #[must_use]
    pub fn flat_events(&self) -> Vec<BuildProgressEvent> {
        self.events.iter().map(|te| te.event.clone()).collect()
    }
}
