//! Records live progress callbacks into a replayable scenario.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use crate::progress::{
    scenario::{BuildScenario, TimedEvent},
    BuildProgressEvent, OnProgress,
};

/// Timestamps every event it sees and keeps `{delay_ms, event}` tuples.
///
/// The only lock in this crate lives here; it is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    previous: Option<Instant>,
    events: Vec<TimedEvent>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloneable sink that can be handed to any builder as the progress
    /// callback.
    #[must_use]
    pub fn callback(&self) -> OnProgress {
        let recorder = self.clone();
        Arc::new(move |event| recorder.record(event))
    }

    pub fn record(&self, event: BuildProgressEvent) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let delay_ms = match inner.previous {
            None => 0,
            Some(previous) => now.duration_since(previous).as_millis() as u64,
        };
        inner.previous = Some(now);
        inner.events.push(TimedEvent { delay_ms, event });
    }

    /// Copy of everything recorded so far. Later events do not leak into
    /// snapshots taken earlier.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TimedEvent> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).events.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Package the recording as a named scenario.
    #[must_use]
    pub fn to_scenario(&self, name: &str, description: &str) -> BuildScenario {
        BuildScenario {
            name: name.to_owned(),
            description: description.to_owned(),
            events: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::progress::StepStatus;

    fn event(name: &str) -> BuildProgressEvent {
        BuildProgressEvent {
            step_id: "sha256:1".to_owned(),
            step_name: name.to_owned(),
            step_index: 0,
            status: StepStatus::Running,
            ..BuildProgressEvent::default()
        }
    }

    #[test]
    fn first_event_has_zero_delay() {
        let recorder = EventRecorder::new();
        recorder.record(event("a"));
        recorder.record(event("b"));
        let events = recorder.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].delay_ms, 0);
    }

    #[test]
    fn snapshots_do_not_see_later_events() {
        let recorder = EventRecorder::new();
        recorder.record(event("a"));
        let early = recorder.snapshot();
        recorder.record(event("b"));
        assert_eq!(early.len(), 1);
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn callback_feeds_the_recorder() {
        let recorder = EventRecorder::new();
        let callback = recorder.callback();
        callback(event("via-callback"));
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.snapshot()[0].event.step_name, "via-callback");
    }

    #[test]
    fn to_scenario_names_the_recording() {
        let recorder = EventRecorder::new();
        recorder.record(event("a"));
        let scenario = recorder.to_scenario("smoke", "one event");
        assert_eq!(scenario.name, "smoke");
        assert_eq!(scenario.events.len(), 1);
    }
}
