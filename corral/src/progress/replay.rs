//! A builder double that replays a canned event sequence instead of talking
//! to a daemon.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    build::{ImageBuildOptions, ImageBuilder},
    error::{Error, Result},
    progress::scenario::{BuildScenario, TimedEvent},
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Instant,
    Timed { speed: f64 },
}

/// Satisfies [`ImageBuilder`] deterministically.
///
/// Instant mode emits the whole sequence synchronously before returning.
/// Timed mode honors recorded delays and aborts promptly on cancellation.
#[derive(Debug, Clone)]
pub struct ReplayBuilder {
    events: Vec<TimedEvent>,
    mode: Mode,
}

impl ReplayBuilder {
    /// Replays `events` back-to-back, in order, with no delays.
    #[must_use]
    pub fn instant(events: Vec<crate::progress::BuildProgressEvent>) -> Self {
        let events = events.into_iter().map(|event| TimedEvent { delay_ms: 0, event }).collect();
        Self { events, mode: Mode::Instant }
    }

    /// Replays a recorded scenario with its timing. `speed` divides every
    /// delay; zero or negative is treated as 1.
    #[must_use]
    pub fn timed(scenario: &BuildScenario, speed: f64) -> Self {
        let speed = if speed > 0.0 { speed } else { 1.0 };
        Self { events: scenario.events.clone(), mode: Mode::Timed { speed } }
    }
}

#[async_trait]
impl ImageBuilder for ReplayBuilder {
    async fn build(&self, opts: &ImageBuildOptions, cancel: CancellationToken) -> Result<()> {
        for timed in &self.events {
            if let Mode::Timed { speed } = self.mode {
                let delay = Duration::from_millis(timed.delay_ms).div_f64(speed);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::build_cancelled()),
                    () = tokio::time::sleep(delay) => {}
                }
            } else if cancel.is_cancelled() {
                return Err(Error::build_cancelled());
            }
            if let Some(on_progress) = &opts.on_progress {
                on_progress(timed.event.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::progress::{record::EventRecorder, BuildProgressEvent, StepStatus};

    fn events() -> Vec<BuildProgressEvent> {
        (0..3)
            .map(|i| BuildProgressEvent {
                step_id: format!("sha256:{i}"),
                step_name: format!("[stage-0 {}/3] RUN step{i}", i + 1),
                step_index: i,
                status: StepStatus::Running,
                ..BuildProgressEvent::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn instant_emits_everything_in_order() {
        let recorder = EventRecorder::new();
        let opts =
            ImageBuildOptions { on_progress: Some(recorder.callback()), ..Default::default() };

        let builder = ReplayBuilder::instant(events());
        builder.build(&opts, CancellationToken::new()).await.unwrap();

        let replayed: Vec<_> =
            recorder.snapshot().into_iter().map(|te| te.event.step_id).collect();
        assert_eq!(replayed, vec!["sha256:0", "sha256:1", "sha256:2"]);
    }

    #[tokio::test]
    async fn instant_without_callback_is_a_noop() {
        let builder = ReplayBuilder::instant(events());
        builder.build(&ImageBuildOptions::default(), CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn timed_respects_cancellation() {
        let scenario = BuildScenario::uniform(
            "slow",
            "",
            events(),
            Duration::from_secs(30),
        );
        let builder = ReplayBuilder::timed(&scenario, 1.0);
        let cancel = CancellationToken::new();

        let recorder = EventRecorder::new();
        let opts =
            ImageBuildOptions { on_progress: Some(recorder.callback()), ..Default::default() };

        let started = Instant::now();
        cancel.cancel();
        let err = builder.build(&opts, cancel).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn timed_speed_divides_delays() {
        let scenario = BuildScenario::uniform("fast", "", events(), Duration::from_millis(400));
        let builder = ReplayBuilder::timed(&scenario, 100.0);

        let recorder = EventRecorder::new();
        let opts =
            ImageBuildOptions { on_progress: Some(recorder.callback()), ..Default::default() };

        let started = Instant::now();
        builder.build(&opts, CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(recorder.len(), 3);
    }

    #[tokio::test]
    async fn zero_speed_falls_back_to_real_time() {
        let scenario = BuildScenario::uniform("tiny", "", events(), Duration::from_millis(1));
        let builder = ReplayBuilder::timed(&scenario, 0.0);
        builder.build(&ImageBuildOptions::default(), CancellationToken::new()).await.unwrap();
    }
}
