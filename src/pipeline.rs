//! Detection loop: one tick per display refresh while the video plays.
//!
//! Each tick clears the render surface, draws the current frame, converts it
//! to grayscale, runs the detector on it, then classifies and annotates every
//! detection while tallying fresh `FrameCounters`. The tally is published
//! only if the session that started the tick is still the current one.
//!
//! Ticks never overlap: the loop awaits each detection before scheduling the
//! next refresh, and refreshes missed while waiting are skipped, not queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};

use crate::annotate::annotate;
use crate::classify::{ClassifiedDetection, Classifier, FrameCounters, ScaleFactors};
use crate::detect::{DetectorBackend, ModelSlot};
use crate::error::PipelineError;
use crate::frame::{Frame, FrameSize, FrameSource, MediaEvent};
use crate::session::SessionShared;
use crate::surface::RenderSurface;

/// Display refresh rate used when none is configured.
pub const DEFAULT_REFRESH_HZ: u32 = 60;

#[derive(Clone, Copy, Debug)]
pub struct LoopSettings {
    pub refresh_hz: u32,
    pub child_area_threshold: f32,
}

impl LoopSettings {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.max(1)))
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            refresh_hz: DEFAULT_REFRESH_HZ,
            child_area_threshold: crate::classify::CHILD_AREA_THRESHOLD,
        }
    }
}

/// Where the loop is in the video's lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// No video.
    #[default]
    Idle,
    /// Video accepted, dimensions not known yet.
    AwaitingData,
    /// Surface sized; waiting for playback.
    Ready,
    /// Playing; ticks run.
    Running,
    /// Playback reached the end of the video.
    Ended,
    /// The detector could not be loaded.
    Faulted,
}

impl LoopPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopPhase::Ended | LoopPhase::Faulted)
    }
}

/// Everything one published tick produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// 1-based tick number within the session.
    pub sequence: u64,
    pub counters: FrameCounters,
    pub detections: Vec<ClassifiedDetection>,
}

/// Result of a single tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Published(FrameCounters),
    /// The detector failed; zero counters were published.
    DetectionFailed,
    /// The session was removed while the tick was in flight.
    Discarded,
    /// The source has no more frames.
    EndOfStream,
}

type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

pub(crate) struct DetectionLoop {
    generation: u64,
    source: SharedSource,
    shared: Arc<SessionShared>,
    models: Arc<ModelSlot>,
    settings: LoopSettings,
    classifier: Classifier,
    phase: LoopPhase,
    surface: Option<RenderSurface>,
    scale: ScaleFactors,
    detector: Option<Arc<dyn DetectorBackend>>,
    play_requested: bool,
    ticks: u64,
}

impl DetectionLoop {
    pub(crate) fn new(
        generation: u64,
        source: Box<dyn FrameSource>,
        shared: Arc<SessionShared>,
        models: Arc<ModelSlot>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            generation,
            source: Arc::new(Mutex::new(source)),
            shared,
            models,
            settings,
            classifier: Classifier::new(settings.child_area_threshold),
            phase: LoopPhase::AwaitingData,
            surface: None,
            scale: ScaleFactors::IDENTITY,
            detector: None,
            play_requested: false,
            ticks: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> LoopPhase {
        self.phase
    }

    fn source(&self) -> MutexGuard<'_, Box<dyn FrameSource>> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_event(&self) -> Option<MediaEvent> {
        self.source().poll_event()
    }

    /// Fetch the frame due now. Sources whose decode blocks run on the
    /// blocking pool so a long catch-up never stalls the runtime.
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.source().decode_is_blocking() {
            return self.source().current_frame();
        }
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_frame()
        })
        .await
        .map_err(|e| anyhow!("frame decode task failed: {}", e))?
    }

    fn is_current(&self) -> bool {
        self.shared.is_current(self.generation)
    }

    fn set_phase(&mut self, phase: LoopPhase, fault: Option<String>) {
        if self.phase == phase && fault.is_none() {
            return;
        }
        log::debug!(
            "DetectionLoop[{}]: {:?} -> {:?}",
            self.generation,
            self.phase,
            phase
        );
        self.phase = phase;
        self.shared.publish_phase(self.generation, phase, fault);
    }

    pub(crate) async fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::DataLoaded(size) => self.on_data_loaded(size).await,
            MediaEvent::Play => match self.phase {
                LoopPhase::AwaitingData => self.play_requested = true,
                LoopPhase::Ready => self.start_playback().await,
                _ => {}
            },
            MediaEvent::Pause => {
                self.play_requested = false;
                if self.phase == LoopPhase::Running {
                    self.set_phase(LoopPhase::Ready, None);
                }
            }
            MediaEvent::Ended => {
                if !self.phase.is_terminal() {
                    log::info!("DetectionLoop[{}]: video ended", self.generation);
                    self.set_phase(LoopPhase::Ended, None);
                }
            }
        }
    }

    async fn on_data_loaded(&mut self, size: FrameSize) {
        if self.phase != LoopPhase::AwaitingData {
            if self.surface.as_ref().map(RenderSurface::size) != Some(size) {
                log::warn!(
                    "DetectionLoop[{}]: ignoring late resize to {}; surface stays fixed",
                    self.generation,
                    size
                );
            }
            return;
        }
        if size.is_empty() {
            let err = PipelineError::invalid_media(format!(
                "{} reports an empty picture",
                self.source().describe()
            ));
            log::error!("DetectionLoop[{}]: {}", self.generation, err);
            self.set_phase(LoopPhase::Faulted, Some(err.to_string()));
            return;
        }

        let surface = RenderSurface::new(size);
        let native = self.source().native_size().unwrap_or(size);
        self.scale = ScaleFactors::between(surface.size(), native);
        self.surface = Some(surface);
        log::info!(
            "DetectionLoop[{}]: surface {} (native {})",
            self.generation,
            size,
            native
        );
        self.set_phase(LoopPhase::Ready, None);

        if self.play_requested {
            self.start_playback().await;
        }
    }

    async fn start_playback(&mut self) {
        self.play_requested = false;
        if self.detector.is_none() {
            match self.models.acquire().await {
                Ok(detector) => self.detector = Some(detector),
                Err(err) => {
                    if self.is_current() {
                        log::error!("DetectionLoop[{}]: {}", self.generation, err);
                        self.set_phase(LoopPhase::Faulted, Some(err.to_string()));
                    }
                    return;
                }
            }
        }
        if self.is_current() {
            self.set_phase(LoopPhase::Running, None);
        }
    }

    /// Process the current frame. Must only be called while `Running`.
    pub(crate) async fn tick(&mut self) -> TickOutcome {
        if self.surface.is_none() || self.detector.is_none() {
            return TickOutcome::Discarded;
        }
        // At end of stream the surface keeps the last annotated frame.
        let next = match self.next_frame().await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => return TickOutcome::EndOfStream,
            Err(e) => Err(e),
        };
        let (Some(surface), Some(detector)) = (self.surface.as_mut(), self.detector.clone())
        else {
            return TickOutcome::Discarded;
        };
        self.ticks += 1;
        let sequence = self.ticks;

        surface.clear();
        let frame = match next {
            Ok(frame) => frame,
            Err(e) => {
                let err = PipelineError::DetectionTick {
                    tick: sequence,
                    message: format!("frame unavailable: {:#}", e),
                };
                log::warn!("DetectionLoop[{}]: {}", self.generation, err);
                return self.publish_empty(sequence);
            }
        };
        surface.draw_frame(&frame);
        surface.apply_grayscale();

        let result = detector.detect(surface.image()).await;
        if !self.shared.is_current(self.generation) {
            log::debug!(
                "DetectionLoop[{}]: session removed during tick {}; discarding",
                self.generation,
                sequence
            );
            return TickOutcome::Discarded;
        }

        let detections = match result {
            Ok(detections) => detections,
            Err(e) => {
                let err = PipelineError::DetectionTick {
                    tick: sequence,
                    message: format!("{:#}", e),
                };
                log::warn!("DetectionLoop[{}]: {}", self.generation, err);
                return self.publish_empty(sequence);
            }
        };

        let mut counters = FrameCounters::default();
        let mut classified = Vec::with_capacity(detections.len());
        for detection in &detections {
            let c = self.classifier.classify(detection, self.scale);
            annotate(surface, &c);
            counters.record(c.category);
            classified.push(c);
        }
        log::trace!(
            "DetectionLoop[{}]: tick {} -> {:?}",
            self.generation,
            sequence,
            counters
        );

        let report = TickReport {
            sequence,
            counters,
            detections: classified,
        };
        if self.shared.publish_tick(self.generation, report) {
            TickOutcome::Published(counters)
        } else {
            TickOutcome::Discarded
        }
    }

    fn publish_empty(&self, sequence: u64) -> TickOutcome {
        let report = TickReport {
            sequence,
            ..TickReport::default()
        };
        if self.shared.publish_tick(self.generation, report) {
            TickOutcome::DetectionFailed
        } else {
            TickOutcome::Discarded
        }
    }

    /// Drive the loop until the video ends, the model fails, or the session
    /// is removed.
    pub(crate) async fn run(mut self) {
        let mut refresh = time::interval(self.settings.refresh_period());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            refresh.tick().await;
            if !self.is_current() {
                log::debug!("DetectionLoop[{}]: session removed; stopping", self.generation);
                return;
            }
            while let Some(event) = self.next_event() {
                self.handle_event(event).await;
            }
            match self.phase {
                LoopPhase::Running => match self.tick().await {
                    TickOutcome::Discarded => return,
                    TickOutcome::EndOfStream => {
                        log::info!(
                            "DetectionLoop[{}]: end of stream after {} ticks",
                            self.generation,
                            self.ticks
                        );
                        self.set_phase(LoopPhase::Ended, None);
                        return;
                    }
                    TickOutcome::Published(_) | TickOutcome::DetectionFailed => {}
                },
                phase if phase.is_terminal() => return,
                _ => {}
            }
        }
    }
}
