//! Session controller: owns the active video and its published state.
//!
//! A session starts when a video is accepted and ends when it is removed.
//! Every session gets a fresh generation number. The detection loop carries
//! the generation it was started with and may only publish while that number
//! is still current, so a detection that resolves after removal is dropped
//! instead of leaking into the next session's counters.
//!
//! Published state lives in `watch` channels: the display side only ever sees
//! complete snapshots, never a tick in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::classify::FrameCounters;
use crate::detect::{ModelLoader, ModelSlot};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::FrameSource;
use crate::pipeline::{DetectionLoop, LoopPhase, LoopSettings, TickReport};

/// What the display layer shows besides the counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub video_present: bool,
    pub phase: LoopPhase,
    /// Session-fatal error, set once when the loop gives up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Snapshot of the session as a whole.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub video_present: bool,
    pub counters: FrameCounters,
}

// ----------------------------------------------------------------------------
// SessionShared: generation guard + published snapshots
// ----------------------------------------------------------------------------

pub(crate) struct SessionShared {
    generation: AtomicU64,
    counters: watch::Sender<FrameCounters>,
    status: watch::Sender<SessionStatus>,
    reports: watch::Sender<TickReport>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            counters: watch::Sender::new(FrameCounters::default()),
            status: watch::Sender::new(SessionStatus::default()),
            reports: watch::Sender::new(TickReport::default()),
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate any running loop and start a new generation.
    pub(crate) fn begin(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.send_replace(FrameCounters::default());
        self.reports.send_replace(TickReport::default());
        self.status.send_replace(SessionStatus {
            video_present: true,
            phase: LoopPhase::AwaitingData,
            fault: None,
        });
        generation
    }

    /// Invalidate any running loop and return to the empty state.
    pub(crate) fn end(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.counters.send_replace(FrameCounters::default());
        self.reports.send_replace(TickReport::default());
        self.status.send_replace(SessionStatus::default());
    }

    #[cfg(test)]
    pub(crate) fn last_report(&self) -> TickReport {
        self.reports.borrow().clone()
    }

    /// Publish a completed tick. Returns false when `generation` is stale.
    ///
    /// The generation is checked while the channel is locked, so a concurrent
    /// `end` either lands before (and the tick is dropped) or after (and resets it).
    pub(crate) fn publish_tick(&self, generation: u64, report: TickReport) -> bool {
        let counters = report.counters;
        let applied = self.counters.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            *current = counters;
            true
        });
        if applied {
            self.reports.send_if_modified(|current| {
                if !self.is_current(generation) {
                    return false;
                }
                *current = report;
                true
            });
        }
        applied
    }

    pub(crate) fn publish_phase(
        &self,
        generation: u64,
        phase: LoopPhase,
        fault: Option<String>,
    ) -> bool {
        self.status.send_if_modified(|status| {
            if !self.is_current(generation) {
                return false;
            }
            status.phase = phase;
            if fault.is_some() {
                status.fault = fault;
            }
            true
        })
    }
}

// ----------------------------------------------------------------------------
// SessionController
// ----------------------------------------------------------------------------

pub struct SessionController {
    shared: Arc<SessionShared>,
    models: Arc<ModelSlot>,
    settings: LoopSettings,
    task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(loader: Arc<dyn ModelLoader>, settings: LoopSettings) -> Self {
        Self {
            shared: Arc::new(SessionShared::new()),
            models: Arc::new(ModelSlot::new(loader)),
            settings,
            task: None,
        }
    }

    /// Start a session for `source`.
    ///
    /// The source is opened first; if it is not a playable video the current
    /// state is left untouched and `InvalidMedia` is returned. Otherwise any
    /// active session is torn down and a detection loop is spawned on the
    /// current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn accept_video<S>(&mut self, mut source: S) -> PipelineResult<()>
    where
        S: FrameSource + 'static,
    {
        source.connect().map_err(|e| {
            PipelineError::invalid_media(format!("{}: {:#}", source.describe(), e))
        })?;

        self.remove_video();
        let generation = self.shared.begin();
        log::info!(
            "SessionController: accepted {} (session {})",
            source.describe(),
            generation
        );

        let detection_loop = DetectionLoop::new(
            generation,
            Box::new(source),
            self.shared.clone(),
            self.models.clone(),
            self.settings,
        );
        self.task = Some(tokio::spawn(detection_loop.run()));
        Ok(())
    }

    /// Tear down the active session. Returns false when there was none.
    ///
    /// The loop task is not aborted: it notices the new
    /// generation at its next checkpoint and stops, dropping any detection
    /// that was still in flight.
    pub fn remove_video(&mut self) -> bool {
        let present = self.shared.status.borrow().video_present;
        if !present {
            return false;
        }
        self.shared.end();
        log::info!("SessionController: video removed");
        true
    }

    /// Wait for the current loop to stop (end of video, fault, or removal).
    pub async fn wait_until_stopped(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("SessionController: detection loop panicked: {}", e);
            }
        }
    }

    pub fn counters(&self) -> watch::Receiver<FrameCounters> {
        self.shared.counters.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    pub fn reports(&self) -> watch::Receiver<TickReport> {
        self.shared.reports.subscribe()
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            video_present: self.shared.status.borrow().video_present,
            counters: *self.shared.counters.borrow(),
        }
    }

    /// True once a detector has been loaded; later sessions reuse it.
    pub fn model_loaded(&self) -> bool {
        self.models.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(adult: u32) -> TickReport {
        TickReport {
            sequence: 1,
            counters: FrameCounters {
                adult,
                child: 0,
                animal: 0,
            },
            detections: Vec::new(),
        }
    }

    #[test]
    fn stale_generation_cannot_publish() {
        let shared = SessionShared::new();
        let first = shared.begin();
        assert!(shared.publish_tick(first, report(2)));
        assert_eq!(shared.counters.borrow().adult, 2);

        shared.end();
        assert!(!shared.publish_tick(first, report(5)));
        assert_eq!(*shared.counters.borrow(), FrameCounters::default());
        assert!(!shared.publish_phase(first, LoopPhase::Running, None));
        assert_eq!(shared.status.borrow().phase, LoopPhase::Idle);
    }

    #[test]
    fn new_session_invalidates_previous_generation() {
        let shared = SessionShared::new();
        let first = shared.begin();
        let second = shared.begin();
        assert_ne!(first, second);
        assert!(!shared.publish_tick(first, report(1)));
        assert!(shared.publish_tick(second, report(3)));
        assert_eq!(shared.reports.borrow().counters.adult, 3);
    }

    #[test]
    fn fault_is_sticky_across_phase_updates() {
        let shared = SessionShared::new();
        let generation = shared.begin();
        shared.publish_phase(generation, LoopPhase::Faulted, Some("boom".into()));
        shared.publish_phase(generation, LoopPhase::Faulted, None);
        assert_eq!(shared.status.borrow().fault.as_deref(), Some("boom"));
        assert!(shared.status.borrow().video_present);
    }
}
