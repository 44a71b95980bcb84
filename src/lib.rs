//! Headcount: per-frame people and animal counting for video.
//!
//! A video is accepted into a session. While it plays, a detection loop
//! runs once per display refresh: the current frame is drawn onto a render
//! surface, converted to grayscale, passed to an object detector, and every
//! detection is classified (adult, child, animal, other), outlined and
//! labeled. The counts of the most recent frame are published for display.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames, media events and the `FrameSource` trait
//! - `ingest`: video sources (local files via FFmpeg, synthetic `stub://` clips)
//! - `surface`, `grayscale`, `annotate`: the render surface and what is drawn on it
//! - `detect`: detector backends, model loaders and the memoized model slot
//! - `classify`: size heuristic and per-frame counters
//! - `pipeline`, `session`: the detection loop and the session controller
//! - `config`, `ui`: settings and terminal output for the binary

pub mod annotate;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod grayscale;
pub mod ingest;
pub mod pipeline;
pub mod session;
pub mod surface;
pub mod ui;

pub use classify::{
    classify, Category, ClassifiedDetection, Classifier, FrameCounters, ScaleFactors,
    ANIMAL_LABELS, CHILD_AREA_THRESHOLD,
};
pub use config::HeadcountConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectorBackend, ModelLoader, ModelSlot, StubBackend,
    StubLoader,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, FrameSize, FrameSource, MediaEvent};
pub use ingest::{open_video, FileConfig, FileSource, SyntheticSource};
pub use pipeline::{LoopPhase, LoopSettings, TickOutcome, TickReport};
pub use session::{SessionController, SessionState, SessionStatus};
pub use surface::{OverlayLabel, RenderSurface};
