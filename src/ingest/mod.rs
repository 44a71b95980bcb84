//! Frame ingestion sources.
//!
//! This module turns a user's video selection into a `FrameSource`:
//! - Local video files (decoded with FFmpeg, feature: ingest-file-ffmpeg)
//! - `stub://` synthetic sources (demos and tests)
//!
//! Sources own decoding and the playback clock and emit the lifecycle signals
//! (`DataLoaded`, `Play`, `Pause`, `Ended`) the detection loop reacts to.
//! Anything that is not a playable local video is rejected as invalid media
//! before a session starts.
//!
//! The ingestion layer MUST NOT:
//! - Fetch remote URLs
//! - Store decoded frames to disk

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod normalize;

pub use file::{open_video, FileConfig, FileSource, SyntheticSource, VIDEO_EXTENSIONS};
