//! Local video file frame source.
//!
//! `open_video` is the gate between a user's selection and a session: it
//! accepts local files with a video container extension (decoded with FFmpeg
//! when the `ingest-file-ffmpeg` feature is enabled) and `stub://` names,
//! which produce synthetic frames for demos and tests. Everything else is
//! rejected as invalid media.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Result};

use super::normalize::rgb_to_rgba;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::error::PipelineError;
use crate::frame::{Frame, FrameSize, FrameSource, MediaEvent};

/// Container extensions accepted as video.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "webm", "mov", "mkv", "avi", "m4v", "ogv"];

const STUB_SCHEME: &str = "stub://";

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/home/me/walk.mp4") or `stub://name`.
    pub path: String,
    /// Frame size used by `stub://` sources.
    pub synthetic_size: FrameSize,
    /// Frames produced by `stub://` sources before they end. `None` runs forever.
    pub synthetic_frames: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            synthetic_size: FrameSize::new(640, 480),
            synthetic_frames: Some(300),
        }
    }
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Validate a selection and build the matching frame source.
pub fn open_video(config: FileConfig) -> Result<FileSource, PipelineError> {
    let path = config.path.trim();
    if path.is_empty() {
        return Err(PipelineError::invalid_media("no video selected"));
    }
    if let Some(name) = path.strip_prefix(STUB_SCHEME) {
        let mut source = SyntheticSource::new(name, config.synthetic_size);
        if let Some(frames) = config.synthetic_frames {
            source = source.with_frames(frames);
        }
        return Ok(FileSource {
            backend: FileBackend::Synthetic(source),
        });
    }
    if path.contains("://") {
        return Err(PipelineError::invalid_media(
            "only local video files are supported (no URL schemes)",
        ));
    }
    if !has_video_extension(path) {
        return Err(PipelineError::invalid_media(format!(
            "'{}' is not a video file (expected one of: {})",
            path,
            VIDEO_EXTENSIONS.join(", ")
        )));
    }
    if !Path::new(path).is_file() {
        return Err(PipelineError::invalid_media(format!(
            "video file not found: {}",
            path
        )));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        FfmpegFileSource::new(config.clone())
            .map(|source| FileSource {
                backend: FileBackend::Ffmpeg(Box::new(source)),
            })
            .map_err(|e| PipelineError::invalid_media(format!("{:#}", e)))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(PipelineError::invalid_media(format!(
            "cannot decode {}: video decoding requires the ingest-file-ffmpeg feature",
            path
        )))
    }
}

fn has_video_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(Box<FfmpegFileSource>),
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.describe(),
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.poll_event(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.poll_event(),
        }
    }

    fn native_size(&self) -> Option<FrameSize> {
        match &self.backend {
            FileBackend::Synthetic(source) => source.native_size(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.native_size(),
        }
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.current_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.current_frame(),
        }
    }

    fn decode_is_blocking(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.decode_is_blocking(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.decode_is_blocking(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for demos and tests
// ----------------------------------------------------------------------------

/// Generates a moving gradient. Autoplays: `connect` queues `DataLoaded`
/// then `Play`, and `Ended` follows the last frame.
pub struct SyntheticSource {
    name: String,
    size: FrameSize,
    total_frames: Option<u64>,
    autoplay: bool,
    frame_count: u64,
    connected: bool,
    ended: bool,
    events: VecDeque<MediaEvent>,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, size: FrameSize) -> Self {
        Self {
            name: name.into(),
            size,
            total_frames: None,
            autoplay: true,
            frame_count: 0,
            connected: false,
            ended: false,
            events: VecDeque::new(),
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.total_frames = Some(frames);
        self
    }

    /// Wait for an explicit `Play` instead of starting on load.
    pub fn without_autoplay(mut self) -> Self {
        self.autoplay = false;
        self
    }

    fn generate_rgb(&self) -> Vec<u8> {
        let w = self.size.width as u64;
        let shift = self.frame_count * 4;
        let capacity = self.size.width as usize * self.size.height as usize * 3;
        let mut pixels = Vec::with_capacity(capacity);
        for y in 0..self.size.height as u64 {
            for x in 0..w {
                pixels.push(((x + shift) % 256) as u8);
                pixels.push(((y + shift / 2) % 256) as u8);
                pixels.push(((x + y) % 256) as u8);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{}{}", STUB_SCHEME, self.name)
    }

    fn connect(&mut self) -> Result<()> {
        if self.size.is_empty() {
            return Err(anyhow!("synthetic source {} has no picture", self.describe()));
        }
        self.connected = true;
        self.events.push_back(MediaEvent::DataLoaded(self.size));
        if self.autoplay {
            self.events.push_back(MediaEvent::Play);
        }
        log::info!("FileSource: connected to {} (synthetic)", self.describe());
        Ok(())
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.events.pop_front()
    }

    fn native_size(&self) -> Option<FrameSize> {
        self.connected.then_some(self.size)
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} is not connected", self.describe()));
        }
        if self.total_frames.is_some_and(|total| self.frame_count >= total) {
            if !self.ended {
                self.ended = true;
                self.events.push_back(MediaEvent::Ended);
            }
            return Ok(None);
        }
        let rgba = rgb_to_rgba(&self.generate_rgb(), self.size)?;
        let frame = Frame::from_rgba(self.size, rgba, self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }
}
