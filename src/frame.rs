//! Decoded frames and the frame source capability.
//!
//! - `Frame`: one decoded RGBA picture at the source's native resolution.
//! - `MediaEvent`: lifecycle signals a playing video emits.
//! - `FrameSource`: what the detection loop needs from a playback engine.
//!
//! Sources own decoding and the playback clock. The loop only asks for the
//! current frame once per refresh tick and reacts to lifecycle signals.

use anyhow::{anyhow, Result};
use image::RgbaImage;

/// Pixel dimensions of a frame or surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Byte length of an RGBA buffer with these dimensions.
    pub fn rgba_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(4))
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// Frame: decoded RGBA picture
// ----------------------------------------------------------------------------

/// A decoded frame in interleaved RGBA layout.
pub struct Frame {
    image: RgbaImage,
    /// Position of this frame in the stream (0-based).
    pub index: u64,
}

impl Frame {
    /// Wrap an RGBA buffer. Fails when the buffer does not match the dimensions.
    pub fn from_rgba(size: FrameSize, pixels: Vec<u8>, index: u64) -> Result<Self> {
        let expected = size
            .rgba_len()
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGBA frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbaImage::from_raw(size.width, size.height, pixels)
            .ok_or_else(|| anyhow!("RGBA buffer rejected for {}", size))?;
        Ok(Self { image, index })
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

// ----------------------------------------------------------------------------
// FrameSource: playback capability
// ----------------------------------------------------------------------------

/// Lifecycle signals emitted by a frame source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// Native dimensions are known and the first frame can be decoded.
    DataLoaded(FrameSize),
    Play,
    Pause,
    /// No more frames will be produced.
    Ended,
}

/// A playable video the detection loop can sample.
pub trait FrameSource: Send {
    /// Human-readable identifier (path, stub name) for logs.
    fn describe(&self) -> String;

    /// Open the media. Failure means the input is not a playable video.
    fn connect(&mut self) -> Result<()>;

    /// Next pending lifecycle signal, if any.
    fn poll_event(&mut self) -> Option<MediaEvent>;

    /// Native resolution. `None` until `DataLoaded` has been emitted.
    fn native_size(&self) -> Option<FrameSize>;

    /// The frame that should be on screen now. `Ok(None)` at end of stream.
    fn current_frame(&mut self) -> Result<Option<Frame>>;

    /// True when `current_frame` may block on decode and should run off the
    /// async workers.
    fn decode_is_blocking(&self) -> bool {
        false
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        (**self).poll_event()
    }

    fn native_size(&self) -> Option<FrameSize> {
        (**self).native_size()
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        (**self).current_frame()
    }

    fn decode_is_blocking(&self) -> bool {
        (**self).decode_is_blocking()
    }
}
