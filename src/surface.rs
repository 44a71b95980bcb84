//! Render surface: the annotated copy of the video.
//!
//! The surface is sized once from the source's native resolution and never
//! resized while the session lives. Each tick clears it, draws the current
//! frame, converts it to grayscale for the detector, then receives overlays.
//! Text labels are kept as overlay records next to the pixels; glyph
//! rasterization belongs to whichever display presents the surface.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use serde::Serialize;

use crate::frame::{Frame, FrameSize};
use crate::grayscale::to_grayscale;

/// A text overlay anchored at its baseline-left corner.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverlayLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
    #[serde(skip)]
    pub color: Rgba<u8>,
}

pub struct RenderSurface {
    image: RgbaImage,
    labels: Vec<OverlayLabel>,
}

impl RenderSurface {
    pub fn new(size: FrameSize) -> Self {
        Self {
            image: RgbaImage::new(size.width, size.height),
            labels: Vec::new(),
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn labels(&self) -> &[OverlayLabel] {
        &self.labels
    }

    /// Reset every pixel to transparent black and drop all labels.
    pub fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.labels.clear();
    }

    /// Copy a frame onto the surface, stretching it when sizes differ.
    pub fn draw_frame(&mut self, frame: &Frame) {
        if frame.size() == self.size() {
            self.image.copy_from_slice(frame.image().as_raw());
        } else {
            let size = self.size();
            self.image = imageops::resize(
                frame.image(),
                size.width,
                size.height,
                FilterType::Triangle,
            );
        }
    }

    /// Apply the luminance grayscale transform in place.
    pub fn apply_grayscale(&mut self) {
        to_grayscale(&mut self.image);
    }

    /// Stroke a rectangle outline centered on the box edges.
    pub fn stroke_rect(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgba<u8>,
        line_width: u32,
    ) {
        let half = line_width as f32 / 2.0;
        let (left, top) = (x, y);
        let (right, bottom) = (x + width, y + height);
        // Top and bottom edges span the full outer width; sides fill between them.
        self.fill_rect(left - half, top - half, right + half, top + half, color);
        self.fill_rect(left - half, bottom - half, right + half, bottom + half, color);
        self.fill_rect(left - half, top + half, left + half, bottom - half, color);
        self.fill_rect(right - half, top + half, right + half, bottom - half, color);
    }

    /// Fill the half-open pixel region `[x0, x1) x [y0, y1)`, clipped to the surface.
    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        let clip = |v: f32, max: u32| -> u32 {
            if v.is_nan() {
                0
            } else {
                v.round().clamp(0.0, max as f32) as u32
            }
        };
        let (xa, xb) = (clip(x0, w), clip(x1, w));
        let (ya, yb) = (clip(y0, h), clip(y1, h));
        for yy in ya..yb {
            for xx in xa..xb {
                self.image.put_pixel(xx, yy, color);
            }
        }
    }

    pub fn put_label(&mut self, text: String, x: f32, y: f32, color: Rgba<u8>) {
        self.labels.push(OverlayLabel { text, x, y, color });
    }
}
