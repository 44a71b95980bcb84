use crate::classify::ClassifiedDetection;
use crate::surface::RenderSurface;

/// Stroke width of detection boxes, in surface pixels.
pub const BOX_LINE_WIDTH: u32 = 4;

/// Gap between a box's top edge and its label baseline.
pub const LABEL_OFFSET: f32 = 5.0;

/// Baseline used for boxes whose top edge is at or above this row.
pub const LABEL_MIN_BASELINE: f32 = 10.0;

/// Draw one classified detection: colored box plus label above its top-left corner.
pub fn annotate(surface: &mut RenderSurface, detection: &ClassifiedDetection) {
    let color = detection.color();
    let b = &detection.display_box;
    surface.stroke_rect(b.x, b.y, b.width, b.height, color, BOX_LINE_WIDTH);
    let baseline = if b.y > LABEL_MIN_BASELINE {
        b.y - LABEL_OFFSET
    } else {
        LABEL_MIN_BASELINE
    };
    surface.put_label(detection.label(), b.x, baseline, color);
}
