//! Size-based classification of raw detections.
//!
//! Classification is pure: a detection plus the current scale factors map to
//! exactly one `Category` and a box in render-surface coordinates. Drawing is
//! done separately by `annotate`.
//!
//! Rules, first match wins:
//! 1. `cat`, `dog`, `horse`, `bird` are animals, whatever their size.
//! 2. `person` boxes whose displayed area is below the child threshold are
//!    children; all other person boxes (the threshold itself included) are adults.
//! 3. Everything else is `Other` and is not counted.

use image::Rgba;
use serde::Serialize;

use crate::detect::{BoundingBox, Detection};
use crate::frame::FrameSize;

/// Labels counted as animals.
pub const ANIMAL_LABELS: [&str; 4] = ["cat", "dog", "horse", "bird"];

/// Label of person detections.
pub const PERSON_LABEL: &str = "person";

/// Displayed area (surface pixels squared) below which a person counts as a child.
pub const CHILD_AREA_THRESHOLD: f32 = 15_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Animal,
    Child,
    AdultPerson,
    Other,
}

impl Category {
    /// Overlay color for boxes and labels of this category.
    pub fn color(self) -> Rgba<u8> {
        match self {
            Category::Animal => Rgba([255, 0, 0, 255]),
            Category::Child => Rgba([0, 0, 255, 255]),
            Category::AdultPerson => Rgba([0, 128, 0, 255]),
            Category::Other => Rgba([255, 255, 0, 255]),
        }
    }
}

/// Ratio between render-surface pixels and native frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub const IDENTITY: ScaleFactors = ScaleFactors { x: 1.0, y: 1.0 };

    /// Scale from `native` frame coordinates onto a `surface` of the given size.
    pub fn between(surface: FrameSize, native: FrameSize) -> Self {
        let ratio = |s: u32, n: u32| if n == 0 { 1.0 } else { s as f32 / n as f32 };
        Self {
            x: ratio(surface.width, native.width),
            y: ratio(surface.height, native.height),
        }
    }

    pub fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            bbox.x * self.x,
            bbox.y * self.y,
            bbox.width * self.x,
            bbox.height * self.y,
        )
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A detection with its category and its box on the render surface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub category: Category,
    pub display_box: BoundingBox,
}

impl ClassifiedDetection {
    pub fn color(&self) -> Rgba<u8> {
        self.category.color()
    }

    /// Overlay text, e.g. `person (12.00, 40.50)`.
    pub fn label(&self) -> String {
        format!(
            "{} ({:.2}, {:.2})",
            self.detection.class_label, self.display_box.x, self.display_box.y
        )
    }
}

/// Classifier with a configurable child threshold.
#[derive(Clone, Copy, Debug)]
pub struct Classifier {
    child_area_threshold: f32,
}

impl Classifier {
    pub fn new(child_area_threshold: f32) -> Self {
        Self {
            child_area_threshold,
        }
    }

    pub fn categorize(&self, class_label: &str, display_box: &BoundingBox) -> Category {
        if ANIMAL_LABELS.contains(&class_label) {
            Category::Animal
        } else if class_label == PERSON_LABEL {
            if display_box.area() < self.child_area_threshold {
                Category::Child
            } else {
                Category::AdultPerson
            }
        } else {
            Category::Other
        }
    }

    pub fn classify(&self, detection: &Detection, scale: ScaleFactors) -> ClassifiedDetection {
        let display_box = scale.apply(&detection.bbox);
        ClassifiedDetection {
            category: self.categorize(&detection.class_label, &display_box),
            detection: detection.clone(),
            display_box,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(CHILD_AREA_THRESHOLD)
    }
}

/// Classify with the default child threshold.
pub fn classify(detection: &Detection, scale: ScaleFactors) -> ClassifiedDetection {
    Classifier::default().classify(detection, scale)
}

// ----------------------------------------------------------------------------
// FrameCounters: per-tick tallies
// ----------------------------------------------------------------------------

/// Counts for one processed frame. Rebuilt from zero every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounters {
    pub adult: u32,
    pub child: u32,
    pub animal: u32,
}

impl FrameCounters {
    /// Tally a set of classified detections.
    pub fn tally<'a, I>(detections: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassifiedDetection>,
    {
        let mut counters = Self::default();
        for det in detections {
            counters.record(det.category);
        }
        counters
    }

    pub fn record(&mut self, category: Category) {
        match category {
            Category::Animal => self.animal += 1,
            Category::Child => self.child += 1,
            Category::AdultPerson => self.adult += 1,
            Category::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, w: f32, h: f32) -> Detection {
        Detection::new(label, BoundingBox::new(0.0, 0.0, w, h))
    }

    #[test]
    fn animals_ignore_size() {
        for label in ANIMAL_LABELS {
            for (w, h) in [(1.0, 1.0), (100.0, 100.0), (1000.0, 900.0)] {
                let c = classify(&det(label, w, h), ScaleFactors::IDENTITY);
                assert_eq!(c.category, Category::Animal, "{} {}x{}", label, w, h);
            }
        }
    }

    #[test]
    fn small_person_is_child() {
        let c = classify(&det("person", 100.0, 100.0), ScaleFactors::IDENTITY);
        assert_eq!(c.category, Category::Child);
        assert_eq!(c.color(), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn large_person_is_adult() {
        let c = classify(&det("person", 200.0, 200.0), ScaleFactors::IDENTITY);
        assert_eq!(c.category, Category::AdultPerson);
    }

    #[test]
    fn threshold_area_counts_as_adult() {
        let c = classify(&det("person", 100.0, 150.0), ScaleFactors::IDENTITY);
        assert_eq!(c.display_box.area(), 15_000.0);
        assert_eq!(c.category, Category::AdultPerson);

        let just_below = classify(&det("person", 100.0, 149.99), ScaleFactors::IDENTITY);
        assert_eq!(just_below.category, Category::Child);
    }

    #[test]
    fn area_is_measured_after_scaling() {
        // 200x200 native is adult at scale 1, but 100x100 on a half-size surface.
        let half = ScaleFactors { x: 0.5, y: 0.5 };
        let c = classify(&det("person", 200.0, 200.0), half);
        assert_eq!(c.display_box.width, 100.0);
        assert_eq!(c.category, Category::Child);

        let double = ScaleFactors { x: 2.0, y: 2.0 };
        let c = classify(&det("person", 100.0, 100.0), double);
        assert_eq!(c.category, Category::AdultPerson);
    }

    #[test]
    fn unknown_labels_are_other() {
        let c = classify(&det("bicycle", 300.0, 300.0), ScaleFactors::IDENTITY);
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.color(), Rgba([255, 255, 0, 255]));
        // Labels are matched exactly.
        let c = classify(&det("Person", 300.0, 300.0), ScaleFactors::IDENTITY);
        assert_eq!(c.category, Category::Other);
    }

    #[test]
    fn custom_threshold_moves_the_boundary() {
        let classifier = Classifier::new(50_000.0);
        let c = classifier.classify(&det("person", 200.0, 200.0), ScaleFactors::IDENTITY);
        assert_eq!(c.category, Category::Child);
    }

    #[test]
    fn label_uses_scaled_coordinates() {
        let d = Detection::new("dog", BoundingBox::new(10.0, 20.5, 30.0, 40.0));
        let c = classify(&d, ScaleFactors { x: 1.5, y: 2.0 });
        assert_eq!(c.label(), "dog (15.00, 41.00)");
    }

    #[test]
    fn scale_factors_between_sizes() {
        let s = ScaleFactors::between(FrameSize::new(320, 240), FrameSize::new(640, 480));
        assert_eq!(s, ScaleFactors { x: 0.5, y: 0.5 });
        let s = ScaleFactors::between(FrameSize::new(640, 480), FrameSize::new(0, 0));
        assert_eq!(s, ScaleFactors::IDENTITY);
    }

    #[test]
    fn counters_tally_mixed_frame() {
        let scale = ScaleFactors::IDENTITY;
        let classified: Vec<_> = [
            det("dog", 50.0, 50.0),
            det("cat", 20.0, 20.0),
            det("person", 200.0, 200.0),
            det("car", 200.0, 200.0),
        ]
        .iter()
        .map(|d| classify(d, scale))
        .collect();
        let counters = FrameCounters::tally(&classified);
        assert_eq!(
            counters,
            FrameCounters {
                adult: 1,
                child: 0,
                animal: 2
            }
        );
    }
}
