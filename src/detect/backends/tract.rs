#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, ModelLoader};
use crate::detect::result::{BoundingBox, Detection};

type Plan = TypedRunnableModel<TypedModel>;

/// COCO class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// The model takes a `[1, 3, S, S]` float input in 0..1 and produces
/// `[1, 4 + C, N]` rows of `(cx, cy, w, h, class scores...)` in input pixels.
/// Inference runs on the blocking pool so the refresh task keeps its cadence.
pub struct TractBackend {
    model: Arc<Plan>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model: Arc::new(model),
            input_size,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the default thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn run(&self, surface: &RgbaImage) -> Result<Vec<Detection>> {
        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot run detection on an empty surface"));
        }
        let input = build_input(surface, self.input_size);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [1, 4 + C, N]")?;
        let shape = view.shape();
        if shape[1] < 5 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }

        let classes = shape[1] - 4;
        let anchors = shape[2];
        let sx = width as f32 / self.input_size as f32;
        let sy = height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (best_class, best_score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, i]]))
                .fold((0, f32::NEG_INFINITY), |acc, cur| {
                    if cur.1 > acc.1 {
                        cur
                    } else {
                        acc
                    }
                });
            if !best_score.is_finite() || best_score < self.confidence_threshold {
                continue;
            }
            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            let label = COCO_CLASSES
                .get(best_class)
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("class_{}", best_class));
            candidates.push(
                Detection::new(
                    label,
                    BoundingBox::new((cx - w / 2.0) * sx, (cy - h / 2.0) * sy, w * sx, h * sy),
                )
                .with_confidence(best_score),
            );
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

fn build_input(surface: &RgbaImage, input_size: u32) -> Tensor {
    let resized = imageops::resize(surface, input_size, input_size, FilterType::Triangle);
    let side = input_size as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
        resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
    })
    .into_tensor()
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .total_cmp(&a.confidence.unwrap_or(0.0))
    });
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept.iter().any(|k| {
            k.class_label == det.class_label && k.bbox.iou(&det.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[async_trait]
impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn detect(&self, surface: &RgbaImage) -> Result<Vec<Detection>> {
        let backend = TractBackend {
            model: self.model.clone(),
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
        };
        let surface = surface.clone();
        tokio::task::spawn_blocking(move || backend.run(&surface))
            .await
            .context("tract inference task panicked")?
    }

    async fn warm_up(&self) -> Result<()> {
        let side = self.input_size;
        let blank = RgbaImage::new(side, side);
        self.detect(&blank).await.map(|_| ())
    }
}

/// Loader that reads the ONNX file on the blocking pool.
pub struct TractLoader {
    model_path: PathBuf,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractLoader {
    pub fn new(model_path: impl Into<PathBuf>, input_size: u32) -> Self {
        Self {
            model_path: model_path.into(),
            input_size,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        }
    }

    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }
}

#[async_trait]
impl ModelLoader for TractLoader {
    fn name(&self) -> &'static str {
        "tract"
    }

    async fn load(&self) -> Result<Arc<dyn DetectorBackend>> {
        let path = self.model_path.clone();
        let size = self.input_size;
        let (confidence, iou) = (self.confidence_threshold, self.iou_threshold);
        let backend = tokio::task::spawn_blocking(move || TractBackend::new(path, size))
            .await
            .context("tract model load task panicked")??
            .with_thresholds(confidence, iou);
        Ok(Arc::new(backend) as Arc<dyn DetectorBackend>)
    }
}
