use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;

use crate::detect::backend::{DetectorBackend, ModelLoader};
use crate::detect::result::{BoundingBox, Detection};

/// Stub backend for demos and tests. Replays a fixed script of detections,
/// one entry per call, cycling when the script runs out.
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(demo_script())
    }
}

#[async_trait]
impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn detect(&self, _surface: &RgbaImage) -> Result<Vec<Detection>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.script[call % self.script.len()].clone())
    }
}

/// Loader handing out a shared `StubBackend`.
pub struct StubLoader {
    backend: Arc<StubBackend>,
}

impl StubLoader {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            backend: Arc::new(StubBackend::new(script)),
        }
    }

    /// The backend this loader returns, for inspecting call counts.
    pub fn backend(&self) -> Arc<StubBackend> {
        self.backend.clone()
    }
}

impl Default for StubLoader {
    fn default() -> Self {
        Self::new(demo_script())
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn load(&self) -> Result<Arc<dyn DetectorBackend>> {
        Ok(self.backend.clone() as Arc<dyn DetectorBackend>)
    }
}

/// A short scene: a family walking a dog past the camera, then a passing bird.
fn demo_script() -> Vec<Vec<Detection>> {
    let adult = |x: f32| Detection::new("person", BoundingBox::new(x, 120.0, 110.0, 300.0));
    let child = |x: f32| Detection::new("person", BoundingBox::new(x, 300.0, 60.0, 130.0));
    let dog = |x: f32| Detection::new("dog", BoundingBox::new(x, 360.0, 90.0, 70.0));
    vec![
        vec![adult(40.0)],
        vec![adult(60.0), child(190.0)],
        vec![adult(80.0), child(210.0), dog(300.0)],
        vec![
            adult(100.0),
            child(230.0),
            dog(320.0),
            Detection::new("bird", BoundingBox::new(500.0, 30.0, 25.0, 20.0)),
        ],
        vec![
            dog(340.0),
            Detection::new("bicycle", BoundingBox::new(420.0, 250.0, 160.0, 120.0)),
        ],
        Vec::new(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_cycles_through_script() -> Result<()> {
        let backend = StubBackend::new(vec![
            vec![Detection::new("cat", BoundingBox::new(0.0, 0.0, 10.0, 10.0))],
            Vec::new(),
        ]);
        let surface = RgbaImage::new(4, 4);

        assert_eq!(backend.detect(&surface).await?.len(), 1);
        assert!(backend.detect(&surface).await?.is_empty());
        assert_eq!(backend.detect(&surface).await?[0].class_label, "cat");
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn empty_script_detects_nothing() -> Result<()> {
        let backend = StubBackend::new(Vec::new());
        assert!(backend.detect(&RgbaImage::new(1, 1)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn loader_shares_one_backend() -> Result<()> {
        let loader = StubLoader::default();
        let detector = loader.load().await?;
        detector.detect(&RgbaImage::new(1, 1)).await?;
        assert_eq!(loader.backend().calls(), 1);
        Ok(())
    }
}
