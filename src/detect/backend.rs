use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::RgbaImage;
use tokio::sync::OnceCell;

use crate::detect::result::Detection;
use crate::error::PipelineError;

/// Detector backend trait.
///
/// Backends receive the render surface after grayscale pre-processing and
/// return detections in that surface's pixel coordinates. The surface is
/// borrowed for the duration of the call only.
#[async_trait]
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on the current surface contents.
    async fn detect(&self, surface: &RgbaImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once right after loading.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces a ready-to-use detector. Loading may be slow (model files, graph
/// optimization), so it is asynchronous and performed at most once per slot.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Arc<dyn DetectorBackend>>;
}

/// Lazily loaded, memoized detector.
///
/// The first successful load is reused by every later session. A failed load
/// is not cached; the caller decides whether to try again.
pub struct ModelSlot {
    loader: Arc<dyn ModelLoader>,
    detector: OnceCell<Arc<dyn DetectorBackend>>,
}

impl ModelSlot {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            detector: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.initialized()
    }

    /// Return the loaded detector, loading and warming it up on first use.
    pub async fn acquire(&self) -> Result<Arc<dyn DetectorBackend>, PipelineError> {
        let detector = self
            .detector
            .get_or_try_init(|| async {
                log::info!("ModelSlot: loading detector via '{}'", self.loader.name());
                let detector = self.loader.load().await?;
                detector.warm_up().await?;
                log::info!("ModelSlot: detector '{}' ready", detector.name());
                Ok::<_, anyhow::Error>(detector)
            })
            .await
            .map_err(|e| PipelineError::model_load(&e))?;
        Ok(detector.clone())
    }
}
