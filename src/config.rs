use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classify::CHILD_AREA_THRESHOLD;
use crate::detect::{BackendRegistry, ModelLoader, StubLoader};
use crate::error::PipelineError;
use crate::pipeline::{LoopSettings, DEFAULT_REFRESH_HZ};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const MAX_REFRESH_HZ: u32 = 240;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HeadcountConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    model_input_size: Option<u32>,
    min_confidence: Option<f32>,
    iou_threshold: Option<f32>,
    refresh_hz: Option<u32>,
    child_area_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadcountConfig {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub model_input_size: u32,
    pub min_confidence: f32,
    pub iou_threshold: f32,
    pub refresh_hz: u32,
    pub child_area_threshold: f32,
}

impl Default for HeadcountConfig {
    fn default() -> Self {
        Self::from_file(HeadcountConfigFile::default())
    }
}

impl HeadcountConfig {
    /// Defaults, then the file named by `HEADCOUNT_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HEADCOUNT_CONFIG").ok();
        Self::load_with(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file taking the place of
    /// `HEADCOUNT_CONFIG`.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HeadcountConfigFile) -> Self {
        Self {
            backend: file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: file.model_path,
            model_input_size: file.model_input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            min_confidence: file.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            refresh_hz: file.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
            child_area_threshold: file.child_area_threshold.unwrap_or(CHILD_AREA_THRESHOLD),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("HEADCOUNT_BACKEND") {
            if !backend.trim().is_empty() {
                self.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("HEADCOUNT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(hz) = std::env::var("HEADCOUNT_REFRESH_HZ") {
            self.refresh_hz = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_REFRESH_HZ must be a whole number of hertz"))?;
        }
        if let Ok(confidence) = std::env::var("HEADCOUNT_MIN_CONFIDENCE") {
            self.min_confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_MIN_CONFIDENCE must be a number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.refresh_hz == 0 || self.refresh_hz > MAX_REFRESH_HZ {
            return Err(PipelineError::Config(format!(
                "refresh_hz must be between 1 and {}, got {}",
                MAX_REFRESH_HZ, self.refresh_hz
            )));
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{} must be within 0..=1, got {}",
                    name, value
                )));
            }
        }
        if !(self.child_area_threshold > 0.0) {
            return Err(PipelineError::Config(
                "child_area_threshold must be greater than zero".to_string(),
            ));
        }
        if self.model_input_size == 0 {
            return Err(PipelineError::Config(
                "model_input_size must be greater than zero".to_string(),
            ));
        }
        if self.backend == "tract" && self.model_path.is_none() {
            return Err(PipelineError::Config(
                "the tract backend needs model_path (or HEADCOUNT_MODEL_PATH)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            refresh_hz: self.refresh_hz,
            child_area_threshold: self.child_area_threshold,
        }
    }

    /// Every loader this build can offer, with the configured one as default.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        registry.register(StubLoader::default());

        #[cfg(feature = "backend-tract")]
        {
            if let Some(path) = &self.model_path {
                registry.register(
                    crate::detect::backends::TractLoader::new(path.clone(), self.model_input_size)
                        .with_thresholds(self.min_confidence, self.iou_threshold),
                );
            }
        }

        registry.set_default(&self.backend)?;
        Ok(registry)
    }

    /// The loader for the configured backend.
    pub fn model_loader(&self) -> Result<Arc<dyn ModelLoader>> {
        self.build_registry()?.resolve(None)
    }
}

fn read_config_file(path: &Path) -> Result<HeadcountConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
