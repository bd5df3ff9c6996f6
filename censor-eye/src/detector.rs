//! Detector capability: model loading and per-image instance detection

use crate::compositor::MaskStack;
use crate::config::InferenceConfig;
use crate::error::CensorError;
use image::RgbImage;
use std::path::Path;

/// Pixel-space box, `(y1, x1, y2, x2)` with exclusive max corner
pub type Roi = (i32, i32, i32, i32);

/// Detections for one image
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub rois: Vec<Roi>,
    pub class_ids: Vec<usize>,
    pub scores: Vec<f32>,
    /// One layer per detection, same order as `rois`
    pub masks: MaskStack,
}

impl DetectionResult {
    /// Result with no detections for a `width x height` image
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            rois: Vec::new(),
            class_ids: Vec::new(),
            scores: Vec::new(),
            masks: MaskStack::empty(width, height),
        }
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }
}

/// Instance segmentation model ready for inference
#[cfg_attr(test, mockall::automock)]
pub trait Detector {
    /// Run inference, one result per input image in input order
    fn detect(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, CensorError>;
}

/// Builds a [`Detector`] from a weights file
#[cfg_attr(test, mockall::automock(type Model = MockDetector;))]
pub trait ModelLoader {
    type Model: Detector;

    fn load_weights(&self, weights_path: &Path, config: &InferenceConfig) -> Result<Self::Model, CensorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, CensorError> {
        (**self).detect(images)
    }
}

/// Detect on a single image, the only batch size the pipeline uses
pub fn detect_one<D: Detector + ?Sized>(detector: &mut D, image: &RgbImage) -> Result<DetectionResult, CensorError> {
    let mut results = detector.detect(std::slice::from_ref(image))?;
    if results.len() != 1 {
        return Err(CensorError::Model(format!(
            "Detector returned {} results for 1 image",
            results.len()
        )));
    }
    Ok(results.remove(0))
}

/// Validate the config and load the model
pub fn load_detector<L: ModelLoader>(
    loader: &L,
    weights_path: &Path,
    config: &InferenceConfig,
) -> Result<L::Model, CensorError> {
    config.validate().map_err(CensorError::Config)?;
    if weights_path.as_os_str().is_empty() {
        return Err(CensorError::Precondition("weights path is empty".to_string()));
    }
    tracing::info!("Loading {} weights from {:?}", config.name, weights_path);
    loader.load_weights(weights_path, config)
}
