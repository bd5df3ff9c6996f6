//! Mask R-CNN instance segmentation over ONNX Runtime

use crate::config::InferenceConfig;
use crate::detector::{DetectionResult, Detector, ModelLoader};
use crate::error::CensorError;
use crate::models::molding::{self, RawDetections};
use image::RgbImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

const INPUT_IMAGE: &str = "input_image";
const INPUT_IMAGE_META: &str = "input_image_meta";
const INPUT_ANCHORS: &str = "input_anchors";
const OUTPUT_DETECTIONS: &str = "mrcnn_detection";
const OUTPUT_MASKS: &str = "mrcnn_mask";

/// Loads exported Mask R-CNN weights into an ONNX session
#[derive(Debug, Clone, Default)]
pub struct MaskRcnnLoader;

impl ModelLoader for MaskRcnnLoader {
    type Model = MaskRcnnModel;

    fn load_weights(&self, weights_path: &Path, config: &InferenceConfig) -> Result<MaskRcnnModel, CensorError> {
        MaskRcnnModel::new(weights_path, config.clone())
    }
}

/// Mask R-CNN in inference mode
pub struct MaskRcnnModel {
    session: Session,
    config: InferenceConfig,
    /// Normalized pyramid anchors `[1, A, 4]`, fixed for the molded size
    anchors: Tensor<f32>,
}

impl MaskRcnnModel {
    /// Create a new Mask R-CNN model
    pub fn new(model_path: &Path, config: InferenceConfig) -> Result<Self, CensorError> {
        if !model_path.exists() {
            return Err(CensorError::Model(format!("Weights not found at {:?}", model_path)));
        }

        let session = Session::builder()
            .map_err(|e| CensorError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CensorError::Ort(format!("Failed to set optimization level: {}", e)))?
            .with_execution_providers([ort::execution_providers::CPUExecutionProvider::default().build()])
            .map_err(|e| CensorError::Ort(format!("Failed to register execution provider: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| CensorError::Ort(format!("Failed to load Mask R-CNN model: {}", e)))?;

        let pyramid = molding::generate_pyramid_anchors(&config);
        let anchor_count = pyramid.len();
        let flat: Vec<f32> = pyramid.into_iter().flatten().collect();
        let anchors = Tensor::from_array(([1usize, anchor_count, 4], flat))
            .map_err(|e| CensorError::Ort(format!("Failed to create anchor tensor: {}", e)))?;

        info!("Mask R-CNN model loaded from {:?} ({} anchors)", model_path, anchor_count);

        Ok(Self {
            session,
            config,
            anchors,
        })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn detect_single(&mut self, image: &RgbImage) -> Result<DetectionResult, CensorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CensorError::Model("Cannot run detection on an empty image".to_string()));
        }

        let mut molded = molding::mold_image(image, &self.config);
        let meta = molding::compose_image_meta(0, (height, width), &molded, self.config.num_classes);
        let size = molded.size as usize;

        let image_input = Tensor::from_array(([1usize, size, size, 3], std::mem::take(&mut molded.data)))
            .map_err(|e| CensorError::Ort(format!("Failed to create image tensor: {}", e)))?;
        let meta_input = Tensor::from_array(([1usize, meta.len()], meta))
            .map_err(|e| CensorError::Ort(format!("Failed to create image meta tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![
                INPUT_IMAGE => image_input,
                INPUT_IMAGE_META => meta_input,
                INPUT_ANCHORS => &self.anchors
            ])
            .map_err(|e| CensorError::Ort(format!("Mask R-CNN inference failed: {}", e)))?;

        let (_, detections) = outputs[OUTPUT_DETECTIONS]
            .try_extract_tensor::<f32>()
            .map_err(|e| CensorError::Ort(format!("Failed to extract detection tensor: {}", e)))?;
        let (mask_shape, masks) = outputs[OUTPUT_MASKS]
            .try_extract_tensor::<f32>()
            .map_err(|e| CensorError::Ort(format!("Failed to extract mask tensor: {}", e)))?;

        // [batch, detections, mask_h, mask_w, classes]
        if mask_shape.len() != 5 {
            return Err(CensorError::Model(format!(
                "Unexpected mask tensor rank {}, expected 5",
                mask_shape.len()
            )));
        }
        let num_classes = mask_shape[4] as usize;
        if num_classes != self.config.num_classes {
            return Err(CensorError::Model(format!(
                "Model predicts {} classes, configuration expects {}",
                num_classes, self.config.num_classes
            )));
        }

        let raw = RawDetections {
            detections,
            masks,
            mask_shape: (mask_shape[2] as u32, mask_shape[3] as u32),
            num_classes,
        };
        let result = molding::unmold_detections(
            &raw,
            (height, width),
            &molded,
            self.config.detection_min_confidence,
        )?;

        debug!("Detected {} instances in {}x{} image", result.len(), width, height);
        Ok(result)
    }
}

impl Detector for MaskRcnnModel {
    fn detect(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, CensorError> {
        let batch = self.config.batch_size() as usize;
        if images.len() != batch {
            return Err(CensorError::Model(format!(
                "Expected {} image(s) per detect call, got {}",
                batch,
                images.len()
            )));
        }

        images.iter().map(|image| self.detect_single(image)).collect()
    }
}
