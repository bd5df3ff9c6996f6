//! Configuration for censor-eye

use crate::compositor::CoverColor;
use crate::error::CensorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Mask R-CNN inference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Configuration name, used in log lines
    pub name: String,
    /// Number of classes including background
    pub num_classes: usize,
    /// Class names, index 0 is background
    pub class_names: Vec<String>,
    /// Short side of the molded image is scaled up to at least this
    pub image_min_dim: u32,
    /// Long side of the molded image never exceeds this; images are padded to a square of this size
    pub image_max_dim: u32,
    /// Per-channel mean subtracted during molding (RGB)
    pub mean_pixel: [f32; 3],
    pub gpu_count: u32,
    pub images_per_gpu: u32,
    /// Detections scoring below this are dropped
    pub detection_min_confidence: f32,
    /// Anchor side length in pixels, one per pyramid level
    pub rpn_anchor_scales: Vec<f32>,
    /// Anchor width/height ratios
    pub rpn_anchor_ratios: Vec<f32>,
    /// Feature map stride of each pyramid level
    pub backbone_strides: Vec<u32>,
    pub rpn_anchor_stride: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            name: "censor".to_string(),
            num_classes: 3,
            class_names: vec!["BG".to_string(), "bar".to_string(), "mosaic".to_string()],
            image_min_dim: 512,
            image_max_dim: 512,
            mean_pixel: [123.7, 116.8, 103.9],
            gpu_count: 1,
            images_per_gpu: 1,
            detection_min_confidence: 0.75,
            rpn_anchor_scales: vec![32.0, 64.0, 128.0, 256.0, 512.0],
            rpn_anchor_ratios: vec![0.5, 1.0, 2.0],
            backbone_strides: vec![4, 8, 16, 32, 64],
            rpn_anchor_stride: 1,
        }
    }
}

impl InferenceConfig {
    /// Images fed to the model per call
    pub fn batch_size(&self) -> u32 {
        self.gpu_count * self.images_per_gpu
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size() != 1 {
            return Err(format!(
                "Inference runs one image at a time, batch size is {}",
                self.batch_size()
            ));
        }

        if self.num_classes < 2 {
            return Err("At least one class besides background is required".to_string());
        }

        if self.class_names.len() != self.num_classes {
            return Err(format!(
                "{} class names given for {} classes",
                self.class_names.len(),
                self.num_classes
            ));
        }

        if self.image_min_dim == 0 || self.image_max_dim == 0 {
            return Err("Image dimensions must be non-zero".to_string());
        }

        if self.image_min_dim > self.image_max_dim {
            return Err("image_min_dim must not exceed image_max_dim".to_string());
        }

        // Five downsamplings in the backbone
        if self.image_max_dim % 64 != 0 {
            return Err("image_max_dim must be a multiple of 64".to_string());
        }

        if !(0.0..=1.0).contains(&self.detection_min_confidence) {
            return Err("detection_min_confidence must be within [0, 1]".to_string());
        }

        if self.rpn_anchor_scales.len() != self.backbone_strides.len() {
            return Err("One anchor scale is required per backbone stride".to_string());
        }

        if self.rpn_anchor_ratios.is_empty() || self.rpn_anchor_ratios.iter().any(|r| *r <= 0.0) {
            return Err("Anchor ratios must be positive".to_string());
        }

        if self.rpn_anchor_stride == 0 || self.backbone_strides.contains(&0) {
            return Err("Strides must be non-zero".to_string());
        }

        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CensorConfig {
    /// Path to the exported model weights
    pub weights_path: PathBuf,
    pub inference: InferenceConfig,
    pub cover_color: CoverColor,
    /// Extensions processed directly in image mode
    pub image_extensions: Vec<String>,
    /// Image extensions that must be converted before processing; counted and skipped
    pub convertible_extensions: Vec<String>,
    /// Extensions processed in video mode
    pub video_extensions: Vec<String>,
    /// Write the diagnostic splash video alongside video frames
    pub write_debug_video: bool,
    pub debug_video_dir: PathBuf,
}

impl Default for CensorConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("weights.onnx"),
            inference: InferenceConfig::default(),
            cover_color: CoverColor::default(),
            image_extensions: vec!["png".to_string()],
            convertible_extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            video_extensions: vec!["mp4".to_string()],
            write_debug_video: true,
            debug_video_dir: PathBuf::from("."),
        }
    }
}

impl CensorConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, CensorError> {
        let content = fs::read_to_string(path)?;
        let config: CensorConfig = toml::from_str(&content)?;
        config.validate().map_err(CensorError::Config)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, CensorError> {
        toml::to_string_pretty(self).map_err(|e| CensorError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.inference.validate()?;

        if self.weights_path.as_os_str().is_empty() {
            return Err("Weights path must not be empty".to_string());
        }

        if self.image_extensions.is_empty() {
            return Err("At least one image extension is required".to_string());
        }

        if self.video_extensions.is_empty() {
            return Err("At least one video extension is required".to_string());
        }

        for ext in self
            .image_extensions
            .iter()
            .chain(&self.convertible_extensions)
            .chain(&self.video_extensions)
        {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(format!("Invalid extension {:?}, use the bare extension", ext));
            }
        }

        if let Some(ext) = self
            .convertible_extensions
            .iter()
            .find(|ext| self.image_extensions.iter().any(|img| img.eq_ignore_ascii_case(ext)))
        {
            return Err(format!("Extension {:?} is both supported and convertible", ext));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CensorConfig::default();
        assert_eq!(config.cover_color, CoverColor([0, 255, 0]));
        assert_eq!(config.image_extensions, vec!["png"]);
        assert_eq!(config.convertible_extensions, vec!["jpg", "jpeg"]);
        assert_eq!(config.video_extensions, vec!["mp4"]);
        assert!(config.write_debug_video);
        assert_eq!(config.inference.batch_size(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inference_batch_size_must_be_one() {
        let mut config = InferenceConfig::default();
        config.images_per_gpu = 2;
        assert!(config.validate().is_err());

        config.images_per_gpu = 1;
        config.gpu_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_class_names_match() {
        let mut config = InferenceConfig::default();
        config.class_names.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_dims() {
        let mut config = InferenceConfig::default();
        config.image_max_dim = 500;
        assert!(config.validate().is_err());

        config.image_max_dim = 512;
        config.image_min_dim = 1024;
        assert!(config.validate().is_err());

        config.image_min_dim = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inference_confidence_range() {
        let mut config = InferenceConfig::default();
        config.detection_min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_anchor_levels_match_strides() {
        let mut config = InferenceConfig::default();
        config.rpn_anchor_scales.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extension_overlap_rejected() {
        let mut config = CensorConfig::default();
        config.convertible_extensions.push("PNG".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dotted_extension_rejected() {
        let mut config = CensorConfig::default();
        config.video_extensions = vec![".mp4".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("censor.toml");
        fs::write(
            &path,
            "weights_path = \"models/bars.onnx\"\nvideo_extensions = [\"mp4\", \"mov\"]\n\n[inference]\ndetection_min_confidence = 0.5\n",
        )
        .unwrap();

        let config = CensorConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.weights_path, PathBuf::from("models/bars.onnx"));
        assert_eq!(config.video_extensions, vec!["mp4", "mov"]);
        assert_eq!(config.inference.detection_min_confidence, 0.5);
        assert_eq!(config.inference.image_max_dim, 512);
        assert_eq!(config.image_extensions, vec!["png"]);
    }

    #[test]
    fn test_toml_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("censor.toml");
        fs::write(&path, "[inference]\nimages_per_gpu = 4\n").unwrap();

        match CensorConfig::from_toml_file(&path) {
            Err(CensorError::Config(msg)) => assert!(msg.contains("batch size")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_toml_string_parses_back() {
        let config = CensorConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed: CensorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
