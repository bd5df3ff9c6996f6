//! censor-eye: censor detection and covering
//!
//! Runs a Mask R-CNN instance segmentation model over images and video
//! frames and paints a flat colour over every detected censor region,
//! producing the input expected by a downstream decensoring stage.
//!
//! The model sits behind the [`ModelLoader`] and [`Detector`] traits; the
//! ONNX Runtime implementation is enabled with the `onnx` feature and the
//! OpenCV video backend with the `opencv` feature.

pub mod batch;
pub mod compositor;
pub mod config;
pub mod detector;
pub mod error;
pub mod models;
pub mod processor;
pub mod video;

pub use batch::{BatchReport, BatchRunner, ExtensionPolicy, FileKind};
pub use compositor::{apply_cover, CoverColor, MaskStack};
pub use config::{CensorConfig, InferenceConfig};
pub use detector::{load_detector, DetectionResult, Detector, ModelLoader};
pub use error::CensorError;
pub use processor::{FrameProcessor, VideoSummary};
pub use video::{VideoBackend, VideoInfo, VideoReader, VideoWriter};
