//! Instance segmentation models

pub mod molding;
#[cfg(feature = "onnx")]
pub mod mask_rcnn;

#[cfg(feature = "onnx")]
pub use mask_rcnn::{MaskRcnnLoader, MaskRcnnModel};
