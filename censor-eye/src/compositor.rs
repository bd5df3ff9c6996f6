//! Flat-colour cover compositing over instance masks

use crate::error::CensorError;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// RGB colour painted over detected regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverColor(pub [u8; 3]);

impl CoverColor {
    pub const GREEN: CoverColor = CoverColor([0, 255, 0]);

    pub fn to_pixel(self) -> Rgb<u8> {
        Rgb(self.0)
    }
}

impl Default for CoverColor {
    fn default() -> Self {
        Self::GREEN
    }
}

/// Per-instance boolean masks (H x W x N), one row-major layer per instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskStack {
    width: u32,
    height: u32,
    layers: Vec<Vec<bool>>,
}

impl MaskStack {
    /// Stack with no instances
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
        }
    }

    /// Build a stack from row-major layers of `width * height` entries each
    pub fn from_layers(width: u32, height: u32, layers: Vec<Vec<bool>>) -> Result<Self, CensorError> {
        let mut stack = Self::empty(width, height);
        for layer in layers {
            stack.push_layer(layer)?;
        }
        Ok(stack)
    }

    pub fn push_layer(&mut self, layer: Vec<bool>) -> Result<(), CensorError> {
        let expected = self.width as usize * self.height as usize;
        if layer.len() != expected {
            return Err(CensorError::Model(format!(
                "Mask layer has {} entries, expected {} ({}x{})",
                layer.len(),
                expected,
                self.width,
                self.height
            )));
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Vec<bool>] {
        &self.layers
    }

    /// How many instances claim pixel (x, y)
    pub fn coverage_at(&self, x: u32, y: u32) -> usize {
        let idx = (y * self.width + x) as usize;
        self.layers.iter().filter(|layer| layer[idx]).count()
    }

    /// Collapse all instances into one layer
    pub fn union(&self) -> Vec<bool> {
        let size = self.width as usize * self.height as usize;
        let mut counts = vec![0usize; size];
        for layer in &self.layers {
            for (count, &claimed) in counts.iter_mut().zip(layer) {
                *count += claimed as usize;
            }
        }
        // A pixel stays visible only when no instance claims it.
        counts.into_iter().map(|count| count >= 1).collect()
    }
}

/// Paint `color` over every pixel claimed by at least one instance.
///
/// With no instances at all the whole image is covered: an image the model
/// found nothing in is treated as entirely sensitive rather than passed
/// through untouched.
pub fn apply_cover(image: &RgbImage, masks: &MaskStack, color: CoverColor) -> RgbImage {
    let (width, height) = image.dimensions();
    let cover = color.to_pixel();

    if masks.is_empty() {
        return RgbImage::from_pixel(width, height, cover);
    }

    debug_assert_eq!(
        (masks.width(), masks.height()),
        (width, height),
        "mask stack and image shapes differ"
    );

    let union = masks.union();
    let mut covered = image.clone();
    for (pixel, &claimed) in covered.pixels_mut().zip(union.iter()) {
        if claimed {
            *pixel = cover;
        }
    }
    covered
}
