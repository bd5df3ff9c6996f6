//! Mask R-CNN input molding and output unmolding
//!
//! Pure tensor bookkeeping around the network: square resize with padding,
//! mean subtraction, image meta, pyramid anchors and the reverse mapping of
//! detections and low-resolution masks back to the source image.

use crate::config::InferenceConfig;
use crate::detector::{DetectionResult, Roi};
use crate::error::CensorError;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

/// Values per detection row: y1, x1, y2, x2, class id, score
pub const DETECTION_ROW: usize = 6;

const MASK_THRESHOLD: f32 = 0.5;

/// Region of the molded image holding real pixels (the rest is padding)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub y1: u32,
    pub x1: u32,
    pub y2: u32,
    pub x2: u32,
}

/// Image resized, padded and mean-subtracted for the network
#[derive(Debug, Clone)]
pub struct MoldedImage {
    /// HWC, RGB, `size * size * 3` values
    pub data: Vec<f32>,
    pub size: u32,
    pub window: Window,
    pub scale: f32,
}

/// Resize keeping aspect ratio so the short side reaches `min_dim` without
/// the long side exceeding `max_dim`, then pad to a `max_dim` square.
pub fn resize_square(image: &RgbImage, min_dim: u32, max_dim: u32) -> (RgbImage, Window, f32) {
    let (w, h) = image.dimensions();
    let short = w.min(h).max(1) as f32;
    let long = w.max(h).max(1) as f32;

    let mut scale = (min_dim as f32 / short).max(1.0);
    if (long * scale).round() > max_dim as f32 {
        scale = max_dim as f32 / long;
    }

    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dim);
    let resized = if (new_w, new_h) == (w, h) {
        image.clone()
    } else {
        imageops::resize(image, new_w, new_h, FilterType::Triangle)
    };

    let top = (max_dim - new_h) / 2;
    let left = (max_dim - new_w) / 2;
    let mut padded = RgbImage::from_pixel(max_dim, max_dim, Rgb([0, 0, 0]));
    imageops::replace(&mut padded, &resized, left as i64, top as i64);

    let window = Window {
        y1: top,
        x1: left,
        y2: top + new_h,
        x2: left + new_w,
    };
    (padded, window, scale)
}

/// Resize, pad and subtract the mean pixel
pub fn mold_image(image: &RgbImage, config: &InferenceConfig) -> MoldedImage {
    let (padded, window, scale) = resize_square(image, config.image_min_dim, config.image_max_dim);
    let mut data = Vec::with_capacity(padded.as_raw().len());
    for pixel in padded.pixels() {
        for c in 0..3 {
            data.push(pixel[c] as f32 - config.mean_pixel[c]);
        }
    }

    MoldedImage {
        data,
        size: config.image_max_dim,
        window,
        scale,
    }
}

/// Image attributes the network reads alongside the pixels
pub fn compose_image_meta(
    image_id: u32,
    original: (u32, u32),
    molded: &MoldedImage,
    num_classes: usize,
) -> Vec<f32> {
    let (orig_h, orig_w) = original;
    let w = molded.window;
    let mut meta = Vec::with_capacity(12 + num_classes);
    meta.push(image_id as f32);
    meta.extend([orig_h as f32, orig_w as f32, 3.0]);
    meta.extend([molded.size as f32, molded.size as f32, 3.0]);
    meta.extend([w.y1 as f32, w.x1 as f32, w.y2 as f32, w.x2 as f32]);
    meta.push(molded.scale);
    // every class is active at inference time
    meta.extend(std::iter::repeat(1.0).take(num_classes));
    meta
}

/// Feature map size for each backbone stride
pub fn backbone_shapes(image_dim: u32, strides: &[u32]) -> Vec<(u32, u32)> {
    strides
        .iter()
        .map(|&stride| {
            let side = (image_dim as f32 / stride as f32).ceil() as u32;
            (side, side)
        })
        .collect()
}

/// Pixel-space anchors `[y1, x1, y2, x2]` for one pyramid level, ordered by
/// cell row, cell column, then ratio.
pub fn generate_anchors(
    scale: f32,
    ratios: &[f32],
    shape: (u32, u32),
    feature_stride: u32,
    anchor_stride: u32,
) -> Vec<[f32; 4]> {
    let sizes: Vec<(f32, f32)> = ratios
        .iter()
        .map(|r| (scale / r.sqrt(), scale * r.sqrt()))
        .collect();

    let mut anchors = Vec::new();
    for row in (0..shape.0).step_by(anchor_stride as usize) {
        let cy = (row * feature_stride) as f32;
        for col in (0..shape.1).step_by(anchor_stride as usize) {
            let cx = (col * feature_stride) as f32;
            for &(h, w) in &sizes {
                anchors.push([cy - 0.5 * h, cx - 0.5 * w, cy + 0.5 * h, cx + 0.5 * w]);
            }
        }
    }
    anchors
}

/// Normalized anchors for every pyramid level, concatenated
pub fn generate_pyramid_anchors(config: &InferenceConfig) -> Vec<[f32; 4]> {
    let dim = config.image_max_dim;
    let shapes = backbone_shapes(dim, &config.backbone_strides);

    let mut anchors = Vec::new();
    for ((&scale, &stride), &shape) in config
        .rpn_anchor_scales
        .iter()
        .zip(&config.backbone_strides)
        .zip(&shapes)
    {
        anchors.extend(generate_anchors(
            scale,
            &config.rpn_anchor_ratios,
            shape,
            stride,
            config.rpn_anchor_stride,
        ));
    }

    anchors.iter().map(|b| norm_box(*b, (dim, dim))).collect()
}

/// Pixel box to normalized coordinates; the max corner is exclusive in pixel space
pub fn norm_box(b: [f32; 4], shape: (u32, u32)) -> [f32; 4] {
    let sh = shape.0 as f32 - 1.0;
    let sw = shape.1 as f32 - 1.0;
    [b[0] / sh, b[1] / sw, (b[2] - 1.0) / sh, (b[3] - 1.0) / sw]
}

/// Normalized box to integer pixel coordinates
pub fn denorm_box(b: [f32; 4], shape: (u32, u32)) -> [i32; 4] {
    let sh = shape.0 as f32 - 1.0;
    let sw = shape.1 as f32 - 1.0;
    [
        (b[0] * sh).round() as i32,
        (b[1] * sw).round() as i32,
        (b[2] * sh + 1.0).round() as i32,
        (b[3] * sw + 1.0).round() as i32,
    ]
}

/// Scale a low-resolution mask to its box and paste it into a full-size layer
pub fn unmold_mask(mask: &[f32], mask_shape: (u32, u32), roi: Roi, image_shape: (u32, u32)) -> Vec<bool> {
    let (img_h, img_w) = image_shape;
    let (y1, x1, y2, x2) = roi;
    let mut full = vec![false; img_h as usize * img_w as usize];

    let box_h = (y2 - y1).max(1) as u32;
    let box_w = (x2 - x1).max(1) as u32;
    let small: ImageBuffer<Luma<f32>, Vec<f32>> =
        match ImageBuffer::from_raw(mask_shape.1, mask_shape.0, mask.to_vec()) {
            Some(buf) => buf,
            None => return full,
        };
    let scaled = imageops::resize(&small, box_w, box_h, FilterType::Triangle);

    for (bx, by, value) in scaled.enumerate_pixels() {
        let x = x1 + bx as i32;
        let y = y1 + by as i32;
        if x < 0 || y < 0 || x >= img_w as i32 || y >= img_h as i32 {
            continue;
        }
        if value[0] >= MASK_THRESHOLD {
            full[y as usize * img_w as usize + x as usize] = true;
        }
    }
    full
}

/// Raw network outputs for one image
#[derive(Debug, Clone)]
pub struct RawDetections<'a> {
    /// `[N, 6]` rows, normalized to the molded image, zero-padded
    pub detections: &'a [f32],
    /// `[N, mask_h, mask_w, num_classes]`
    pub masks: &'a [f32],
    pub mask_shape: (u32, u32),
    pub num_classes: usize,
}

/// Map network outputs back onto the original image
pub fn unmold_detections(
    raw: &RawDetections<'_>,
    original: (u32, u32),
    molded: &MoldedImage,
    min_confidence: f32,
) -> Result<DetectionResult, CensorError> {
    let (orig_h, orig_w) = original;
    let (mask_h, mask_w) = raw.mask_shape;
    let mask_len = mask_h as usize * mask_w as usize;
    let per_detection_mask = mask_len * raw.num_classes;

    if raw.detections.len() % DETECTION_ROW != 0 {
        return Err(CensorError::Model(format!(
            "Detection tensor length {} is not a multiple of {}",
            raw.detections.len(),
            DETECTION_ROW
        )));
    }
    let rows = raw.detections.len() / DETECTION_ROW;
    if raw.masks.len() < rows * per_detection_mask {
        return Err(CensorError::Model(format!(
            "Mask tensor holds {} values, {} detections need {}",
            raw.masks.len(),
            rows,
            rows * per_detection_mask
        )));
    }

    let size = molded.size;
    let win = norm_box(
        [
            molded.window.y1 as f32,
            molded.window.x1 as f32,
            molded.window.y2 as f32,
            molded.window.x2 as f32,
        ],
        (size, size),
    );
    let win_h = win[2] - win[0];
    let win_w = win[3] - win[1];

    let mut result = DetectionResult::empty(orig_w, orig_h);
    for (i, row) in raw.detections.chunks_exact(DETECTION_ROW).enumerate() {
        let class_id = row[4] as usize;
        // Padding rows start at the first zero class id
        if class_id == 0 {
            break;
        }
        let score = row[5];
        if score < min_confidence || class_id >= raw.num_classes {
            continue;
        }

        let shifted = [
            (row[0] - win[0]) / win_h,
            (row[1] - win[1]) / win_w,
            (row[2] - win[0]) / win_h,
            (row[3] - win[1]) / win_w,
        ];
        let [y1, x1, y2, x2] = denorm_box(shifted, original);
        if (y2 - y1) <= 0 || (x2 - x1) <= 0 {
            continue;
        }

        let base = i * per_detection_mask;
        let class_mask: Vec<f32> = (0..mask_len)
            .map(|p| raw.masks[base + p * raw.num_classes + class_id])
            .collect();
        let roi = (y1, x1, y2, x2);
        let layer = unmold_mask(&class_mask, raw.mask_shape, roi, original);

        result.rois.push(roi);
        result.class_ids.push(class_id);
        result.scores.push(score);
        result.masks.push_layer(layer)?;
    }

    Ok(result)
}
