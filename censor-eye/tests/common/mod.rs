//! Test doubles shared by the integration tests

#![allow(dead_code)]

use censor_eye::{
    CensorError, DetectionResult, Detector, MaskStack, VideoBackend, VideoInfo, VideoReader, VideoWriter,
};
use image::{Rgb, RgbImage};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Claims the left half of every image as one instance
#[derive(Debug, Default)]
pub struct LeftHalfDetector {
    pub calls: usize,
}

impl Detector for LeftHalfDetector {
    fn detect(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, CensorError> {
        self.calls += 1;
        images
            .iter()
            .map(|image| -> Result<DetectionResult, CensorError> {
                let (w, h) = image.dimensions();
                let layer = (0..w * h).map(|i| i % w < w / 2).collect();
                let mut result = DetectionResult::empty(w, h);
                result.rois.push((0, 0, h as i32, (w / 2) as i32));
                result.class_ids.push(1);
                result.scores.push(0.98);
                result.masks = MaskStack::from_layers(w, h, vec![layer])?;
                Ok(result)
            })
            .collect()
    }
}

/// Finds nothing
#[derive(Debug, Default)]
pub struct BlindDetector;

impl Detector for BlindDetector {
    fn detect(&mut self, images: &[RgbImage]) -> Result<Vec<DetectionResult>, CensorError> {
        Ok(images
            .iter()
            .map(|image| DetectionResult::empty(image.width(), image.height()))
            .collect())
    }
}

/// Frames appended to one writer
#[derive(Debug, Default)]
pub struct WrittenVideo {
    pub path: PathBuf,
    pub info: Option<VideoInfo>,
    pub frames: Vec<RgbImage>,
    pub released: bool,
}

/// Synthetic clips of solid frames; records everything written
#[derive(Clone)]
pub struct MemoryVideoBackend {
    pub frames: usize,
    pub info: VideoInfo,
    pub written: Rc<RefCell<Vec<WrittenVideo>>>,
}

impl MemoryVideoBackend {
    pub fn new(frames: usize, width: u32, height: u32, fps: f64) -> Self {
        Self {
            frames,
            info: VideoInfo { width, height, fps },
            written: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

struct MemoryReader {
    info: VideoInfo,
    remaining: usize,
    index: usize,
}

struct MemoryWriter {
    slot: usize,
    written: Rc<RefCell<Vec<WrittenVideo>>>,
}

impl VideoBackend for MemoryVideoBackend {
    fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>, CensorError> {
        if !path.exists() {
            return Err(CensorError::Video(format!("Video {:?} failed to open", path)));
        }
        Ok(Box::new(MemoryReader {
            info: self.info,
            remaining: self.frames,
            index: 0,
        }))
    }

    fn create_writer(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn VideoWriter>, CensorError> {
        let mut written = self.written.borrow_mut();
        written.push(WrittenVideo {
            path: path.to_path_buf(),
            info: Some(*info),
            ..WrittenVideo::default()
        });
        Ok(Box::new(MemoryWriter {
            slot: written.len() - 1,
            written: self.written.clone(),
        }))
    }
}

impl VideoReader for MemoryReader {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, CensorError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let shade = (self.index * 10) as u8;
        self.index += 1;
        Ok(Some(RgbImage::from_pixel(self.info.width, self.info.height, Rgb([shade, 0, 200]))))
    }
}

impl VideoWriter for MemoryWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), CensorError> {
        self.written.borrow_mut()[self.slot].frames.push(frame.clone());
        Ok(())
    }

    fn release(&mut self) -> Result<(), CensorError> {
        self.written.borrow_mut()[self.slot].released = true;
        Ok(())
    }
}

pub fn write_png(path: &Path, width: u32, height: u32, color: [u8; 3]) {
    RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
}

/// Frames are written without an extension, so sniff the format
pub fn read_frame(path: &Path) -> RgbImage {
    image::io::Reader::open(path)
        .unwrap()
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap()
        .to_rgb8()
}
