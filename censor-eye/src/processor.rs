//! Per-file detection and covering

use crate::compositor::{apply_cover, CoverColor};
use crate::config::CensorConfig;
use crate::detector::{detect_one, Detector};
use crate::error::CensorError;
use crate::video::{VideoBackend, VideoWriter};
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of covering one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub frames: usize,
    /// Diagnostic splash video, when enabled
    pub debug_video: Option<PathBuf>,
}

/// Runs the detector on one image or video and writes covered output
pub struct FrameProcessor<D> {
    detector: D,
    cover_color: CoverColor,
    video_backend: Option<Box<dyn VideoBackend>>,
    /// Directory for the splash video; `None` disables it
    debug_video_dir: Option<PathBuf>,
}

impl<D: Detector> FrameProcessor<D> {
    pub fn new(detector: D, config: &CensorConfig) -> Self {
        Self {
            detector,
            cover_color: config.cover_color,
            video_backend: None,
            debug_video_dir: config
                .write_debug_video
                .then(|| config.debug_video_dir.clone()),
        }
    }

    pub fn with_video_backend(mut self, backend: Box<dyn VideoBackend>) -> Self {
        self.video_backend = Some(backend);
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn cover_color(&self) -> CoverColor {
        self.cover_color
    }

    /// Detect on `image` and paint the cover over every instance
    pub fn cover(&mut self, image: &RgbImage) -> Result<RgbImage, CensorError> {
        let result = detect_one(&mut self.detector, image)?;
        debug!("{} instance(s) detected", result.len());
        Ok(apply_cover(image, &result.masks, self.cover_color))
    }

    /// Cover one file. In video mode every frame is written, and the
    /// untouched frames go to `orig_video_folder`.
    pub fn process(
        &mut self,
        image_path: &Path,
        output_name: &str,
        save_path: &Path,
        is_video: bool,
        orig_video_folder: Option<&Path>,
    ) -> Result<(), CensorError> {
        if is_video {
            let originals = orig_video_folder.ok_or_else(|| {
                CensorError::Precondition("video mode needs a folder for original frames".to_string())
            })?;
            self.process_video(image_path, output_name, save_path, originals)?;
        } else {
            self.process_image(image_path, output_name, save_path)?;
        }
        Ok(())
    }

    /// Cover a single image, written to `save_path/output_name`
    pub fn process_image(
        &mut self,
        image_path: &Path,
        output_name: &str,
        save_path: &Path,
    ) -> Result<PathBuf, CensorError> {
        check_inputs(image_path, output_name)?;

        info!("Running on {:?}", image_path);
        let image = image::open(image_path)?.to_rgb8();
        let covered = self.cover(&image)?;

        let file_name = save_path.join(output_name);
        covered.save(&file_name)?;
        info!("Saved to {:?}", file_name);
        Ok(file_name)
    }

    /// Cover every frame of a video.
    ///
    /// Frame `i` is written as `{output_name}{i}` twice: untouched into
    /// `orig_video_folder`, covered into `save_path`.
    pub fn process_video(
        &mut self,
        video_path: &Path,
        output_name: &str,
        save_path: &Path,
        orig_video_folder: &Path,
    ) -> Result<VideoSummary, CensorError> {
        check_inputs(video_path, output_name)?;

        let backend = self
            .video_backend
            .as_ref()
            .ok_or_else(|| CensorError::Video("No video backend configured".to_string()))?;

        let mut reader = backend.open_reader(video_path)?;
        let video_info = reader.info();

        let mut splash: Option<(Box<dyn VideoWriter>, PathBuf)> = match &self.debug_video_dir {
            Some(dir) => {
                let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
                let name = format!("splash_{}_{}.avi", output_name, stamp);
                let path = dir.join(name);
                let writer = backend.create_writer(&path, &video_info)?;
                Some((writer, path))
            }
            None => None,
        };

        let mut count = 0;
        while let Some(frame) = reader.read_frame()? {
            debug!("frame: {}", count);
            let frame_name = format!("{}{}", output_name, count);

            // Originals are kept for the decensoring stage, names must stay stable
            let original = orig_video_folder.join(&frame_name);
            save_png(&frame, &original)?;
            debug!("saving frame as {:?}", original);

            let covered = self.cover(&frame)?;
            let covered_path = save_path.join(&frame_name);
            save_png(&covered, &covered_path)?;
            debug!("saving covered frame as {:?}", covered_path);

            if let Some((writer, _)) = splash.as_mut() {
                writer.write_frame(&covered)?;
            }
            count += 1;
        }

        let debug_video = match splash.take() {
            Some((mut writer, path)) => {
                writer.release()?;
                Some(path)
            }
            None => None,
        };

        info!("video complete: {} frames from {:?}", count, video_path);
        Ok(VideoSummary {
            frames: count,
            debug_video,
        })
    }
}

fn check_inputs(path: &Path, output_name: &str) -> Result<(), CensorError> {
    if path.as_os_str().is_empty() {
        return Err(CensorError::Precondition("input path is empty".to_string()));
    }
    if output_name.is_empty() {
        return Err(CensorError::Precondition("output name is empty".to_string()));
    }
    Ok(())
}

/// Frame names carry no extension, so the format is fixed
fn save_png(image: &RgbImage, path: &Path) -> Result<(), CensorError> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
