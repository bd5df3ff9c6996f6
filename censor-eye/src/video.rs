//! Video decode/encode seam
//!
//! Readers hand out RGB frames and writers take RGB frames; any conversion
//! to and from the codec's native channel order happens inside the backend.

use crate::error::CensorError;
use image::RgbImage;
use std::path::Path;

/// Stream properties reported by a reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

pub trait VideoReader {
    fn info(&self) -> VideoInfo;

    /// Next frame in RGB order, `None` once the stream is exhausted
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CensorError>;
}

pub trait VideoWriter {
    /// Append an RGB frame
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), CensorError>;

    /// Flush and close; dropping the writer also releases it
    fn release(&mut self) -> Result<(), CensorError>;
}

pub trait VideoBackend {
    fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>, CensorError>;

    /// MJPG writer at the given resolution and frame rate
    fn create_writer(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn VideoWriter>, CensorError>;
}

#[cfg(feature = "opencv")]
pub use self::opencv_backend::OpenCvBackend;

#[cfg(feature = "opencv")]
mod opencv_backend {
    use super::{VideoBackend, VideoInfo, VideoReader, VideoWriter};
    use crate::error::CensorError;
    use image::RgbImage;
    use opencv::{
        core::{Mat, Scalar, Size, CV_8UC3},
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use std::path::Path;
    use tracing::info;

    /// Video I/O through OpenCV videoio
    #[derive(Debug, Clone, Copy, Default)]
    pub struct OpenCvBackend;

    fn path_str(path: &Path) -> Result<&str, CensorError> {
        path.to_str()
            .ok_or_else(|| CensorError::Video(format!("Path {:?} is not valid UTF-8", path)))
    }

    struct OpenCvReader {
        capture: VideoCapture,
        info: VideoInfo,
    }

    struct OpenCvWriter {
        writer: videoio::VideoWriter,
        size: (u32, u32),
    }

    impl VideoBackend for OpenCvBackend {
        fn open_reader(&self, path: &Path) -> Result<Box<dyn VideoReader>, CensorError> {
            let capture = VideoCapture::from_file(path_str(path)?, CAP_ANY)
                .map_err(|e| CensorError::Video(format!("Failed to open video {:?}: {}", path, e)))?;

            if !capture.is_opened()? {
                return Err(CensorError::Video(format!("Video {:?} failed to open", path)));
            }

            let width = capture.get(CAP_PROP_FRAME_WIDTH)?;
            let height = capture.get(CAP_PROP_FRAME_HEIGHT)?;
            let fps = capture.get(CAP_PROP_FPS)?;

            if width <= 0.0 || height <= 0.0 {
                return Err(CensorError::Video(format!("Video {:?} reports no frame size", path)));
            }

            let info = VideoInfo {
                width: width as u32,
                height: height as u32,
                fps,
            };
            info!("Opened {:?} at {}x{} @ {}fps", path, info.width, info.height, info.fps);

            Ok(Box::new(OpenCvReader { capture, info }))
        }

        fn create_writer(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn VideoWriter>, CensorError> {
            let fourcc = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G')?;
            let size = Size::new(info.width as i32, info.height as i32);
            let writer = videoio::VideoWriter::new(path_str(path)?, fourcc, info.fps, size, true)
                .map_err(|e| CensorError::Video(format!("Failed to create writer {:?}: {}", path, e)))?;

            if !writer.is_opened()? {
                return Err(CensorError::Video(format!("Writer {:?} failed to open", path)));
            }

            Ok(Box::new(OpenCvWriter {
                writer,
                size: (info.width, info.height),
            }))
        }
    }

    impl VideoReader for OpenCvReader {
        fn info(&self) -> VideoInfo {
            self.info
        }

        fn read_frame(&mut self) -> Result<Option<RgbImage>, CensorError> {
            let mut frame = Mat::default();
            if !self.capture.read(&mut frame)? || frame.rows() <= 0 || frame.cols() <= 0 {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            let bytes = if rgb.is_continuous() {
                rgb.data_bytes()?.to_vec()
            } else {
                rgb.try_clone()?.data_bytes()?.to_vec()
            };

            RgbImage::from_raw(width, height, bytes)
                .map(Some)
                .ok_or_else(|| CensorError::Video(format!("Decoded frame is not {}x{} RGB", width, height)))
        }
    }

    impl VideoWriter for OpenCvWriter {
        fn write_frame(&mut self, frame: &RgbImage) -> Result<(), CensorError> {
            if frame.dimensions() != self.size {
                return Err(CensorError::Video(format!(
                    "Frame is {:?}, writer expects {:?}",
                    frame.dimensions(),
                    self.size
                )));
            }

            let (width, height) = frame.dimensions();
            let mut rgb = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
            rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());

            let mut bgr = Mat::default();
            imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
            self.writer.write(&bgr)?;
            Ok(())
        }

        fn release(&mut self) -> Result<(), CensorError> {
            self.writer.release()?;
            Ok(())
        }
    }

}
