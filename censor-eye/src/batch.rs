//! Folder batch runs

use crate::config::CensorConfig;
use crate::detector::Detector;
use crate::error::CensorError;
use crate::processor::FrameProcessor;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a file is treated by a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Processed in image mode
    Image,
    /// Image that must be converted first; counted and skipped
    Convertible,
    /// Processed in video mode
    Video,
    /// Ignored
    Other,
}

/// Extension lists, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    image: Vec<String>,
    convertible: Vec<String>,
    video: Vec<String>,
}

impl ExtensionPolicy {
    pub fn new(image: Vec<String>, convertible: Vec<String>, video: Vec<String>) -> Self {
        Self {
            image,
            convertible,
            video,
        }
    }

    pub fn from_config(config: &CensorConfig) -> Self {
        Self::new(
            config.image_extensions.clone(),
            config.convertible_extensions.clone(),
            config.video_extensions.clone(),
        )
    }

    pub fn classify(&self, path: &Path) -> FileKind {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext,
            None => return FileKind::Other,
        };
        let matches = |list: &[String]| list.iter().any(|known| known.eq_ignore_ascii_case(ext));

        if matches(&self.image) {
            FileKind::Image
        } else if matches(&self.convertible) {
            FileKind::Convertible
        } else if matches(&self.video) {
            FileKind::Video
        } else {
            FileKind::Other
        }
    }
}

/// What one `run` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files covered, in processing order
    pub processed: Vec<PathBuf>,
    /// Files found this run that need conversion first
    pub unsupported: Vec<PathBuf>,
    /// Files with an extension this mode does not handle
    pub ignored: usize,
    /// Video frames written, zero in image mode
    pub frames: usize,
}

impl BatchReport {
    pub fn needs_conversion(&self) -> bool {
        !self.unsupported.is_empty()
    }
}

/// Drives a [`FrameProcessor`] over a folder.
///
/// The unsupported-file counter starts at zero when the runner is built and
/// accumulates over every `run` until [`BatchRunner::reset_unsupported_count`].
pub struct BatchRunner<D> {
    processor: FrameProcessor<D>,
    policy: ExtensionPolicy,
    unsupported_count: usize,
}

impl<D: Detector> BatchRunner<D> {
    pub fn new(processor: FrameProcessor<D>, policy: ExtensionPolicy) -> Self {
        Self {
            processor,
            policy,
            unsupported_count: 0,
        }
    }

    pub fn from_config(processor: FrameProcessor<D>, config: &CensorConfig) -> Self {
        Self::new(processor, ExtensionPolicy::from_config(config))
    }

    /// Convertible files seen since construction or the last reset
    pub fn unsupported_count(&self) -> usize {
        self.unsupported_count
    }

    pub fn reset_unsupported_count(&mut self) {
        self.unsupported_count = 0;
    }

    pub fn processor(&self) -> &FrameProcessor<D> {
        &self.processor
    }

    pub fn policy(&self) -> &ExtensionPolicy {
        &self.policy
    }

    /// Cover every supported file of `input_folder` into `output_folder`.
    ///
    /// The first failing file aborts the run.
    pub fn run(
        &mut self,
        input_folder: &Path,
        output_folder: &Path,
        is_video: bool,
        orig_video_folder: Option<&Path>,
    ) -> Result<BatchReport, CensorError> {
        if input_folder.as_os_str().is_empty() {
            return Err(CensorError::Precondition("input folder is empty".to_string()));
        }
        if output_folder.as_os_str().is_empty() {
            return Err(CensorError::Precondition("output folder is empty".to_string()));
        }
        let orig_video_folder = match (is_video, orig_video_folder) {
            (true, None) => {
                return Err(CensorError::Precondition(
                    "video mode needs a folder for original frames".to_string(),
                ))
            }
            (_, folder) => folder,
        };

        let mut report = BatchReport::default();
        let mut queue = Vec::new();

        for path in list_files(input_folder)? {
            // Outputs reuse the input name, which must survive unchanged
            if path.file_name().and_then(|n| n.to_str()).is_none() {
                warn!("Skipping {:?}, file name is not valid UTF-8", path);
                report.ignored += 1;
                continue;
            }
            match (self.policy.classify(&path), is_video) {
                (FileKind::Video, true) | (FileKind::Image, false) => queue.push(path),
                (FileKind::Convertible, false) => {
                    debug!("Skipping {:?}, convert it to png first", path);
                    self.unsupported_count += 1;
                    report.unsupported.push(path);
                }
                _ => report.ignored += 1,
            }
        }

        info!(
            "Found {} file(s) to process in {:?} ({} unsupported, {} ignored)",
            queue.len(),
            input_folder,
            report.unsupported.len(),
            report.ignored
        );

        for path in queue {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            match orig_video_folder {
                Some(originals) if is_video => {
                    let summary = self.processor.process_video(&path, &name, output_folder, originals)?;
                    report.frames += summary.frames;
                }
                _ => {
                    self.processor.process_image(&path, &name, output_folder)?;
                }
            }
            report.processed.push(path);
        }

        if self.unsupported_count > 0 {
            warn!(
                "{} file(s) need conversion to a supported format before they can be processed",
                self.unsupported_count
            );
        }

        Ok(report)
    }
}

/// Regular files of `folder` (symlinks followed), sorted by name
fn list_files(folder: &Path) -> Result<Vec<PathBuf>, CensorError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
