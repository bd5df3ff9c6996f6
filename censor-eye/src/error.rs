//! Error types for censor-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CensorError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CensorError {
    fn from(err: opencv::Error) -> Self {
        CensorError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_censor_error_display() {
        let err = CensorError::Precondition("image path is empty".to_string());
        assert!(err.to_string().contains("Precondition failed"));
        assert!(err.to_string().contains("image path is empty"));
    }

    #[test]
    fn test_censor_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: CensorError = io_err.into();
        match err {
            CensorError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_censor_error_from_toml() {
        let toml_err = toml::from_str::<toml::Table>("= broken").unwrap_err();
        let err: CensorError = toml_err.into();
        assert!(matches!(err, CensorError::Toml(_)));
    }

    #[test]
    fn test_all_error_variants() {
        let _ = CensorError::Config("config".to_string());
        let _ = CensorError::Model("model".to_string());
        let _ = CensorError::Video("video".to_string());
        let _ = CensorError::Ort("ort".to_string());
        let _ = CensorError::OpenCv("opencv".to_string());
    }
}
