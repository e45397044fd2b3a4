use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid band '{id}': {reason}")]
    InvalidBand { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Length mismatch: {samples} samples but {times} timestamps")]
    LengthMismatch { samples: usize, times: usize },

    #[error("Shape mismatch: expected per-sample shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("StreamWatcher is not connected, call connect() first")]
    NotConnected,

    #[error("No stream found with name: {0}")]
    StreamNotFound(String),

    #[error("Value type mismatch: expected {expected}, got {actual}")]
    ValueTypeMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Array shape error: {0}")]
    ArrayShapeError(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;
