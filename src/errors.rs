use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the mood pipeline.
///
/// Every stage of the pipeline reports through this enum so that the session
/// boundary can turn any failure into a short user-visible message without
/// parsing error strings.
#[derive(Error, Debug)]
pub enum CatMoodError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetch error: {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Model load failed after {attempts} attempt(s): {reason}")]
    ModelLoadFailed { attempts: u32, reason: String },

    #[error("Model is not ready")]
    ModelNotReady,

    #[error("Unreadable image: {reason}")]
    UnreadableImage { reason: String },

    #[error("Image decode failed")]
    ImageDecodeFailed {
        #[source]
        source: image::ImageError,
    },

    #[error("Inference failed: {reason}")]
    InferenceFailed { reason: String },
}

pub type Result<T> = std::result::Result<T, CatMoodError>;

impl CatMoodError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Into<String>) -> Self {
        Self::InferenceFailed {
            reason: reason.into(),
        }
    }

    /// Short message shown to the user in place of the full error chain.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ModelLoadFailed { .. } => "Model failed to load. Reload to try again.",
            Self::ModelNotReady => "Model is not loaded yet.",
            Self::UnreadableImage { .. } => "This file is not a readable image.",
            Self::ImageDecodeFailed { .. } => "Image failed to load.",
            Self::InferenceFailed { .. } | Self::Model { .. } => "Image analysis failed.",
            Self::Fetch { .. } => "Model download failed.",
            Self::Configuration { .. } | Self::Validation { .. } => "Mood table is misconfigured.",
            Self::FileSystem { .. } => "File could not be read.",
        }
    }

    /// Whether a model load that failed with this error may succeed on retry.
    ///
    /// Configuration and validation defects are deterministic: retrying only
    /// delays the terminal state.
    pub const fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Configuration { .. } | Self::Validation { .. }
        )
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should construct
/// `CatMoodError::FileSystem` directly.
impl From<std::io::Error> for CatMoodError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for CatMoodError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageDecodeFailed { source: err }
    }
}

impl From<ort::Error> for CatMoodError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors only arise while building or reading tensors, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for CatMoodError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<reqwest::Error> for CatMoodError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch {
            url: err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CatMoodError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
