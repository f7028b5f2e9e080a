//! Error types shared across Reelcraft crates.

use std::path::PathBuf;

use reelcraft_model::ModelError;

/// Top-level error type for Reelcraft operations.
///
/// Variants follow the pipeline's failure taxonomy: material, merge, and
/// audio errors are normally absorbed inside their stage loop and only
/// surface when a whole stage is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum ReelcraftError {
    #[error("Material error: {message}")]
    Material { message: String },

    #[error("No usable materials: {message}")]
    NoMaterials { message: String },

    #[error("Merge error: {message}")]
    Merge { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Subtitle error: {message}")]
    Subtitle { message: String },

    #[error("Codec error: {message}")]
    Codec { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelcraftError.
pub type ReelcraftResult<T> = Result<T, ReelcraftError>;

impl ReelcraftError {
    pub fn material(msg: impl Into<String>) -> Self {
        Self::Material {
            message: msg.into(),
        }
    }

    pub fn no_materials(msg: impl Into<String>) -> Self {
        Self::NoMaterials {
            message: msg.into(),
        }
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge {
            message: msg.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio {
            message: msg.into(),
        }
    }

    pub fn subtitle(msg: impl Into<String>) -> Self {
        Self::Subtitle {
            message: msg.into(),
        }
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
