//! Errors raised while building or parsing model values.

use std::path::PathBuf;

/// Errors that can occur when constructing model values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid sub-clip: {message}")]
    InvalidClip { message: String },

    #[error("Invalid cue: {message}")]
    InvalidCue { message: String },

    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
}
