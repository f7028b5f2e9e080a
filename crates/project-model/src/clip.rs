//! Sub-clips: bounded-duration segments derived from one source material.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A bounded-duration segment of one source material.
///
/// `width`/`height` are the letterboxed render size of the footage inside
/// the target canvas, not the canvas itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubClip {
    /// Original material this segment was cut from.
    pub source: PathBuf,

    /// Start offset within the source (seconds).
    pub start_secs: f64,

    /// End offset within the source (seconds), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_secs: Option<f64>,

    /// Segment length in seconds. Always positive.
    pub duration_secs: f64,

    /// Scaled footage width inside the canvas.
    pub width: u32,

    /// Scaled footage height inside the canvas.
    pub height: u32,

    /// Temporary file the normalized segment was written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Identity of a sub-clip: its source and offsets.
///
/// Two sub-clips share a key only when they were cut from the same source at
/// the same offsets, i.e. the same material appears twice in the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipKey {
    pub source: PathBuf,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SubClip {
    /// Cut `[start, end)` from `source`; duration is `end - start`.
    pub fn new(
        source: impl Into<PathBuf>,
        start_secs: f64,
        end_secs: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, ModelError> {
        Self::build(
            source.into(),
            start_secs,
            Some(end_secs),
            end_secs - start_secs,
            width,
            height,
        )
    }

    /// Segment starting at `start_secs` with an explicit duration.
    pub fn with_duration(
        source: impl Into<PathBuf>,
        start_secs: f64,
        duration_secs: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, ModelError> {
        Self::build(source.into(), start_secs, None, duration_secs, width, height)
    }

    fn build(
        source: PathBuf,
        start_secs: f64,
        end_secs: Option<f64>,
        duration_secs: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, ModelError> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(ModelError::InvalidClip {
                message: format!(
                    "{} at {start_secs:.3}s has non-positive duration {duration_secs:.3}s",
                    source.display()
                ),
            });
        }
        if start_secs < 0.0 {
            return Err(ModelError::InvalidClip {
                message: format!("{} starts before zero", source.display()),
            });
        }
        Ok(Self {
            source,
            start_secs,
            end_secs,
            duration_secs,
            width,
            height,
            artifact: None,
        })
    }

    /// Attach the materialized file path.
    pub fn materialized(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Path the merge engine should load: the artifact if present, else the source.
    pub fn media_path(&self) -> &Path {
        self.artifact.as_deref().unwrap_or(&self.source)
    }

    /// Effective end offset.
    pub fn end(&self) -> f64 {
        self.end_secs
            .unwrap_or(self.start_secs + self.duration_secs)
    }

    pub fn key(&self) -> ClipKey {
        ClipKey {
            source: self.source.clone(),
            start_ms: (self.start_secs * 1000.0).round() as u64,
            end_ms: (self.end() * 1000.0).round() as u64,
        }
    }

    /// Check `end <= source_duration` within a millisecond of slack.
    pub fn fits_within(&self, source_duration_secs: f64) -> bool {
        self.end() <= source_duration_secs + 1e-3
    }
}
