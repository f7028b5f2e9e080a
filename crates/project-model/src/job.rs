//! Per-job inputs and composition parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::caption::{CaptionPlacement, FontSpec};
use crate::composition::{ConcatMode, MergeStrategy, TransitionMode, VideoAspect};

/// Where background music comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BgmSource {
    /// Uniformly random `*.mp3` from a directory.
    Random { dir: PathBuf },
    /// A specific file.
    File { path: PathBuf },
}

/// Background music request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgmSpec {
    pub source: BgmSource,

    /// Linear gain applied before mixing.
    pub volume: f64,
}

/// Narration produced by the voice engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    pub path: PathBuf,

    /// Known duration; probed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Linear gain applied to the narration.
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Narration {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration_secs: None,
            volume: 1.0,
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

/// Caption rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleParams {
    pub font: FontSpec,
    pub placement: CaptionPlacement,
}

/// Composition knobs for one assembly job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyParams {
    pub aspect: VideoAspect,
    pub concat_mode: ConcatMode,
    pub transition_mode: TransitionMode,

    /// Upper bound on one sub-clip's length (seconds).
    pub max_clip_secs: f64,

    /// Duration given to still images (seconds).
    pub image_clip_secs: f64,

    /// Materials below this size on either axis are rejected.
    pub min_source_px: u32,

    pub merge_strategy: MergeStrategy,

    /// Encoder thread count handed to the codec.
    pub threads: u32,

    /// Final output frame rate.
    pub fps: u32,

    /// Captions; `None` disables the subtitle stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitleParams>,
}

impl Default for AssemblyParams {
    fn default() -> Self {
        Self {
            aspect: VideoAspect::Portrait,
            concat_mode: ConcatMode::Random,
            transition_mode: TransitionMode::None,
            max_clip_secs: 5.0,
            image_clip_secs: 4.0,
            min_source_px: 480,
            merge_strategy: MergeStrategy::default(),
            threads: 2,
            fps: 30,
            subtitles: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgm_spec_json_shape() {
        let spec: BgmSpec =
            serde_json::from_str(r#"{"source":{"kind":"random","dir":"songs"},"volume":0.2}"#).unwrap();
        assert_eq!(
            spec.source,
            BgmSource::Random {
                dir: PathBuf::from("songs")
            }
        );
    }

    #[test]
    fn test_narration_defaults_volume() {
        let n: Narration = serde_json::from_str(r#"{"path":"voice.mp3"}"#).unwrap();
        assert_eq!(n.volume, 1.0);
        assert!(n.duration_secs.is_none());
    }
}
