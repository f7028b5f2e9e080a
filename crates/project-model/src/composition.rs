//! Composition modes: how sub-clips are ordered, joined, and framed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clip::SubClip;
use crate::error::ModelError;

/// Target aspect, mapped to a canonical canvas resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoAspect {
    /// 9:16
    #[default]
    Portrait,
    /// 16:9
    Landscape,
    /// 1:1
    Square,
}

impl VideoAspect {
    /// Canvas `(width, height)` in pixels.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Portrait => (1080, 1920),
            Self::Landscape => (1920, 1080),
            Self::Square => (1080, 1080),
        }
    }
}

impl FromStr for VideoAspect {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" | "9:16" => Ok(Self::Portrait),
            "landscape" | "16:9" => Ok(Self::Landscape),
            "square" | "1:1" => Ok(Self::Square),
            other => Err(ModelError::UnknownVariant {
                kind: "aspect",
                value: other.to_string(),
            }),
        }
    }
}

/// How sub-clips are ordered before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMode {
    /// Source order, one segment per source.
    Sequential,
    /// Shuffled, no identical neighbours where avoidable.
    #[default]
    Random,
}

impl FromStr for ConcatMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => Err(ModelError::UnknownVariant {
                kind: "concat mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Visual effect applied to each clip joined onto the accumulated base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionMode {
    #[default]
    None,
    FadeIn,
    FadeOut,
    SlideIn,
    SlideOut,
    /// Pick one of the four concrete transitions per join.
    Shuffle,
}

impl FromStr for TransitionMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" | "" => Ok(Self::None),
            "fade-in" | "fadein" => Ok(Self::FadeIn),
            "fade-out" | "fadeout" => Ok(Self::FadeOut),
            "slide-in" | "slidein" => Ok(Self::SlideIn),
            "slide-out" | "slideout" => Ok(Self::SlideOut),
            "shuffle" => Ok(Self::Shuffle),
            other => Err(ModelError::UnknownVariant {
                kind: "transition mode",
                value: other.to_string(),
            }),
        }
    }
}

/// How the ordered sub-clips are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Grow an on-disk base `batch_size` clips at a time; peak memory is
    /// bounded by the batch, at the cost of re-encoding the base each step.
    DiskBatched { batch_size: usize },
    /// Concatenate everything in one encode.
    SingleShot,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::DiskBatched { batch_size: 2 }
    }
}

/// Ordered sub-clips plus the modes used to join them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionSequence {
    pub clips: Vec<SubClip>,
    pub concat_mode: ConcatMode,
    pub transition_mode: TransitionMode,
}

impl CompositionSequence {
    pub fn new(clips: Vec<SubClip>, concat_mode: ConcatMode, transition_mode: TransitionMode) -> Self {
        Self {
            clips,
            concat_mode,
            transition_mode,
        }
    }

    /// Total pre-transition duration.
    pub fn total_duration_secs(&self) -> f64 {
        self.clips.iter().map(|c| c.duration_secs).sum()
    }

    /// Whether any two neighbours share a clip key.
    pub fn has_adjacent_repeat(&self) -> bool {
        self.clips.windows(2).any(|w| w[0].key() == w[1].key())
    }
}
