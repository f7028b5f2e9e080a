//! Caption cues, placement policy, and SRT cue-file parsing.
//!
//! Cues are produced by the external voice engine as an SRT file. They are
//! parsed once, turned into positioned overlays, and discarded.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A caption shown over `[start_secs, end_secs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start_secs: f64,
    pub end_secs: f64,
    pub phrase: String,
}

impl SubtitleCue {
    pub fn new(start_secs: f64, end_secs: f64, phrase: impl Into<String>) -> Result<Self, ModelError> {
        if !(start_secs >= 0.0 && end_secs > start_secs) {
            return Err(ModelError::InvalidCue {
                message: format!("interval [{start_secs:.3}, {end_secs:.3}) is empty or negative"),
            });
        }
        Ok(Self {
            start_secs,
            end_secs,
            phrase: phrase.into(),
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Half-open containment: visible at `start`, hidden at `end`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && t < self.end_secs
    }
}

/// Vertical placement policy for caption overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "percent", rename_all = "lowercase")]
pub enum CaptionPlacement {
    #[default]
    Bottom,
    Top,
    Center,
    /// Percentage of the free vertical space above the overlay.
    Custom(f64),
}

impl FromStr for CaptionPlacement {
    type Err = ModelError;

    /// Accepts `bottom`, `top`, `center`, `custom:<percent>` or `<percent>%`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let unknown = || ModelError::UnknownVariant {
            kind: "caption placement",
            value: s.clone(),
        };
        match s.as_str() {
            "bottom" => Ok(Self::Bottom),
            "top" => Ok(Self::Top),
            "center" | "centre" => Ok(Self::Center),
            other => {
                let raw = other
                    .strip_prefix("custom:")
                    .or_else(|| other.strip_suffix('%'))
                    .ok_or_else(unknown)?;
                raw.trim().parse::<f64>().map(Self::Custom).map_err(|_| unknown())
            }
        }
    }
}

/// Font and colors used to draw captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    /// TrueType/OpenType font file.
    pub path: PathBuf,

    /// Font size in pixels.
    pub size: u32,

    /// Text color (`#RRGGBB` or a named color).
    pub fore_color: String,

    /// Outline color.
    pub stroke_color: String,

    /// Outline width in pixels.
    pub stroke_width: u32,

    /// Box color behind the text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl FontSpec {
    pub fn new(path: impl Into<PathBuf>, size: u32) -> Self {
        Self {
            path: path.into(),
            size,
            fore_color: "#FFFFFF".to_string(),
            stroke_color: "#000000".to_string(),
            stroke_width: 1,
            background_color: None,
        }
    }
}

/// Parse SRT content into cues. Malformed blocks are skipped with a warning.
pub fn parse_srt(content: &str) -> Vec<SubtitleCue> {
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let normalized = normalized.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();

    for (index, block) in normalized.split("\n\n").enumerate() {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }

        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            tracing::warn!(block = index, "SRT block has no timing line, skipping");
            continue;
        };

        let Some((start, end)) = parse_timing_line(lines[timing_idx]) else {
            tracing::warn!(block = index, line = lines[timing_idx], "Unparseable SRT timing, skipping");
            continue;
        };

        let phrase = lines[timing_idx + 1..].join(" ");
        if phrase.is_empty() {
            continue;
        }

        match SubtitleCue::new(start, end, phrase) {
            Ok(cue) => cues.push(cue),
            Err(e) => tracing::warn!(block = index, error = %e, "Invalid SRT cue, skipping"),
        }
    }

    cues
}

/// Read and parse an SRT file.
pub fn load_srt(path: &Path) -> Result<Vec<SubtitleCue>, ModelError> {
    let content = std::fs::read_to_string(path).map_err(|source| ModelError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_srt(&content))
}

fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.split_once("-->")?;
    // Position hints may follow the end timestamp.
    let end = end.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.replace(',', ".");
    let parts: Vec<&str> = raw.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(h * 3600.0 + m * 60.0 + s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\r\n00:00:00,000 --> 00:00:02,500\r\nHello world\r\n\r\n2\r\n00:00:03,000 --> 00:00:05,000\r\nThis is\r\na test\r\n\r\n";

    #[test]
    fn test_parse_srt_basic() {
        let cues = parse_srt(SAMPLE);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].phrase, "Hello world");
        assert!((cues[0].end_secs - 2.5).abs() < 1e-9);
        assert_eq!(cues[1].phrase, "This is a test");
        assert!((cues[1].start_secs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_srt_skips_malformed_blocks() {
        let content = "1\nnot a timing\nText\n\n2\n00:01:01.500 --> 00:01:03.000 X1:10\nOne minute in\n\n3\n00:00:05,000 --> 00:00:04,000\nBackwards\n";
        let cues = parse_srt(content);
        assert_eq!(cues.len(), 1);
        assert!((cues[0].start_secs - 61.5).abs() < 1e-9);
    }

    #[test]
    fn test_cue_interval_is_half_open() {
        let cue = SubtitleCue::new(1.0, 2.0, "x").unwrap();
        assert!(cue.contains(1.0));
        assert!(cue.contains(1.999));
        assert!(!cue.contains(2.0));
        assert!(!cue.contains(0.5));
    }

    #[test]
    fn test_placement_parsing() {
        assert_eq!("Bottom".parse::<CaptionPlacement>().unwrap(), CaptionPlacement::Bottom);
        assert_eq!("custom:70".parse::<CaptionPlacement>().unwrap(), CaptionPlacement::Custom(70.0));
        assert_eq!("35%".parse::<CaptionPlacement>().unwrap(), CaptionPlacement::Custom(35.0));
        assert!("left".parse::<CaptionPlacement>().is_err());
    }

    #[test]
    fn test_placement_serde_shape() {
        let json = serde_json::to_string(&CaptionPlacement::Custom(70.0)).unwrap();
        assert_eq!(json, r#"{"kind":"custom","percent":70.0}"#);
        let parsed: CaptionPlacement = serde_json::from_str(r#"{"kind":"top"}"#).unwrap();
        assert_eq!(parsed, CaptionPlacement::Top);
    }
}
