//! Subtitle renderer: wraps cue phrases to the canvas and places them.
//!
//! Layout only. The positioned overlays are handed to the codec as text
//! layers of a composite and drawn during the final encode.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, MediaId, TextLayer};
use reelcraft_common::error::{ReelcraftError, ReelcraftResult};
use reelcraft_model::{CaptionPlacement, FontSpec, SubtitleCue};

/// Fraction of the canvas width captions may use.
pub const WIDTH_BUDGET_RATIO: f64 = 0.9;

/// Pixels kept clear of the canvas edge for custom placement.
pub const SAFETY_MARGIN_PX: f64 = 10.0;

/// Rendered ink size of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextSize {
    pub width: f64,
    pub height: f64,
}

/// Measures text as it will be drawn.
pub trait TextMeasure {
    fn measure(&self, text: &str) -> TextSize;
}

/// Glyph-accurate measurement with a TrueType/OpenType font.
pub struct FontMeasure {
    font: rusttype::Font<'static>,
    scale: rusttype::Scale,
}

impl FontMeasure {
    pub fn load(path: &Path, size: u32) -> ReelcraftResult<Self> {
        let data = std::fs::read(path).map_err(|e| {
            ReelcraftError::subtitle(format!("cannot read font {}: {e}", path.display()))
        })?;
        // Collections (.ttc) expose their first face.
        let font = rusttype::Font::try_from_vec_and_index(data, 0).ok_or_else(|| {
            ReelcraftError::subtitle(format!("{} is not a usable font", path.display()))
        })?;
        Ok(Self {
            font,
            scale: rusttype::Scale::uniform(size.max(1) as f32),
        })
    }

    pub fn from_spec(spec: &FontSpec) -> ReelcraftResult<Self> {
        Self::load(&spec.path, spec.size)
    }
}

impl TextMeasure for FontMeasure {
    fn measure(&self, text: &str) -> TextSize {
        let ascent = self.font.v_metrics(self.scale).ascent;
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for glyph in self.font.layout(text, self.scale, rusttype::point(0.0, ascent)) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                bounds = Some(match bounds {
                    None => (bb.min.x, bb.min.y, bb.max.x, bb.max.y),
                    Some((x0, y0, x1, y1)) => {
                        (x0.min(bb.min.x), y0.min(bb.min.y), x1.max(bb.max.x), y1.max(bb.max.y))
                    }
                });
            }
        }
        bounds
            .map(|(x0, y0, x1, y1)| TextSize {
                width: (x1 - x0) as f64,
                height: (y1 - y0) as f64,
            })
            .unwrap_or_default()
    }
}

/// Fixed advance per character. Useful for planning runs without a font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonospaceMeasure {
    pub char_width: f64,
    pub line_height: f64,
}

impl MonospaceMeasure {
    /// Rough metrics for a font of `size` pixels.
    pub fn for_size(size: u32) -> Self {
        Self {
            char_width: size as f64 * 0.6,
            line_height: size as f64,
        }
    }
}

impl TextMeasure for MonospaceMeasure {
    fn measure(&self, text: &str) -> TextSize {
        let chars = text.chars().count();
        if chars == 0 {
            return TextSize::default();
        }
        TextSize {
            width: chars as f64 * self.char_width,
            height: self.line_height,
        }
    }
}

/// A phrase broken into lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedText {
    /// Lines joined with `\n`.
    pub text: String,
    pub lines: usize,
    /// `lines` times the single-line height.
    pub height: f64,
    /// Widest line.
    pub width: f64,
}

/// Wrap `phrase` so each line fits `max_width`.
///
/// Words are packed greedily. When a word cannot fit even on a line of its
/// own, word wrapping is abandoned and the phrase is packed character by
/// character instead; a single character wider than the budget still gets a
/// line to itself.
pub fn wrap_text(phrase: &str, max_width: f64, measure: &dyn TextMeasure) -> WrappedText {
    let full = measure.measure(phrase.trim());
    let line_height = full.height;
    if full.width <= max_width {
        return WrappedText {
            text: phrase.to_string(),
            lines: 1,
            height: line_height,
            width: full.width,
        };
    }

    let lines = wrap_words(phrase, max_width, measure)
        .unwrap_or_else(|| wrap_chars(phrase, max_width, measure));
    let width = lines
        .iter()
        .map(|l| measure.measure(l).width)
        .fold(0.0, f64::max);
    WrappedText {
        text: lines.join("\n"),
        lines: lines.len(),
        height: lines.len() as f64 * line_height,
        width,
    }
}

fn wrap_words(phrase: &str, max_width: f64, measure: &dyn TextMeasure) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in phrase.split(' ').filter(|w| !w.is_empty()) {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure.measure(&candidate).width <= max_width {
            current = candidate;
            continue;
        }
        if current.is_empty() || measure.measure(word).width > max_width {
            tracing::trace!(word, "Word wider than the budget, wrapping by character");
            return None;
        }
        lines.push(std::mem::replace(&mut current, word.to_string()));
    }
    if !current.is_empty() {
        lines.push(current);
    }
    Some(lines)
}

fn wrap_chars(phrase: &str, max_width: f64, measure: &dyn TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for ch in phrase.trim().chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if current.is_empty() || measure.measure(candidate.trim()).width <= max_width {
            current = candidate;
        } else {
            lines.push(current);
            current = ch.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Top-left corner of a `box_w x box_h` overlay on the canvas. Every
/// placement centers horizontally.
pub fn resolve_position(
    placement: CaptionPlacement,
    canvas_w: f64,
    canvas_h: f64,
    box_w: f64,
    box_h: f64,
) -> (f64, f64) {
    let x = (canvas_w - box_w) / 2.0;
    let y = match placement {
        CaptionPlacement::Bottom => canvas_h * 0.95 - box_h,
        CaptionPlacement::Top => canvas_h * 0.05,
        CaptionPlacement::Center => (canvas_h - box_h) / 2.0,
        CaptionPlacement::Custom(percent) => {
            let wanted = (canvas_h - box_h) * percent / 100.0;
            wanted
                .min(canvas_h - box_h - SAFETY_MARGIN_PX)
                .max(SAFETY_MARGIN_PX)
        }
    };
    (x, y)
}

/// A wrapped, positioned caption with its active window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedOverlay {
    pub text: String,
    pub lines: usize,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl PositionedOverlay {
    /// Visible over `[start_secs, end_secs)`.
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.start_secs && t < self.end_secs
    }

    pub fn to_text_layer(&self, font: &FontSpec) -> TextLayer {
        TextLayer {
            text: self.text.clone(),
            font_path: font.path.clone(),
            font_size: font.size,
            color: font.fore_color.clone(),
            stroke_color: font.stroke_color.clone(),
            stroke_width: font.stroke_width,
            box_color: font.background_color.clone(),
            x: self.x,
            y: self.y,
            start_secs: self.start_secs,
            end_secs: self.end_secs,
        }
    }
}

/// Lay out every cue on a `canvas_w x canvas_h` canvas.
pub fn render(
    cues: &[SubtitleCue],
    canvas_w: u32,
    canvas_h: u32,
    placement: CaptionPlacement,
    measure: &dyn TextMeasure,
) -> Vec<PositionedOverlay> {
    let (w, h) = (canvas_w as f64, canvas_h as f64);
    let budget = w * WIDTH_BUDGET_RATIO;
    cues.iter()
        .filter(|cue| !cue.phrase.trim().is_empty())
        .map(|cue| {
            let wrapped = wrap_text(&cue.phrase, budget, measure);
            let (x, y) = resolve_position(placement, w, h, wrapped.width, wrapped.height);
            PositionedOverlay {
                text: wrapped.text,
                lines: wrapped.lines,
                width: wrapped.width,
                height: wrapped.height,
                x,
                y,
                start_secs: cue.start_secs,
                end_secs: cue.end_secs,
            }
        })
        .collect()
}

/// Composite `overlays` over `base`. Returns `base` when there is nothing
/// to draw.
pub fn burn_overlays(
    codec: &mut Codec,
    base: MediaId,
    overlays: &[PositionedOverlay],
    font: &FontSpec,
) -> ReelcraftResult<MediaId> {
    if overlays.is_empty() {
        return Ok(base);
    }
    let layers = overlays.iter().map(|o| o.to_text_layer(font)).collect();
    codec.composite(base, Vec::new(), layers)
}
