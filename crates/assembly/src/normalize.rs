//! Clip normalizer.
//!
//! Fits every source material into the target canvas (letterboxed on
//! black), cuts it into bounded-duration sub-clips and writes each sub-clip
//! to the work directory straight away, so at most one segment is held
//! open at a time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, EncodeOptions, MediaId};
use reelcraft_common::error::{ReelcraftError, ReelcraftResult};
use reelcraft_model::{AssemblyParams, ConcatMode, SourceMaterial, SubClip};

/// Zoom growth per second of still-image duration.
pub const IMAGE_ZOOM_PER_SEC: f64 = 0.03;

/// Remainders shorter than this are treated as rounding noise.
const SEGMENT_EPSILON: f64 = 1e-6;

/// Inputs the normalizer needs from the job.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeParams {
    pub target_width: u32,
    pub target_height: u32,
    pub max_clip_secs: f64,
    pub image_clip_secs: f64,
    pub min_source_px: u32,
    pub concat_mode: ConcatMode,
    pub threads: u32,
    pub fps: u32,
}

impl NormalizeParams {
    pub fn from_job(params: &AssemblyParams) -> Self {
        let (target_width, target_height) = params.aspect.resolution();
        Self {
            target_width,
            target_height,
            max_clip_secs: params.max_clip_secs,
            image_clip_secs: params.image_clip_secs,
            min_source_px: params.min_source_px,
            concat_mode: params.concat_mode,
            threads: params.threads,
            fps: params.fps,
        }
    }
}

/// A material that produced no sub-clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedMaterial {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of normalizing a whole material list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub clips: Vec<SubClip>,
    pub skipped: Vec<SkippedMaterial>,
}

impl NormalizeOutcome {
    pub fn total_duration_secs(&self) -> f64 {
        self.clips.iter().map(|c| c.duration_secs).sum()
    }
}

/// Scaled size of a `src_w x src_h` frame fit inside `target_w x target_h`
/// with its aspect ratio preserved.
///
/// Wider-than-target sources pin the width, everything else pins the
/// height. The free dimension is rounded down and never exceeds its target.
pub fn letterbox_fit(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let (sw, sh) = (src_w.max(1) as u64, src_h.max(1) as u64);
    let (tw, th) = (target_w as u64, target_h as u64);
    if sw * th > tw * sh {
        let h = (sh * tw / sw).clamp(1, th);
        (target_w, h as u32)
    } else {
        let w = (sw * th / sh).clamp(1, tw);
        (w as u32, target_h)
    }
}

/// `[start, end)` bounds cutting `duration_secs` into pieces of at most
/// `max_clip_secs`; the last piece takes the remainder. `first_only` keeps
/// just the first piece.
pub fn segment_bounds(duration_secs: f64, max_clip_secs: f64, first_only: bool) -> Vec<(f64, f64)> {
    if duration_secs.is_nan() || duration_secs <= SEGMENT_EPSILON {
        return Vec::new();
    }
    if max_clip_secs.is_nan() || max_clip_secs <= 0.0 {
        return vec![(0.0, duration_secs)];
    }
    let count = ((duration_secs / max_clip_secs) - SEGMENT_EPSILON).ceil().max(1.0) as usize;
    let bounds = (0..count).map(|i| {
        let start = i as f64 * max_clip_secs;
        // The last piece absorbs rounding noise so the pieces sum to the duration.
        let end = if i + 1 == count {
            duration_secs
        } else {
            ((i + 1) as f64 * max_clip_secs).min(duration_secs)
        };
        (start, end)
    });
    if first_only {
        bounds.take(1).collect()
    } else {
        bounds.collect()
    }
}

/// Normalize one material into materialized sub-clips.
///
/// `index` disambiguates artifact names between materials. On any write
/// failure the files already written for this material are removed and the
/// error is returned.
pub fn normalize(
    codec: &mut Codec,
    material: &SourceMaterial,
    params: &NormalizeParams,
    work_dir: &Path,
    index: usize,
) -> ReelcraftResult<Vec<SubClip>> {
    if params.target_width == 0 || params.target_height == 0 {
        return Err(ReelcraftError::material("target canvas has zero size"));
    }

    // Pre-probed geometry rejects small sources without opening them.
    if let Some(native) = material.native {
        check_resolution(material, native.width, native.height, params)?;
    }

    let (probe, is_image) = open_material(codec, material, params)?;
    let info = codec.info(probe)?;
    codec.release(probe);
    check_resolution(material, info.width, info.height, params)?;

    let (fit_w, fit_h) = letterbox_fit(info.width, info.height, params.target_width, params.target_height);
    let options = EncodeOptions::intermediate(params.threads, params.fps);

    let bounds = if is_image {
        vec![(0.0, params.image_clip_secs)]
    } else {
        segment_bounds(
            info.duration_secs,
            params.max_clip_secs,
            params.concat_mode == ConcatMode::Sequential,
        )
    };

    let mut clips: Vec<SubClip> = Vec::with_capacity(bounds.len());
    for (start, end) in bounds {
        let artifact = work_dir.join(format!("clip_{index}_{}.mp4", (start * 1000.0).round() as u64));
        let written = if is_image {
            write_image_segment(codec, material, params, (fit_w, fit_h), &artifact, &options)
        } else {
            write_video_segment(codec, material, params, (start, end), (fit_w, fit_h), &artifact, &options)
        };

        if let Err(e) = written {
            discard(&clips, &artifact);
            return Err(ReelcraftError::material(format!(
                "failed to write segment at {start:.3}s: {e}"
            )));
        }

        let clip = if is_image {
            SubClip::with_duration(&material.path, 0.0, end - start, fit_w, fit_h)
        } else {
            SubClip::new(&material.path, start, end, fit_w, fit_h)
        };
        match clip {
            Ok(clip) => clips.push(clip.materialized(artifact)),
            Err(e) => {
                discard(&clips, &artifact);
                return Err(e.into());
            }
        }
    }

    tracing::debug!(
        material = %material.path.display(),
        clips = clips.len(),
        fit_width = fit_w,
        fit_height = fit_h,
        "Normalized material"
    );
    Ok(clips)
}

/// Normalize every material, skipping the ones that fail.
///
/// Fails only when no material yields a sub-clip.
pub fn normalize_all(
    codec: &mut Codec,
    materials: &[SourceMaterial],
    params: &NormalizeParams,
    work_dir: &Path,
) -> ReelcraftResult<NormalizeOutcome> {
    std::fs::create_dir_all(work_dir)?;
    let mut outcome = NormalizeOutcome::default();

    for (index, material) in materials.iter().enumerate() {
        match normalize(codec, material, params, work_dir, index) {
            Ok(clips) => outcome.clips.extend(clips),
            Err(e) => {
                tracing::error!(material = %material.path.display(), error = %e, "Failed to process material");
                outcome.skipped.push(SkippedMaterial {
                    path: material.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if outcome.clips.is_empty() {
        return Err(ReelcraftError::no_materials(format!(
            "{} material(s) given, none could be normalized",
            materials.len()
        )));
    }

    tracing::info!(
        clips = outcome.clips.len(),
        skipped = outcome.skipped.len(),
        duration_secs = outcome.total_duration_secs(),
        "Materials normalized"
    );
    Ok(outcome)
}

fn check_resolution(
    material: &SourceMaterial,
    width: u32,
    height: u32,
    params: &NormalizeParams,
) -> ReelcraftResult<()> {
    if width >= params.min_source_px && height >= params.min_source_px {
        return Ok(());
    }
    tracing::warn!(
        material = %material.path.display(),
        width,
        height,
        min = params.min_source_px,
        "Low resolution material skipped"
    );
    Err(ReelcraftError::material(format!(
        "low resolution {width}x{height}, minimum {min}x{min} required",
        min = params.min_source_px
    )))
}

/// Open `material`, falling back to a still image when it does not open
/// as video.
fn open_material(
    codec: &mut Codec,
    material: &SourceMaterial,
    params: &NormalizeParams,
) -> ReelcraftResult<(MediaId, bool)> {
    if !material.is_image() {
        match codec.open_video(&material.path) {
            Ok(id) => return Ok((id, false)),
            Err(e) => {
                tracing::debug!(
                    material = %material.path.display(),
                    error = %e,
                    "Video open failed, retrying as still image"
                );
            }
        }
    }
    let id = codec
        .open_image(&material.path, params.image_clip_secs)
        .map_err(|e| ReelcraftError::material(format!("unreadable material: {e}")))?;
    Ok((id, true))
}

fn write_video_segment(
    codec: &mut Codec,
    material: &SourceMaterial,
    params: &NormalizeParams,
    (start, end): (f64, f64),
    (fit_w, fit_h): (u32, u32),
    artifact: &Path,
    options: &EncodeOptions,
) -> ReelcraftResult<()> {
    let source = codec.open_video(&material.path)?;
    let composed = compose_video_segment(codec, source, params, (start, end), (fit_w, fit_h));
    encode_and_release(codec, source, composed, artifact, options)
}

fn write_image_segment(
    codec: &mut Codec,
    material: &SourceMaterial,
    params: &NormalizeParams,
    (fit_w, fit_h): (u32, u32),
    artifact: &Path,
    options: &EncodeOptions,
) -> ReelcraftResult<()> {
    let duration = params.image_clip_secs;
    let source = codec.open_image(&material.path, duration)?;
    let composed = compose_image_segment(codec, source, params, (fit_w, fit_h));
    encode_and_release(codec, source, composed, artifact, options)
}

/// Encode `composed` and release it together with `source`, whether or not
/// composing or encoding succeeded.
fn encode_and_release(
    codec: &mut Codec,
    source: MediaId,
    composed: ReelcraftResult<MediaId>,
    artifact: &Path,
    options: &EncodeOptions,
) -> ReelcraftResult<()> {
    match composed {
        Ok(root) => {
            let encoded = codec.encode(root, artifact, options);
            codec.release(root);
            encoded
        }
        Err(e) => {
            codec.release(source);
            Err(e)
        }
    }
}

fn compose_video_segment(
    codec: &mut Codec,
    source: MediaId,
    params: &NormalizeParams,
    (start, end): (f64, f64),
    (fit_w, fit_h): (u32, u32),
) -> ReelcraftResult<MediaId> {
    let cut = codec.subclip(source, start, end)?;
    let silent = codec.without_audio(cut)?;
    let scaled = codec.resize(silent, fit_w, fit_h)?;
    codec.letterbox(scaled, params.target_width, params.target_height)
}

fn compose_image_segment(
    codec: &mut Codec,
    source: MediaId,
    params: &NormalizeParams,
    (fit_w, fit_h): (u32, u32),
) -> ReelcraftResult<MediaId> {
    let scaled = codec.resize(source, fit_w, fit_h)?;
    let zoomed = codec.zoom(scaled, 1.0 + IMAGE_ZOOM_PER_SEC * params.image_clip_secs)?;
    codec.letterbox(zoomed, params.target_width, params.target_height)
}

fn discard(written: &[SubClip], partial: &Path) {
    let paths = written
        .iter()
        .filter_map(|c| c.artifact.as_deref())
        .chain(std::iter::once(partial));
    for path in paths {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete partial clip");
            }
        }
    }
}
