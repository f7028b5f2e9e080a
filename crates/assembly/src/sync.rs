//! Audio-video synchronizer.
//!
//! Matches the combined video to the narration length and mixes in
//! optional background music.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, EncodeOptions, MediaId};
use reelcraft_common::error::{ReelcraftError, ReelcraftResult};
use reelcraft_model::{BgmSource, BgmSpec, Narration};

/// Fade-out applied to background music before looping.
pub const BGM_FADE_OUT_SECS: f64 = 3.0;

/// Durations below this difference are considered equal.
const DURATION_EPSILON: f64 = 1e-3;

/// How video and narration are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationPlan {
    /// Times the combined video is played back to back (1 = as is).
    pub repeat_times: u32,
    /// Video is cut to the narration length after repeating.
    pub truncate_video: bool,
    /// Final video duration.
    pub video_secs: f64,
    /// Narration is cut to the final video duration.
    pub truncate_narration: bool,
}

/// Plan the reconciliation of a `video_secs` video with `narration_secs`
/// of narration.
///
/// The video is first repeated `ceil(N / V)` times when shorter, then cut
/// to the narration length when longer. Only then is the narration compared
/// against the resulting video and cut if it is longer.
pub fn plan_durations(video_secs: f64, narration_secs: f64) -> DurationPlan {
    let repeat_times = if video_secs > 0.0 && video_secs + DURATION_EPSILON < narration_secs {
        (narration_secs / video_secs).ceil().max(1.0) as u32
    } else {
        1
    };
    let looped = video_secs * repeat_times as f64;
    let truncate_video = looped > narration_secs + DURATION_EPSILON;
    let video_secs = if truncate_video { narration_secs } else { looped };
    DurationPlan {
        repeat_times,
        truncate_video,
        video_secs,
        truncate_narration: narration_secs > video_secs + DURATION_EPSILON,
    }
}

/// Encoder settings for the synchronized output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncParams {
    pub threads: u32,
    pub fps: u32,
}

/// Reconciled composition, ready for overlays and the final encode.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedMedia {
    /// Video with the mixed audio attached.
    pub root: MediaId,
    pub duration_secs: f64,
    pub plan: DurationPlan,
    /// Background music actually mixed in.
    pub bgm: Option<PathBuf>,
}

/// Result of [`sync_to_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub plan: DurationPlan,
    pub bgm: Option<PathBuf>,
}

/// Pick the background music file for `spec`.
///
/// Random picks uniformly among the `*.mp3` files of the directory. An
/// explicit file that does not exist resolves to no music.
pub fn resolve_bgm<R: Rng + ?Sized>(spec: Option<&BgmSpec>, rng: &mut R) -> Option<PathBuf> {
    match &spec?.source {
        BgmSource::File { path } => {
            if path.is_file() {
                Some(path.clone())
            } else {
                tracing::warn!(path = %path.display(), "Background music file not found");
                None
            }
        }
        BgmSource::Random { dir } => {
            let mut songs: Vec<PathBuf> = match std::fs::read_dir(dir) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| {
                        p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Cannot read music directory");
                    return None;
                }
            };
            if songs.is_empty() {
                tracing::warn!(dir = %dir.display(), "No mp3 files in music directory");
                return None;
            }
            songs.sort();
            Some(songs.swap_remove(rng.gen_range(0..songs.len())))
        }
    }
}

/// Match `video_path` to the narration and attach the mixed audio.
///
/// Background music problems are logged and the narration is used alone.
/// On error every handle opened here is released.
pub fn reconcile<R: Rng + ?Sized>(
    codec: &mut Codec,
    video_path: &Path,
    narration: &Narration,
    bgm: Option<&BgmSpec>,
    rng: &mut R,
) -> ReelcraftResult<SyncedMedia> {
    let mut opened = Vec::with_capacity(2);
    let result = reconcile_opened(codec, video_path, narration, bgm, rng, &mut opened);
    if result.is_err() {
        for id in opened {
            codec.release(id);
        }
    }
    result
}

fn reconcile_opened<R: Rng + ?Sized>(
    codec: &mut Codec,
    video_path: &Path,
    narration: &Narration,
    bgm: Option<&BgmSpec>,
    rng: &mut R,
    opened: &mut Vec<MediaId>,
) -> ReelcraftResult<SyncedMedia> {
    let source = codec.open_video(video_path)?;
    opened.push(source);
    let mut video = codec.without_audio(source)?;
    let mut voice = codec
        .open_audio(&narration.path)
        .map_err(|e| ReelcraftError::audio(format!("narration unusable: {e}")))?;
    opened.push(voice);

    let video_secs = codec.info(video)?.duration_secs;
    let narration_secs = match narration.duration_secs {
        Some(secs) => secs,
        None => codec.info(voice)?.duration_secs,
    };
    if video_secs <= 0.0 || narration_secs <= 0.0 {
        return Err(ReelcraftError::audio(format!(
            "cannot sync {video_secs:.3}s of video with {narration_secs:.3}s of narration"
        )));
    }

    let plan = plan_durations(video_secs, narration_secs);
    if plan.repeat_times > 1 {
        tracing::warn!(
            video_secs,
            narration_secs,
            repeat_times = plan.repeat_times,
            "Video shorter than narration, looping video"
        );
        video = codec.repeat(video, plan.repeat_times)?;
    }
    if plan.truncate_video {
        video = codec.subclip(video, 0.0, narration_secs)?;
    }
    let final_secs = codec.info(video)?.duration_secs;
    if codec.info(voice)?.duration_secs > final_secs + DURATION_EPSILON {
        voice = codec.subclip(voice, 0.0, final_secs)?;
    }
    if (narration.volume - 1.0).abs() > f64::EPSILON {
        voice = codec.volume(voice, narration.volume)?;
    }

    let mut used_bgm = None;
    let mut audio = voice;
    if let Some(path) = resolve_bgm(bgm, rng) {
        let volume = bgm.map(|b| b.volume).unwrap_or(1.0);
        let mixed = match background_track(codec, &path, volume, final_secs) {
            Ok(music) => {
                let mixed = codec.mix_audio(&[voice, music]);
                if mixed.is_err() {
                    codec.release(music);
                }
                mixed
            }
            Err(e) => Err(e),
        };
        match mixed {
            Ok(mix) => {
                audio = mix;
                used_bgm = Some(path);
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to add background music, using narration only");
            }
        }
    }

    let root = codec.set_audio(video, audio)?;
    Ok(SyncedMedia {
        root,
        duration_secs: final_secs,
        plan,
        bgm: used_bgm,
    })
}

fn background_track(codec: &mut Codec, path: &Path, volume: f64, duration_secs: f64) -> ReelcraftResult<MediaId> {
    let song = codec.open_audio(path)?;
    let built = (|| -> ReelcraftResult<MediaId> {
        let scaled = codec.volume(song, volume)?;
        let faded = codec.audio_fade_out(scaled, BGM_FADE_OUT_SECS)?;
        codec.audio_loop(faded, duration_secs)
    })();
    if built.is_err() {
        codec.release(song);
    }
    built
}

/// Reconcile and encode straight to `output`.
pub fn sync_to_file<R: Rng + ?Sized>(
    codec: &mut Codec,
    video_path: &Path,
    narration: &Narration,
    bgm: Option<&BgmSpec>,
    output: &Path,
    params: &SyncParams,
    rng: &mut R,
) -> ReelcraftResult<SyncOutcome> {
    let synced = reconcile(codec, video_path, narration, bgm, rng)?;
    let options = EncodeOptions::final_output(params.threads, params.fps);
    let encoded = codec.encode(synced.root, output, &options);
    codec.release(synced.root);
    encoded?;
    Ok(SyncOutcome {
        path: output.to_path_buf(),
        duration_secs: synced.duration_secs,
        plan: synced.plan,
        bgm: synced.bgm,
    })
}
