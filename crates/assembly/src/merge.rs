//! Batch merge engine.
//!
//! Concatenates ordered sub-clips into one artifact. The default strategy
//! grows an on-disk base a few clips at a time: each step opens the base plus
//! the next batch, applies a join transition to each new clip, re-encodes to
//! `temp_merged_next.mp4`, releases everything and swaps the new file in as
//! the base. Peak memory is bounded by the batch size, not the clip count.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, EncodeOptions, MediaId};
use reelcraft_common::error::{ReelcraftError, ReelcraftResult};
use reelcraft_model::{AssemblyParams, MergeStrategy, SubClip, TransitionMode};

use crate::transition::{Transition, TRANSITION_SECS};

pub const MERGED_BASE_NAME: &str = "temp_merged.mp4";
pub const MERGED_NEXT_NAME: &str = "temp_merged_next.mp4";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeParams {
    pub transition_mode: TransitionMode,
    pub strategy: MergeStrategy,
    pub threads: u32,
    pub fps: u32,
}

impl MergeParams {
    pub fn from_job(params: &AssemblyParams) -> Self {
        Self {
            transition_mode: params.transition_mode,
            strategy: params.merge_strategy,
            threads: params.threads,
            fps: params.fps,
        }
    }
}

/// The accumulated artifact between batches.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeState {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Counters reported for one merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub batches_merged: usize,
    pub batches_failed: usize,
    /// Clips lost with failed batches.
    pub clips_dropped: usize,
    /// Transition applied at each successful join, in order.
    pub transitions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub summary: MergeSummary,
}

/// Merge `clips` into `output`.
///
/// A single clip is copied without re-encoding. Under the disk-batched
/// strategy a failed batch is logged and skipped, and its clips are missing
/// from the result; the call still succeeds as long as the first clip could
/// seed the base.
pub fn merge<R: Rng + ?Sized>(
    codec: &mut Codec,
    clips: &[SubClip],
    params: &MergeParams,
    work_dir: &Path,
    output: &Path,
    rng: &mut R,
) -> ReelcraftResult<MergeOutcome> {
    let first = clips
        .first()
        .ok_or_else(|| ReelcraftError::merge("no sub-clips to merge"))?;

    if clips.len() == 1 {
        tracing::info!("Only one clip, copying it as the combined video");
        std::fs::copy(first.media_path(), output)?;
        return Ok(MergeOutcome {
            path: output.to_path_buf(),
            duration_secs: first.duration_secs,
            summary: MergeSummary::default(),
        });
    }

    match params.strategy {
        MergeStrategy::DiskBatched { batch_size } => {
            merge_batched(codec, clips, params, batch_size.max(1), work_dir, output, rng)
        }
        MergeStrategy::SingleShot => merge_single_shot(codec, clips, params, output, rng),
    }
}

fn merge_batched<R: Rng + ?Sized>(
    codec: &mut Codec,
    clips: &[SubClip],
    params: &MergeParams,
    batch_size: usize,
    work_dir: &Path,
    output: &Path,
    rng: &mut R,
) -> ReelcraftResult<MergeOutcome> {
    std::fs::create_dir_all(work_dir)?;
    let next_path = work_dir.join(MERGED_NEXT_NAME);
    let mut state = MergeState {
        path: work_dir.join(MERGED_BASE_NAME),
        duration_secs: clips[0].duration_secs,
    };
    std::fs::copy(clips[0].media_path(), &state.path)
        .map_err(|e| ReelcraftError::merge(format!("failed to seed merge base: {e}")))?;

    let mut summary = MergeSummary::default();
    let total = clips.len() - 1;
    for (n, batch) in clips[1..].chunks(batch_size).enumerate() {
        let from = 1 + n * batch_size;
        tracing::info!(from, total, "Merging clips");

        // Renaming over the base replaces it in one step, so the old base
        // survives a failed swap.
        let merged = merge_batch(codec, &state, batch, params, &next_path, rng).and_then(|outcome| {
            std::fs::rename(&next_path, &state.path)
                .map(|()| outcome)
                .map_err(|e| ReelcraftError::merge(format!("failed to replace merge base: {e}")))
        });
        match merged {
            Ok((duration_secs, transitions)) => {
                state.duration_secs = duration_secs;
                summary.batches_merged += 1;
                summary.transitions.extend(transitions);
            }
            Err(e) => {
                tracing::error!(from, clips = batch.len(), error = %e, "Failed to merge batch, dropping its clips");
                summary.batches_failed += 1;
                summary.clips_dropped += batch.len();
                discard_next(&next_path);
            }
        }
    }

    move_file(&state.path, output)?;
    tracing::info!(
        merged = summary.batches_merged,
        failed = summary.batches_failed,
        duration_secs = state.duration_secs,
        "Clips merged"
    );
    Ok(MergeOutcome {
        path: output.to_path_buf(),
        duration_secs: state.duration_secs,
        summary,
    })
}

/// Open base + batch, transition the new clips, concat and encode to
/// `next_path`. Every handle is released before returning.
fn merge_batch<R: Rng + ?Sized>(
    codec: &mut Codec,
    state: &MergeState,
    batch: &[SubClip],
    params: &MergeParams,
    next_path: &Path,
    rng: &mut R,
) -> ReelcraftResult<(f64, Vec<String>)> {
    let (root, transitions) = compose_joined(codec, &state.path, batch, params.transition_mode, rng)?;
    let duration = encode_joined(codec, root, next_path, params)?;
    Ok((duration, transitions))
}

fn merge_single_shot<R: Rng + ?Sized>(
    codec: &mut Codec,
    clips: &[SubClip],
    params: &MergeParams,
    output: &Path,
    rng: &mut R,
) -> ReelcraftResult<MergeOutcome> {
    let result = compose_joined(codec, clips[0].media_path(), &clips[1..], params.transition_mode, rng)
        .and_then(|(root, transitions)| {
            encode_joined(codec, root, output, params).map(|duration| (duration, transitions))
        });
    match result {
        Ok((duration_secs, transitions)) => Ok(MergeOutcome {
            path: output.to_path_buf(),
            duration_secs,
            summary: MergeSummary {
                batches_merged: 1,
                transitions,
                ..MergeSummary::default()
            },
        }),
        Err(e) => Err(ReelcraftError::merge(format!("single-shot merge failed: {e}"))),
    }
}

/// Encode `root` to `output` and release it; returns the encoded duration.
fn encode_joined(codec: &mut Codec, root: MediaId, output: &Path, params: &MergeParams) -> ReelcraftResult<f64> {
    let options = EncodeOptions::intermediate(params.threads, params.fps);
    let encoded = codec
        .encode(root, output, &options)
        .and_then(|()| codec.info(root))
        .map(|info| info.duration_secs);
    codec.release(root);
    encoded
}

/// Concat `base` with `clips`, applying a sampled transition to each clip.
/// On failure every handle opened so far is released.
fn compose_joined<R: Rng + ?Sized>(
    codec: &mut Codec,
    base: &Path,
    clips: &[SubClip],
    mode: TransitionMode,
    rng: &mut R,
) -> ReelcraftResult<(MediaId, Vec<String>)> {
    let mut opened = Vec::with_capacity(clips.len() + 1);
    let result = join_parts(codec, base, clips, mode, rng, &mut opened);
    if result.is_err() {
        for id in opened {
            codec.release(id);
        }
    }
    result
}

fn join_parts<R: Rng + ?Sized>(
    codec: &mut Codec,
    base: &Path,
    clips: &[SubClip],
    mode: TransitionMode,
    rng: &mut R,
    opened: &mut Vec<MediaId>,
) -> ReelcraftResult<(MediaId, Vec<String>)> {
    let base = codec.open_video(base)?;
    opened.push(base);
    let mut parts = vec![base];
    let mut applied = Vec::new();
    for clip in clips {
        let id = codec.open_video(clip.media_path())?;
        opened.push(id);
        let transition = Transition::sample(mode, rng);
        parts.push(transition.apply(codec, id, TRANSITION_SECS)?);
        if !transition.is_none() {
            applied.push(transition.to_string());
        }
    }
    let joined = codec.concat(&parts)?;
    Ok((joined, applied))
}

fn discard_next(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial merge output");
        }
    }
}

/// Rename, falling back to copy + delete across filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reelcraft_codec::{
        read_manifest, write_manifest, CodecBackend, ManifestBackend, ManifestSegment, MediaGraph, MediaInfo,
        MediaManifest, MediaReader, SourceKind,
    };

    /// Reports success for encode number `vanish_on` but leaves no file.
    struct VanishingOutput {
        inner: ManifestBackend,
        vanish_on: usize,
        encodes: usize,
    }

    impl CodecBackend for VanishingOutput {
        fn name(&self) -> &str {
            "vanishing"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn probe(&mut self, path: &Path, kind: SourceKind) -> ReelcraftResult<MediaInfo> {
            self.inner.probe(path, kind)
        }

        fn open_reader(&mut self, path: &Path) -> ReelcraftResult<Box<dyn MediaReader>> {
            self.inner.open_reader(path)
        }

        fn encode(
            &mut self,
            graph: &MediaGraph,
            root: MediaId,
            output: &Path,
            options: &EncodeOptions,
        ) -> ReelcraftResult<()> {
            self.inner.encode(graph, root, output, options)?;
            self.encodes += 1;
            if self.encodes == self.vanish_on {
                std::fs::remove_file(output)?;
            }
            Ok(())
        }
    }

    /// Normalized clips whose manifests point back at their source footage.
    fn clips(dir: &Path, durations: &[f64]) -> Vec<SubClip> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let path = dir.join(format!("clip_{i}_0.mp4"));
                let source = PathBuf::from(format!("source_{i}.mp4"));
                let mut manifest = MediaManifest::video(d, 1080, 1920);
                manifest.segments.push(ManifestSegment {
                    source: source.clone(),
                    start_secs: 0.0,
                    end_secs: d,
                });
                write_manifest(&path, &manifest).unwrap();
                SubClip::new(source, 0.0, d, 1080, 607)
                    .unwrap()
                    .materialized(path)
            })
            .collect()
    }

    fn params(mode: TransitionMode, strategy: MergeStrategy) -> MergeParams {
        MergeParams {
            transition_mode: mode,
            strategy,
            threads: 1,
            fps: 30,
        }
    }

    fn codec() -> Codec {
        Codec::new(Box::new(ManifestBackend::new()))
    }

    #[test]
    fn test_single_clip_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[3.0]);
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = merge(
            &mut codec(),
            &clips,
            &params(TransitionMode::FadeIn, MergeStrategy::default()),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary, MergeSummary::default());
        assert_eq!(
            std::fs::read(&out).unwrap(),
            std::fs::read(clips[0].media_path()).unwrap()
        );
    }

    #[test]
    fn test_batches_of_two_merge_everything() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[5.0, 5.0, 1.0, 5.0, 2.0]);
        let work = dir.path().join("temp_clips");
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(0);
        let mut codec = codec();

        let outcome = merge(
            &mut codec,
            &clips,
            &params(TransitionMode::None, MergeStrategy::DiskBatched { batch_size: 2 }),
            &work,
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.batches_merged, 2);
        assert!((outcome.duration_secs - 18.0).abs() < 1e-9);

        let manifest = read_manifest(&out).unwrap();
        let order: Vec<PathBuf> = manifest.segments.iter().map(|s| s.source.clone()).collect();
        let expected: Vec<PathBuf> = clips.iter().map(|c| c.source.clone()).collect();
        assert_eq!(order, expected);
        assert!(!work.join(MERGED_BASE_NAME).exists());
        assert!(!work.join(MERGED_NEXT_NAME).exists());
        assert_eq!(codec.graph().open_reader_count(), 0);
    }

    #[test]
    fn test_failed_batch_drops_its_clips() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        std::fs::remove_file(clips[3].media_path()).unwrap();
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(0);
        let mut codec = codec();

        let outcome = merge(
            &mut codec,
            &clips,
            &params(TransitionMode::None, MergeStrategy::DiskBatched { batch_size: 2 }),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.batches_merged, 1);
        assert_eq!(outcome.summary.batches_failed, 1);
        assert_eq!(outcome.summary.clips_dropped, 2);
        assert!((outcome.duration_secs - 6.0).abs() < 1e-9);
        assert_eq!(read_manifest(&out).unwrap().segments.len(), 3);
        assert_eq!(codec.graph().open_reader_count(), 0);
    }

    #[test]
    fn test_failed_base_swap_skips_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(0);
        let backend = VanishingOutput {
            inner: ManifestBackend::new(),
            vanish_on: 2,
            encodes: 0,
        };
        let mut codec = Codec::new(Box::new(backend));

        let outcome = merge(
            &mut codec,
            &clips,
            &params(TransitionMode::None, MergeStrategy::DiskBatched { batch_size: 2 }),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.batches_merged, 1);
        assert_eq!(outcome.summary.batches_failed, 1);
        assert_eq!(outcome.summary.clips_dropped, 2);
        assert!((outcome.duration_secs - 6.0).abs() < 1e-9);
        assert_eq!(read_manifest(&out).unwrap().segments.len(), 3);
        assert_eq!(codec.graph().open_reader_count(), 0);
    }

    #[test]
    fn test_all_batches_failing_leaves_the_seed() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[4.0, 2.0, 3.0]);
        std::fs::remove_file(clips[1].media_path()).unwrap();
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = merge(
            &mut codec(),
            &clips,
            &params(TransitionMode::None, MergeStrategy::DiskBatched { batch_size: 2 }),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.batches_merged, 0);
        assert!((outcome.duration_secs - 4.0).abs() < 1e-9);
        assert!(out.exists());
    }

    #[test]
    fn test_transitions_apply_to_new_clips_only() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[2.0, 2.0, 2.0, 2.0]);
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(9);

        let outcome = merge(
            &mut codec(),
            &clips,
            &params(TransitionMode::FadeIn, MergeStrategy::DiskBatched { batch_size: 2 }),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.transitions, vec!["fade-in"; 3]);
        assert_eq!(read_manifest(&out).unwrap().transitions.len(), 3);
    }

    #[test]
    fn test_single_shot_encodes_once() {
        let dir = tempfile::tempdir().unwrap();
        let clips = clips(dir.path(), &[2.0, 3.0, 4.0]);
        let out = dir.path().join("combined.mp4");
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = merge(
            &mut codec(),
            &clips,
            &params(TransitionMode::Shuffle, MergeStrategy::SingleShot),
            dir.path(),
            &out,
            &mut rng,
        )
        .unwrap();
        assert_eq!(outcome.summary.batches_merged, 1);
        assert_eq!(outcome.summary.transitions.len(), 2);
        assert!((outcome.duration_secs - 9.0).abs() < 1e-9);
        assert!(!dir.path().join(MERGED_BASE_NAME).exists());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = merge(
            &mut codec(),
            &[],
            &params(TransitionMode::None, MergeStrategy::default()),
            dir.path(),
            &dir.path().join("combined.mp4"),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, ReelcraftError::Merge { .. }));
    }
}
