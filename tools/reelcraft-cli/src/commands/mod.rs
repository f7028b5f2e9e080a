pub mod assemble;
pub mod check;
pub mod config;
pub mod sync;
pub mod wrap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use reelcraft_codec::{Codec, FfmpegBackend, ManifestBackend};

/// Codec for a run. Dry runs read and write JSON manifests instead of media.
pub(crate) fn open_codec(dry_run: bool) -> anyhow::Result<Codec> {
    let codec = if dry_run {
        Codec::new(Box::new(ManifestBackend::new()))
    } else {
        Codec::new(Box::new(FfmpegBackend::new()))
    };
    if !codec.is_available() {
        anyhow::bail!(
            "Codec backend '{}' is unavailable (expected ffmpeg and ffprobe in PATH)",
            codec.backend_name()
        );
    }
    Ok(codec)
}

pub(crate) fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            tracing::info!(seed, "Using fixed seed");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}
