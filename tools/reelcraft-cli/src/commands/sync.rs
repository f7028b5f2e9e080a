//! Match an existing video to a narration track.

use std::path::PathBuf;

use clap::Args;

use reelcraft_assembly::sync::{sync_to_file, SyncParams};
use reelcraft_common::config::AppConfig;
use reelcraft_model::{BgmSource, BgmSpec, Narration};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Video to loop or cut
    pub video: PathBuf,

    /// Narration audio track
    #[arg(short, long)]
    pub narration: PathBuf,

    /// Output video file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Background music file
    #[arg(long)]
    pub bgm: Option<PathBuf>,

    /// Pick background music at random from this directory
    #[arg(long, conflicts_with = "bgm")]
    pub bgm_dir: Option<PathBuf>,

    /// Background music gain
    #[arg(long)]
    pub bgm_volume: Option<f64>,

    /// Narration gain
    #[arg(long)]
    pub voice_volume: Option<f64>,

    /// Seed for the music pick
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use the manifest backend: inputs and outputs are JSON manifests
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(config: AppConfig, args: SyncArgs) -> anyhow::Result<()> {
    println!("Syncing {} to {}", args.video.display(), args.narration.display());

    let mut narration = Narration::new(&args.narration);
    narration.volume = args.voice_volume.unwrap_or(config.audio.voice_volume);

    let volume = args.bgm_volume.unwrap_or(config.audio.bgm_volume);
    let bgm = match (&args.bgm, &args.bgm_dir) {
        (Some(path), _) => Some(BgmSource::File { path: path.clone() }),
        (None, Some(dir)) => Some(BgmSource::Random { dir: dir.clone() }),
        (None, None) => None,
    }
    .map(|source| BgmSpec { source, volume });

    let params = SyncParams {
        threads: config.assembly.threads.max(1),
        fps: config.assembly.fps.max(1),
    };
    let mut codec = super::open_codec(args.dry_run)?;
    let mut rng = super::rng(args.seed.or(config.assembly.seed));

    let outcome = tokio::task::spawn_blocking(move || {
        let result = sync_to_file(
            &mut codec,
            &args.video,
            &narration,
            bgm.as_ref(),
            &args.output,
            &params,
            &mut rng,
        );
        codec.release_all();
        result
    })
    .await??;

    println!("\nSync complete: {}", outcome.path.display());
    println!("  Duration: {:.2}s", outcome.duration_secs);
    if outcome.plan.repeat_times > 1 {
        println!("  Video looped {} times", outcome.plan.repeat_times);
    }
    if let Some(bgm) = &outcome.bgm {
        println!("  Background music: {}", bgm.display());
    }
    Ok(())
}
