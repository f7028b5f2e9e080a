//! Assemble a video from footage, narration, music and captions.

use std::path::PathBuf;

use clap::Args;

use reelcraft_assembly::{Assembler, AssemblyJob, AssemblyStage};
use reelcraft_common::config::AppConfig;
use reelcraft_model::{
    load_srt, scan_materials, BgmSource, BgmSpec, CaptionPlacement, ConcatMode, Narration, SourceMaterial,
    TransitionMode, VideoAspect,
};

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Source videos or images; directories are scanned for media files
    #[arg(required = true)]
    pub materials: Vec<PathBuf>,

    /// Narration audio track
    #[arg(short, long)]
    pub narration: PathBuf,

    /// Output video file
    #[arg(short, long)]
    pub output: PathBuf,

    /// SRT cue file for captions
    #[arg(long)]
    pub subtitles: Option<PathBuf>,

    /// Do not burn captions even if a cue file is given
    #[arg(long)]
    pub no_subtitles: bool,

    /// Canvas aspect: portrait|landscape|square
    #[arg(long)]
    pub aspect: Option<String>,

    /// Clip ordering: sequential|random
    #[arg(long)]
    pub concat: Option<String>,

    /// Join transition: none|shuffle|fade-in|fade-out|slide-in|slide-out
    #[arg(long)]
    pub transition: Option<String>,

    /// Longest sub-clip in seconds
    #[arg(long)]
    pub max_clip_secs: Option<f64>,

    /// Caption placement: bottom|top|center|custom:<percent>
    #[arg(long)]
    pub placement: Option<String>,

    /// Caption font file
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Background music file
    #[arg(long)]
    pub bgm: Option<PathBuf>,

    /// Pick background music at random from this directory
    #[arg(long, conflicts_with = "bgm")]
    pub bgm_dir: Option<PathBuf>,

    /// Disable background music
    #[arg(long)]
    pub no_bgm: bool,

    /// Background music gain
    #[arg(long)]
    pub bgm_volume: Option<f64>,

    /// Narration gain
    #[arg(long)]
    pub voice_volume: Option<f64>,

    /// Encoder threads
    #[arg(long)]
    pub threads: Option<u32>,

    /// Seed for clip order and transitions
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use the manifest backend: inputs and outputs are JSON manifests
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(config: AppConfig, args: AssembleArgs) -> anyhow::Result<()> {
    let job = build_job(&config, &args)?;
    println!("Assembling {} material(s)", job.materials.len());
    println!("  Narration: {}", job.narration.path.display());
    println!("  Output: {}", job.output.display());
    println!("  Captions: {}", job.cues.len());

    let codec = super::open_codec(args.dry_run)?;
    let mut rng = super::rng(args.seed.or(config.assembly.seed));

    let report = tokio::task::spawn_blocking(move || {
        let mut assembler = Assembler::new(codec).with_progress(Box::new(|stage: AssemblyStage| {
            println!("  Stage: {stage:?}");
        }));
        assembler.run(&job, &mut rng)
    })
    .await??;

    println!("\nAssembly complete: {}", report.output.display());
    println!("  Duration: {:.2}s", report.duration_secs);
    println!("  Sub-clips: {}", report.clips);
    if !report.skipped.is_empty() {
        println!("  Skipped materials:");
        for skipped in &report.skipped {
            println!("    {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    if let Some(bgm) = &report.bgm {
        println!("  Background music: {}", bgm.display());
    }
    Ok(())
}

fn build_job(config: &AppConfig, args: &AssembleArgs) -> anyhow::Result<AssemblyJob> {
    let materials = collect_materials(&args.materials)?;
    if materials.is_empty() {
        anyhow::bail!("No video or image files found in the given materials");
    }

    let mut params = config.job_params();
    if let Some(aspect) = &args.aspect {
        params.aspect = aspect.parse::<VideoAspect>()?;
    }
    if let Some(concat) = &args.concat {
        params.concat_mode = concat.parse::<ConcatMode>()?;
    }
    if let Some(transition) = &args.transition {
        params.transition_mode = transition.parse::<TransitionMode>()?;
    }
    if let Some(max) = args.max_clip_secs {
        if max.is_nan() || max <= 0.0 {
            anyhow::bail!("--max-clip-secs must be positive, got {max}");
        }
        params.max_clip_secs = max;
    }
    if let Some(threads) = args.threads {
        params.threads = threads.max(1);
    }

    let cues = match (&args.subtitles, args.no_subtitles) {
        (Some(path), false) => load_srt(path)?,
        _ => Vec::new(),
    };
    if args.no_subtitles {
        params.subtitles = None;
    }
    if let Some(caption) = params.subtitles.as_mut() {
        if let Some(font) = &args.font {
            caption.font.path = font.clone();
        }
        if let Some(placement) = &args.placement {
            caption.placement = placement.parse::<CaptionPlacement>()?;
        }
    }

    let mut narration = Narration::new(&args.narration);
    narration.volume = args.voice_volume.unwrap_or(config.audio.voice_volume);

    let bgm_volume = args.bgm_volume.unwrap_or(config.audio.bgm_volume);
    let bgm = if args.no_bgm {
        None
    } else if let Some(path) = &args.bgm {
        Some(BgmSource::File { path: path.clone() })
    } else {
        args.bgm_dir
            .clone()
            .or_else(|| config.audio.bgm_dir.clone())
            .map(|dir| BgmSource::Random { dir })
    }
    .map(|source| BgmSpec {
        source,
        volume: bgm_volume,
    });

    Ok(AssemblyJob {
        materials,
        narration,
        cues,
        bgm,
        output: args.output.clone(),
        params,
    })
}

fn collect_materials(paths: &[PathBuf]) -> anyhow::Result<Vec<SourceMaterial>> {
    let mut materials = Vec::new();
    for path in paths {
        if path.is_dir() {
            materials.extend(scan_materials(path)?);
        } else {
            materials.push(SourceMaterial::new(path.clone()));
        }
    }
    Ok(materials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: AssembleArgs,
    }

    fn parse(argv: &[&str]) -> AssembleArgs {
        let mut full = vec!["reelcraft"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).args
    }

    #[test]
    fn test_flags_override_config() {
        let config = AppConfig::default();
        let args = parse(&[
            "a.mp4",
            "b.png",
            "-n",
            "voice.mp3",
            "-o",
            "out.mp4",
            "--aspect",
            "landscape",
            "--concat",
            "sequential",
            "--placement",
            "custom:40",
            "--bgm-volume",
            "0.5",
            "--no-bgm",
        ]);
        let job = build_job(&config, &args).unwrap();
        assert_eq!(job.materials.len(), 2);
        assert!(job.materials[1].is_image());
        assert_eq!(job.params.aspect, VideoAspect::Landscape);
        assert_eq!(job.params.concat_mode, ConcatMode::Sequential);
        assert_eq!(
            job.params.subtitles.as_ref().map(|s| s.placement),
            Some(CaptionPlacement::Custom(40.0))
        );
        assert!(job.bgm.is_none());
    }

    #[test]
    fn test_bgm_defaults_to_configured_directory() {
        let mut config = AppConfig::default();
        config.audio.bgm_dir = Some(PathBuf::from("/music"));
        let args = parse(&["a.mp4", "-n", "v.mp3", "-o", "o.mp4", "--no-subtitles"]);
        let job = build_job(&config, &args).unwrap();
        assert_eq!(
            job.bgm.map(|b| (b.source, b.volume)),
            Some((
                BgmSource::Random {
                    dir: PathBuf::from("/music")
                },
                0.2
            ))
        );
        assert!(job.params.subtitles.is_none());
    }

    #[test]
    fn test_rejects_unknown_modes() {
        let args = parse(&["a.mp4", "-n", "v.mp3", "-o", "o.mp4", "--transition", "wipe"]);
        assert!(build_job(&AppConfig::default(), &args).is_err());
    }
}
