//! End-to-end assembly runs against the manifest backend.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use reelcraft_assembly::subtitle::MonospaceMeasure;
use reelcraft_assembly::{AssemblyJob, Assembler};
use reelcraft_codec::{read_manifest, write_manifest, Codec, ManifestBackend, MediaManifest};
use reelcraft_common::error::ReelcraftError;
use reelcraft_model::{
    AssemblyParams, BgmSource, BgmSpec, CaptionPlacement, ConcatMode, FontSpec, Narration, SourceMaterial,
    SubtitleCue, SubtitleParams,
};

fn video(dir: &Path, name: &str, secs: f64, width: u32, height: u32) -> SourceMaterial {
    let path = dir.join(name);
    write_manifest(&path, &MediaManifest::video(secs, width, height)).unwrap();
    SourceMaterial::new(path)
}

fn narration(dir: &Path, secs: f64) -> Narration {
    let path = dir.join("voice.mp3");
    write_manifest(&path, &MediaManifest::audio(secs)).unwrap();
    Narration::new(path)
}

fn job(dir: &Path, materials: Vec<SourceMaterial>, voice: Narration, params: AssemblyParams) -> AssemblyJob {
    AssemblyJob {
        materials,
        narration: voice,
        cues: Vec::new(),
        bgm: None,
        output: dir.join("out").join("final.mp4"),
        params,
    }
}

fn assembler() -> Assembler {
    Assembler::new(Codec::new(Box::new(ManifestBackend::new())))
}

#[test]
fn sequential_sources_are_cut_and_matched_to_narration() {
    let dir = tempfile::tempdir().unwrap();
    let materials = vec![
        video(dir.path(), "a.mp4", 6.0, 1920, 1080),
        video(dir.path(), "b.mp4", 6.0, 1920, 1080),
        video(dir.path(), "c.mp4", 6.0, 1920, 1080),
    ];
    let params = AssemblyParams {
        concat_mode: ConcatMode::Sequential,
        ..AssemblyParams::default()
    };
    let job = job(dir.path(), materials, narration(dir.path(), 12.0), params);

    let report = assembler().run(&job, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(report.clips, 3);
    assert!(report.skipped.is_empty());
    assert_eq!(report.plan.repeat_times, 1);
    assert!(report.plan.truncate_video);
    assert!((report.duration_secs - 12.0).abs() < 1e-6);

    let manifest = read_manifest(&job.output).unwrap();
    assert_eq!((manifest.width, manifest.height), (1080, 1920));
    assert!((manifest.duration_secs - 12.0).abs() < 1e-6);
    let sources: Vec<PathBuf> = manifest.segments.iter().map(|s| s.source.clone()).collect();
    assert_eq!(
        sources,
        vec![dir.path().join("a.mp4"), dir.path().join("b.mp4"), dir.path().join("c.mp4")]
    );
    assert!((manifest.segments[2].duration_secs() - 2.0).abs() < 1e-6);
    assert_eq!(manifest.audio_sources, vec![job.narration.path.clone()]);

    assert!(!job.work_dir().exists());
    assert!(!job.partial_path().exists());
    assert!(job.report_path().exists());
}

#[test]
fn short_footage_is_looped_and_music_mixed() {
    let dir = tempfile::tempdir().unwrap();
    let songs = dir.path().join("songs");
    std::fs::create_dir_all(&songs).unwrap();
    let song = songs.join("theme.mp3");
    write_manifest(&song, &MediaManifest::audio(60.0)).unwrap();

    let materials = vec![
        video(dir.path(), "a.mp4", 3.0, 1920, 1080),
        video(dir.path(), "b.mp4", 4.0, 1080, 1920),
    ];
    let mut job = job(dir.path(), materials, narration(dir.path(), 20.0), AssemblyParams::default());
    job.bgm = Some(BgmSpec {
        source: BgmSource::Random { dir: songs },
        volume: 0.2,
    });

    let report = assembler().run(&job, &mut StdRng::seed_from_u64(9)).unwrap();
    assert_eq!(report.plan.repeat_times, 3);
    assert_eq!(report.bgm.as_deref(), Some(song.as_path()));
    assert_eq!(report.merge.batches_merged, 1);

    let manifest = read_manifest(&job.output).unwrap();
    assert!((manifest.duration_secs - 20.0).abs() < 1e-6);
    assert_eq!(manifest.audio_sources, vec![job.narration.path.clone(), song]);
}

#[test]
fn captions_are_burned_and_low_resolution_material_reported() {
    let dir = tempfile::tempdir().unwrap();
    let materials = vec![
        video(dir.path(), "good.mp4", 8.0, 1920, 1080),
        video(dir.path(), "tiny.mp4", 8.0, 320, 240),
    ];
    let params = AssemblyParams {
        subtitles: Some(SubtitleParams {
            font: FontSpec::new("/nonexistent/font.ttf", 60),
            placement: CaptionPlacement::Bottom,
        }),
        ..AssemblyParams::default()
    };
    let mut job = job(dir.path(), materials, narration(dir.path(), 4.0), params);
    job.cues = vec![
        SubtitleCue::new(0.0, 2.0, "first caption").unwrap(),
        SubtitleCue::new(2.0, 4.0, "second caption").unwrap(),
    ];

    let mut assembler = assembler().with_measure(MonospaceMeasure::for_size(60));
    let report = assembler.run(&job, &mut StdRng::seed_from_u64(1)).unwrap();
    assert_eq!(report.subtitles, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, dir.path().join("tiny.mp4"));

    let manifest = read_manifest(&job.output).unwrap();
    assert_eq!(manifest.overlays, vec!["first caption".to_string(), "second caption".to_string()]);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(job.report_path()).unwrap()).unwrap();
    assert_eq!(saved["subtitles"], 2);
    assert_eq!(saved["backend"], "manifest");
}

#[test]
fn unreadable_font_fails_without_leaving_output() {
    let dir = tempfile::tempdir().unwrap();
    let materials = vec![video(dir.path(), "a.mp4", 6.0, 1920, 1080)];
    let params = AssemblyParams {
        subtitles: Some(SubtitleParams {
            font: FontSpec::new(dir.path().join("missing.ttf"), 60),
            placement: CaptionPlacement::Top,
        }),
        ..AssemblyParams::default()
    };
    let mut job = job(dir.path(), materials, narration(dir.path(), 4.0), params);
    job.cues = vec![SubtitleCue::new(0.0, 1.0, "hello").unwrap()];

    let err = assembler().run(&job, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, ReelcraftError::Subtitle { .. }));
    assert!(!job.output.exists());
    assert!(!job.partial_path().exists());
    assert!(!job.work_dir().exists());
}

#[test]
fn missing_narration_is_an_audio_error() {
    let dir = tempfile::tempdir().unwrap();
    let materials = vec![video(dir.path(), "a.mp4", 6.0, 1920, 1080)];
    let job = job(
        dir.path(),
        materials,
        Narration::new(dir.path().join("nope.mp3")),
        AssemblyParams::default(),
    );

    let err = assembler().run(&job, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert!(matches!(err, ReelcraftError::Audio { .. }));
    assert!(!job.work_dir().exists());
}
