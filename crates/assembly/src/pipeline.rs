//! Job orchestration: materials in, finished video out.
//!
//! One job runs the stages in order: normalize every material, order the
//! sub-clips, merge them, reconcile with the narration, lay captions over
//! the result and encode once. Everything intermediate lives in the work
//! directory next to the output, which this invocation owns and removes
//! when it is done.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, EncodeOptions};
use reelcraft_common::error::{ReelcraftError, ReelcraftResult};
use reelcraft_model::{AssemblyParams, BgmSpec, Narration, SourceMaterial, SubtitleCue};

use crate::merge::{self, MergeParams, MergeSummary};
use crate::normalize::{self, NormalizeParams, SkippedMaterial};
use crate::schedule;
use crate::subtitle::{self, FontMeasure, TextMeasure};
use crate::sync::{self, DurationPlan};

/// Work directory name, created beside the output file.
pub const WORK_DIR_NAME: &str = "temp_clips";

/// Merged video inside the work directory.
pub const COMBINED_NAME: &str = "combined.mp4";

/// Everything needed to produce one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyJob {
    pub materials: Vec<SourceMaterial>,
    pub narration: Narration,

    /// Captions; ignored unless `params.subtitles` is set.
    #[serde(default)]
    pub cues: Vec<SubtitleCue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm: Option<BgmSpec>,

    pub output: PathBuf,
    pub params: AssemblyParams,
}

impl AssemblyJob {
    pub fn work_dir(&self) -> PathBuf {
        output_dir(&self.output).join(WORK_DIR_NAME)
    }

    /// The final encode is written here and renamed into place on success.
    pub fn partial_path(&self) -> PathBuf {
        self.output.with_extension("partial.mp4")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.with_extension("report.json")
    }
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Stages of one assembly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyStage {
    Preparing,
    Normalizing,
    Merging,
    Syncing,
    Subtitling,
    Encoding,
    Complete,
    Failed,
}

/// Stage notification callback.
pub type StageCallback = Box<dyn Fn(AssemblyStage) + Send>;

/// Written beside the output as `<name>.report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output: PathBuf,
    pub backend: String,
    pub duration_secs: f64,

    /// Sub-clips produced by the normalizer.
    pub clips: usize,
    pub skipped: Vec<SkippedMaterial>,
    pub merge: MergeSummary,
    pub plan: DurationPlan,
    pub bgm: Option<PathBuf>,

    /// Caption overlays burned into the output.
    pub subtitles: usize,
}

/// Runs assembly jobs against one codec.
pub struct Assembler {
    codec: Codec,
    measure: Option<Box<dyn TextMeasure + Send>>,
    progress: Option<StageCallback>,
}

impl Assembler {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            measure: None,
            progress: None,
        }
    }

    /// Measure captions with `measure` instead of loading the job's font.
    pub fn with_measure(mut self, measure: impl TextMeasure + Send + 'static) -> Self {
        self.measure = Some(Box::new(measure));
        self
    }

    pub fn with_progress(mut self, progress: StageCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    fn notify(&self, stage: AssemblyStage) {
        tracing::debug!(?stage, "Assembly stage");
        if let Some(cb) = &self.progress {
            cb(stage);
        }
    }

    /// Run `job` to completion.
    ///
    /// The work directory is removed whatever the outcome, and `job.output`
    /// is only replaced once the final encode has succeeded.
    pub fn run<R: Rng + ?Sized>(&mut self, job: &AssemblyJob, rng: &mut R) -> ReelcraftResult<AssemblyReport> {
        let started_at = Utc::now();
        tracing::info!(
            output = %job.output.display(),
            materials = job.materials.len(),
            cues = job.cues.len(),
            backend = self.codec.backend_name(),
            "Starting assembly"
        );
        self.notify(AssemblyStage::Preparing);

        if !self.codec.is_available() {
            self.notify(AssemblyStage::Failed);
            return Err(ReelcraftError::unsupported(format!(
                "codec backend '{}' is not available",
                self.codec.backend_name()
            )));
        }

        let work_dir = job.work_dir();
        let result = prepare_work_dir(&work_dir).and_then(|()| self.run_stages(job, &work_dir, started_at, rng));

        let stats = self.codec.release_all();
        tracing::debug!(?stats, "Released remaining media");
        if work_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                tracing::warn!(dir = %work_dir.display(), error = %e, "Failed to remove work directory");
            }
        }

        match result {
            Ok(report) => {
                if let Err(e) = write_report(&job.report_path(), &report) {
                    tracing::warn!(error = %e, "Failed to write assembly report");
                }
                tracing::info!(
                    output = %report.output.display(),
                    duration_secs = report.duration_secs,
                    clips = report.clips,
                    "Assembly complete"
                );
                self.notify(AssemblyStage::Complete);
                Ok(report)
            }
            Err(e) => {
                let partial = job.partial_path();
                if partial.exists() {
                    if let Err(e) = std::fs::remove_file(&partial) {
                        tracing::warn!(path = %partial.display(), error = %e, "Failed to remove partial output");
                    }
                }
                tracing::error!(error = %e, "Assembly failed");
                self.notify(AssemblyStage::Failed);
                Err(e)
            }
        }
    }

    fn run_stages<R: Rng + ?Sized>(
        &mut self,
        job: &AssemblyJob,
        work_dir: &Path,
        started_at: DateTime<Utc>,
        rng: &mut R,
    ) -> ReelcraftResult<AssemblyReport> {
        let params = &job.params;

        self.notify(AssemblyStage::Normalizing);
        let normalized = normalize::normalize_all(
            &mut self.codec,
            &job.materials,
            &NormalizeParams::from_job(params),
            work_dir,
        )?;
        let clip_count = normalized.clips.len();
        let sequence = schedule::sequence(normalized.clips, params.concat_mode, params.transition_mode, rng);

        self.notify(AssemblyStage::Merging);
        let combined = work_dir.join(COMBINED_NAME);
        let merged = merge::merge(
            &mut self.codec,
            &sequence.clips,
            &MergeParams::from_job(params),
            work_dir,
            &combined,
            rng,
        )?;

        self.notify(AssemblyStage::Syncing);
        let synced = sync::reconcile(&mut self.codec, &merged.path, &job.narration, job.bgm.as_ref(), rng)?;
        let mut root = synced.root;

        let mut subtitles = 0;
        if let Some(caption) = params.subtitles.as_ref().filter(|_| !job.cues.is_empty()) {
            self.notify(AssemblyStage::Subtitling);
            let (width, height) = params.aspect.resolution();
            let loaded;
            let measure: &dyn TextMeasure = match &self.measure {
                Some(m) => m.as_ref(),
                None => {
                    loaded = FontMeasure::from_spec(&caption.font)?;
                    &loaded
                }
            };
            let overlays = subtitle::render(&job.cues, width, height, caption.placement, measure);
            subtitles = overlays.len();
            root = subtitle::burn_overlays(&mut self.codec, root, &overlays, &caption.font)?;
            tracing::info!(overlays = subtitles, "Captions laid out");
        }

        self.notify(AssemblyStage::Encoding);
        if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let partial = job.partial_path();
        let options = EncodeOptions::final_output(params.threads, params.fps);
        self.codec.encode(root, &partial, &options)?;
        std::fs::rename(&partial, &job.output)?;

        Ok(AssemblyReport {
            started_at,
            finished_at: Utc::now(),
            output: job.output.clone(),
            backend: self.codec.backend_name().to_string(),
            duration_secs: synced.duration_secs,
            clips: clip_count,
            skipped: normalized.skipped,
            merge: merged.summary,
            plan: synced.plan,
            bgm: synced.bgm,
            subtitles,
        })
    }
}

/// Run `job` on `codec` with the job's own font for caption layout.
pub fn assemble<R: Rng + ?Sized>(codec: Codec, job: &AssemblyJob, rng: &mut R) -> ReelcraftResult<AssemblyReport> {
    Assembler::new(codec).run(job, rng)
}

fn prepare_work_dir(dir: &Path) -> ReelcraftResult<()> {
    if dir.exists() {
        tracing::warn!(dir = %dir.display(), "Stale work directory found, clearing it");
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn write_report(path: &Path, report: &AssemblyReport) -> ReelcraftResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
