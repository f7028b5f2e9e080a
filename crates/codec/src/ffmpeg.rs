//! ffmpeg-backed codec: `ffprobe` for probing, `ffmpeg` for encoding.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;

use serde::Deserialize;

use reelcraft_common::error::{ReelcraftError, ReelcraftResult};

use crate::codec::{CodecBackend, EncodeOptions, FileReader};
use crate::filter::{self, FilterProgram};
use crate::graph::{MediaGraph, MediaId, MediaInfo, MediaReader, SourceKind};

/// Demuxers ffprobe reports for single still images.
const STILL_FORMATS: &[&str] = &[
    "image2",
    "png_pipe",
    "jpeg_pipe",
    "bmp_pipe",
    "webp_pipe",
    "tiff_pipe",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProbeKey {
    path: PathBuf,
    kind: SourceKind,
    len: u64,
    modified: Option<SystemTime>,
}

/// Encodes compositions with the system `ffmpeg`.
#[derive(Debug, Default)]
pub struct FfmpegBackend {
    probes: HashMap<ProbeKey, MediaInfo>,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full ffmpeg argument list for one encode.
    pub fn build_args(
        graph: &MediaGraph,
        root: MediaId,
        output: &Path,
        options: &EncodeOptions,
    ) -> ReelcraftResult<Vec<String>> {
        let program = filter::compile(graph, root, options.fps, options.audio)?;
        Ok(encode_args(&program, output, options))
    }

    fn run_ffmpeg(&self, args: &[String], expected_duration_secs: f64) -> ReelcraftResult<()> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut cmd = Command::new("ffmpeg");
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| ReelcraftError::encode(format!("Failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelcraftError::encode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelcraftError::encode("Failed to capture ffmpeg stderr"))?;

        // ffmpeg stalls once the stderr pipe fills up.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut progress = ProgressState::default();
        let read = read_progress(stdout, &mut progress, expected_duration_secs);
        if let Err(e) = read {
            if let Err(kill_err) = child.kill() {
                tracing::warn!(error = %kill_err, "Failed to kill ffmpeg");
            }
            if let Err(wait_err) = child.wait() {
                tracing::warn!(error = %wait_err, "Failed to reap ffmpeg");
            }
            let stderr_output = join_stderr(stderr_task);
            return Err(ReelcraftError::encode(format!(
                "Failed reading ffmpeg progress: {e}: {}",
                stderr_output.trim()
            )));
        }

        let status = child
            .wait()
            .map_err(|e| ReelcraftError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = join_stderr(stderr_task);

        if !status.success() {
            return Err(ReelcraftError::encode(format!(
                "ffmpeg failed (status {status}): {}",
                stderr_output.trim()
            )));
        }

        tracing::debug!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            completed = progress.complete,
            "ffmpeg finished"
        );
        Ok(())
    }
}

impl CodecBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg") && command_exists("ffprobe")
    }

    fn probe(&mut self, path: &Path, kind: SourceKind) -> ReelcraftResult<MediaInfo> {
        let meta = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelcraftError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ReelcraftError::Io(e)
            }
        })?;
        let key = ProbeKey {
            path: path.to_path_buf(),
            kind,
            len: meta.len(),
            modified: meta.modified().ok(),
        };
        if let Some(info) = self.probes.get(&key) {
            return Ok(*info);
        }

        let output = Command::new("ffprobe")
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| ReelcraftError::codec(format!("Failed to run ffprobe: {e}")))?;
        if !output.status.success() {
            return Err(ReelcraftError::codec(format!(
                "ffprobe rejected {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let info = probe.media_info(kind).ok_or_else(|| {
            ReelcraftError::codec(format!("{} cannot be opened as {kind:?}", path.display()))
        })?;
        self.probes.insert(key, info);
        Ok(info)
    }

    fn open_reader(&mut self, path: &Path) -> ReelcraftResult<Box<dyn MediaReader>> {
        Ok(Box::new(FileReader::open(path)?))
    }

    fn encode(
        &mut self,
        graph: &MediaGraph,
        root: MediaId,
        output: &Path,
        options: &EncodeOptions,
    ) -> ReelcraftResult<()> {
        let args = Self::build_args(graph, root, output, options)?;
        let expected = graph.get(root).map(|n| n.info.duration_secs).unwrap_or(0.0);
        self.run_ffmpeg(&args, expected)
    }
}

fn encode_args(program: &FilterProgram, output: &Path, options: &EncodeOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-nostats", "-progress", "pipe:1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for input in &program.inputs {
        args.extend(input.to_args());
    }
    if let Some(graph) = program.filter_complex() {
        args.push("-filter_complex".to_string());
        args.push(graph);
    }
    if let Some(video) = &program.video_out {
        args.extend(["-map".to_string(), video.clone()]);
    }
    match &program.audio_out {
        Some(audio) => args.extend([
            "-map".to_string(),
            audio.clone(),
            "-c:a".to_string(),
            options.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", options.audio_bitrate_kbps.max(64)),
        ]),
        None => args.push("-an".to_string()),
    }

    args.extend([
        "-r".to_string(),
        options.fps.max(1).to_string(),
        "-threads".to_string(),
        options.threads.max(1).to_string(),
        "-c:v".to_string(),
        options.video_codec.clone(),
        "-preset".to_string(),
        options.preset.clone(),
        "-pix_fmt".to_string(),
        options.pixel_format.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        // Output container follows the extension, which temp paths may lack.
        "-f".to_string(),
        "mp4".to_string(),
    ]);
    args.push(output.display().to_string());
    args
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

impl ProbeOutput {
    fn stream(&self, codec_type: &str) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }

    fn duration_secs(&self) -> f64 {
        let from_format = self
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok());
        let from_stream = self
            .streams
            .iter()
            .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));
        from_format.or(from_stream).unwrap_or(0.0)
    }

    fn is_still(&self) -> bool {
        self.format
            .as_ref()
            .and_then(|f| f.format_name.as_deref())
            .map(|name| name.split(',').any(|n| STILL_FORMATS.contains(&n)))
            .unwrap_or(false)
    }

    fn media_info(&self, kind: SourceKind) -> Option<MediaInfo> {
        let video = self.stream("video");
        let has_audio = self.stream("audio").is_some();
        match kind {
            SourceKind::Video => {
                let video = video?;
                let duration = self.duration_secs();
                if self.is_still() || duration <= 0.0 {
                    return None;
                }
                Some(MediaInfo {
                    duration_secs: duration,
                    width: video.width?,
                    height: video.height?,
                    has_video: true,
                    has_audio,
                })
            }
            SourceKind::Image => {
                let video = video?;
                Some(MediaInfo::video(0.0, video.width?, video.height?))
            }
            SourceKind::Audio => {
                let duration = self.duration_secs();
                (has_audio && duration > 0.0).then(|| MediaInfo::audio(duration))
            }
        }
    }
}

/// Consume `key=value` progress lines until ffmpeg closes stdout.
fn read_progress<R: Read>(
    stdout: R,
    progress: &mut ProgressState,
    expected_duration_secs: f64,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if let Some((key, value)) = line.trim().split_once('=') {
            progress.update(key, value);
            if key == "progress" {
                tracing::trace!(
                    out_time_secs = progress.out_time_secs,
                    fraction = progress.fraction(expected_duration_secs),
                    "ffmpeg progress"
                );
            }
        }
    }
}

fn join_stderr(task: std::thread::JoinHandle<String>) -> String {
    task.join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            1.0
        } else if expected_duration_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
        }
    }
}
