//! In-process backend that writes JSON manifests instead of video.
//!
//! A manifest records what an encode would have produced: geometry,
//! duration, the source segments that make up the video timeline, the
//! transitions and overlays applied, and the audio tracks mixed in.
//! Manifests are also probed back as inputs, so a merged base carries the
//! history of everything folded into it. This makes the whole assembly
//! pipeline runnable and inspectable without ffmpeg.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelcraft_common::error::{ReelcraftError, ReelcraftResult};

use crate::codec::{CodecBackend, EncodeOptions, FileReader};
use crate::graph::{MediaGraph, MediaId, MediaInfo, MediaOp, MediaReader, SourceKind, Stream};

/// A slice `[start_secs, end_secs)` of a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub source: PathBuf,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ManifestSegment {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaManifest {
    pub width: u32,
    pub height: u32,
    /// Zero for still images.
    pub duration_secs: f64,
    pub has_video: bool,
    pub has_audio: bool,
    #[serde(default)]
    pub segments: Vec<ManifestSegment>,
    #[serde(default)]
    pub transitions: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,
    #[serde(default)]
    pub audio_sources: Vec<PathBuf>,
}

impl MediaManifest {
    pub fn video(duration_secs: f64, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            duration_secs,
            has_video: true,
            has_audio: false,
            segments: Vec::new(),
            transitions: Vec::new(),
            overlays: Vec::new(),
            audio_sources: Vec::new(),
        }
    }

    pub fn image(width: u32, height: u32) -> Self {
        Self::video(0.0, width, height)
    }

    pub fn audio(duration_secs: f64) -> Self {
        Self {
            has_video: false,
            has_audio: true,
            ..Self::video(duration_secs, 0, 0)
        }
    }

    fn info(&self, kind: SourceKind) -> Option<MediaInfo> {
        match kind {
            SourceKind::Video => (self.has_video && self.duration_secs > 0.0).then_some(MediaInfo {
                duration_secs: self.duration_secs,
                width: self.width,
                height: self.height,
                has_video: true,
                has_audio: self.has_audio,
            }),
            SourceKind::Image => (self.has_video && self.width > 0 && self.height > 0)
                .then(|| MediaInfo::video(0.0, self.width, self.height)),
            SourceKind::Audio => (self.has_audio && self.duration_secs > 0.0)
                .then(|| MediaInfo::audio(self.duration_secs)),
        }
    }
}

pub fn read_manifest(path: &Path) -> ReelcraftResult<MediaManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReelcraftError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ReelcraftError::Io(e)
        }
    })?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_manifest(path: &Path, manifest: &MediaManifest) -> ReelcraftResult<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Deterministic backend producing [`MediaManifest`] files.
#[derive(Debug, Default)]
pub struct ManifestBackend {
    encodes: usize,
}

impl ManifestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of encodes performed so far.
    pub fn encode_count(&self) -> usize {
        self.encodes
    }
}

impl CodecBackend for ManifestBackend {
    fn name(&self) -> &str {
        "manifest"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn probe(&mut self, path: &Path, kind: SourceKind) -> ReelcraftResult<MediaInfo> {
        let manifest = read_manifest(path)
            .map_err(|e| ReelcraftError::codec(format!("{} is not a manifest: {e}", path.display())))?;
        manifest.info(kind).ok_or_else(|| {
            ReelcraftError::codec(format!("{} cannot be opened as {kind:?}", path.display()))
        })
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
        let manifest = flatten(graph, root, options)?;
        write_manifest(output, &manifest)?;
        self.encodes += 1;
        tracing::trace!(output = %output.display(), segments = manifest.segments.len(), "Wrote manifest");
        Ok(())
    }
}

/// Describe the composition rooted at `root` as a manifest.
pub fn flatten(graph: &MediaGraph, root: MediaId, options: &EncodeOptions) -> ReelcraftResult<MediaManifest> {
    let info = graph
        .live(root)
        .ok_or_else(|| ReelcraftError::encode(format!("cannot encode released handle {root}")))?
        .info;
    let with_audio = options.audio && info.has_audio;

    let mut manifest = MediaManifest {
        width: info.width,
        height: info.height,
        duration_secs: info.duration_secs,
        has_video: info.has_video,
        has_audio: with_audio,
        segments: Vec::new(),
        transitions: Vec::new(),
        overlays: Vec::new(),
        audio_sources: Vec::new(),
    };
    let mut walker = Walker { graph, depth: 0 };
    if info.has_video {
        manifest.segments = walker.segments(root)?;
        walker.effects(root, &mut manifest)?;
    }
    if with_audio {
        walker.audio(root, Stream::Audio, &mut manifest.audio_sources)?;
    }
    Ok(manifest)
}

/// Graphs built through `Codec` are acyclic; the depth cap catches
/// hand-linked cycles.
const MAX_DEPTH: usize = 4096;

struct Walker<'a> {
    graph: &'a MediaGraph,
    depth: usize,
}

impl<'a> Walker<'a> {
    fn node(&self, id: MediaId) -> ReelcraftResult<&'a crate::graph::MediaNode> {
        self.graph
            .live(id)
            .ok_or_else(|| ReelcraftError::encode(format!("composition references released handle {id}")))
    }

    fn enter(&mut self) -> ReelcraftResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ReelcraftError::encode("composition is cyclic or too deep"));
        }
        Ok(())
    }

    fn segments(&mut self, id: MediaId) -> ReelcraftResult<Vec<ManifestSegment>> {
        self.enter()?;
        let node = self.node(id)?;
        let children = node.children();
        let result = match &node.op {
            MediaOp::Source { path, .. } => {
                let inherited = read_manifest(path).map(|m| m.segments).unwrap_or_default();
                if inherited.is_empty() {
                    vec![ManifestSegment {
                        source: path.clone(),
                        start_secs: 0.0,
                        end_secs: node.info.duration_secs,
                    }]
                } else {
                    inherited
                }
            }
            MediaOp::Canvas { .. } => Vec::new(),
            MediaOp::Subclip {
                start_secs,
                end_secs,
            } => {
                let inner = self.first(children, |w, c| w.segments(c))?;
                slice(&inner, *start_secs, *end_secs)
            }
            MediaOp::Concat => {
                let mut all = Vec::new();
                for &child in children {
                    all.extend(self.segments(child)?);
                }
                all
            }
            MediaOp::Repeat { times } => {
                let inner = self.first(children, |w, c| w.segments(c))?;
                let mut all = Vec::with_capacity(inner.len() * *times as usize);
                for _ in 0..*times {
                    all.extend(inner.iter().cloned());
                }
                all
            }
            _ => self.first(children, |w, c| w.segments(c))?,
        };
        self.depth -= 1;
        Ok(result)
    }

    fn effects(&mut self, id: MediaId, manifest: &mut MediaManifest) -> ReelcraftResult<()> {
        self.enter()?;
        let node = self.node(id)?;
        match &node.op {
            MediaOp::Source { path, .. } => {
                if let Ok(inner) = read_manifest(path) {
                    manifest.transitions.extend(inner.transitions);
                    manifest.overlays.extend(inner.overlays);
                }
            }
            MediaOp::FadeIn { .. } => manifest.transitions.push("fade-in".to_string()),
            MediaOp::FadeOut { .. } => manifest.transitions.push("fade-out".to_string()),
            MediaOp::SlideIn { edge, .. } => {
                manifest.transitions.push(format!("slide-in:{}", edge.as_str()))
            }
            MediaOp::SlideOut { edge, .. } => {
                manifest.transitions.push(format!("slide-out:{}", edge.as_str()))
            }
            MediaOp::Composite { text, .. } => {
                manifest.overlays.extend(text.iter().map(|t| t.text.clone()))
            }
            _ => {}
        }
        let video_children: &[MediaId] = match &node.op {
            MediaOp::SetAudio => &node.children()[..node.children().len().min(1)],
            _ => node.children(),
        };
        for &child in video_children {
            if self.node(child)?.info.has_video {
                self.effects(child, manifest)?;
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn audio(&mut self, id: MediaId, stream: Stream, out: &mut Vec<PathBuf>) -> ReelcraftResult<()> {
        self.enter()?;
        let node = self.node(id)?;
        match &node.op {
            MediaOp::Source { path, kind } => {
                let inherited = read_manifest(path).map(|m| m.audio_sources).unwrap_or_default();
                if inherited.is_empty() || *kind == SourceKind::Audio {
                    out.push(path.clone());
                } else {
                    out.extend(inherited);
                }
            }
            MediaOp::SetAudio => {
                if let Some(&audio) = node.children().get(1) {
                    self.audio(audio, stream, out)?;
                }
            }
            _ => {
                for &child in node.children() {
                    if self.node(child)?.info.has(stream) {
                        self.audio(child, stream, out)?;
                    }
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn first<T>(
        &mut self,
        children: &[MediaId],
        f: impl FnOnce(&mut Self, MediaId) -> ReelcraftResult<T>,
    ) -> ReelcraftResult<T> {
        let child = *children
            .first()
            .ok_or_else(|| ReelcraftError::encode("derived node without input"))?;
        f(self, child)
    }
}

/// Cut the timeline `[start, end)` out of consecutive segments.
fn slice(segments: &[ManifestSegment], start: f64, end: f64) -> Vec<ManifestSegment> {
    let mut out = Vec::new();
    let mut offset = 0.0;
    for seg in segments {
        let seg_start = offset;
        let seg_end = offset + seg.duration_secs();
        offset = seg_end;
        let lo = start.max(seg_start);
        let hi = end.min(seg_end);
        if hi - lo > 1e-9 {
            out.push(ManifestSegment {
                source: seg.source.clone(),
                start_secs: seg.start_secs + (lo - seg_start),
                end_secs: seg.start_secs + (hi - seg_start),
            });
        }
    }
    out
}
