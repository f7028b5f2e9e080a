//! The codec collaborator used by the assembly pipeline.
//!
//! [`Codec`] builds compositions as nodes in a [`MediaGraph`] and hands
//! finished graphs to a [`CodecBackend`] for probing and encoding. Building a
//! composition is cheap and never touches pixels; only `open_*` (probe) and
//! `encode` do real work.

use std::fs::File;
use std::path::{Path, PathBuf};

use reelcraft_common::error::{ReelcraftError, ReelcraftResult};

use crate::graph::{
    MediaGraph, MediaId, MediaInfo, MediaLayer, MediaNode, MediaOp, MediaReader, SlideEdge,
    SourceKind, TextLayer,
};
use crate::reclaim::{self, ReleaseStats};

/// Output settings for one encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub fps: u32,
    pub threads: u32,
    pub video_codec: String,
    pub preset: String,
    pub pixel_format: String,
    /// Include the audio stream, if the handle has one.
    pub audio: bool,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

impl EncodeOptions {
    /// Fast, video-only settings for temporary artifacts.
    pub fn intermediate(threads: u32, fps: u32) -> Self {
        Self {
            fps,
            threads: threads.max(1),
            video_codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio: false,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
        }
    }

    /// Settings for the caller-visible output file.
    pub fn final_output(threads: u32, fps: u32) -> Self {
        Self {
            preset: "medium".to_string(),
            audio: true,
            ..Self::intermediate(threads, fps)
        }
    }
}

/// Trait for codec backends (ffmpeg, manifest).
pub trait CodecBackend: Send {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend can run on the system.
    fn is_available(&self) -> bool;

    /// Read duration and geometry of a file opened as `kind`.
    fn probe(&mut self, path: &Path, kind: SourceKind) -> ReelcraftResult<MediaInfo>;

    /// Acquire the OS resource that keeps a source open.
    fn open_reader(&mut self, path: &Path) -> ReelcraftResult<Box<dyn MediaReader>>;

    /// Render the composition rooted at `root` into `output`.
    fn encode(
        &mut self,
        graph: &MediaGraph,
        root: MediaId,
        output: &Path,
        options: &EncodeOptions,
    ) -> ReelcraftResult<()>;
}

/// Open file handle on a source. Closing drops the handle.
pub struct FileReader {
    path: PathBuf,
    file: Option<File>,
}

impl FileReader {
    pub fn open(path: &Path) -> ReelcraftResult<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ReelcraftError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ReelcraftError::Io(e)
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }
}

impl MediaReader for FileReader {
    fn close(&mut self) -> std::io::Result<()> {
        if self.file.take().is_some() {
            tracing::trace!(path = %self.path.display(), "Closed source reader");
        }
        Ok(())
    }
}

/// Media handle factory and encoder.
pub struct Codec {
    graph: MediaGraph,
    backend: Box<dyn CodecBackend>,
}

impl Codec {
    pub fn new(backend: Box<dyn CodecBackend>) -> Self {
        Self {
            graph: MediaGraph::new(),
            backend,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub fn graph(&self) -> &MediaGraph {
        &self.graph
    }

    pub fn node(&self, id: MediaId) -> ReelcraftResult<&MediaNode> {
        match self.graph.get(id) {
            Some(node) if node.is_released() => {
                Err(ReelcraftError::codec(format!("handle {id} was already released")))
            }
            Some(node) => Ok(node),
            None => Err(ReelcraftError::codec(format!("unknown handle {id}"))),
        }
    }

    pub fn info(&self, id: MediaId) -> ReelcraftResult<MediaInfo> {
        self.node(id).map(|n| n.info)
    }

    /// Open a video file. Its audio track, if any, becomes a sub-resource.
    pub fn open_video(&mut self, path: &Path) -> ReelcraftResult<MediaId> {
        let info = self.backend.probe(path, SourceKind::Video)?;
        if !info.has_video || info.duration_secs <= 0.0 {
            return Err(ReelcraftError::codec(format!(
                "{} has no playable video stream",
                path.display()
            )));
        }
        let id = self.open_source(path, SourceKind::Video, info)?;
        if info.has_audio {
            let audio = self.open_source(
                path,
                SourceKind::Audio,
                MediaInfo::audio(info.duration_secs),
            )?;
            self.graph.attach_audio(id, audio);
        }
        Ok(id)
    }

    /// Open a still image shown for `duration_secs`.
    pub fn open_image(&mut self, path: &Path, duration_secs: f64) -> ReelcraftResult<MediaId> {
        if duration_secs <= 0.0 {
            return Err(ReelcraftError::codec("image duration must be positive"));
        }
        let probed = self.backend.probe(path, SourceKind::Image)?;
        if probed.width == 0 || probed.height == 0 {
            return Err(ReelcraftError::codec(format!(
                "{} is not a decodable image",
                path.display()
            )));
        }
        let info = MediaInfo::video(duration_secs, probed.width, probed.height);
        self.open_source(path, SourceKind::Image, info)
    }

    pub fn open_audio(&mut self, path: &Path) -> ReelcraftResult<MediaId> {
        let info = self.backend.probe(path, SourceKind::Audio)?;
        if !info.has_audio || info.duration_secs <= 0.0 {
            return Err(ReelcraftError::codec(format!(
                "{} has no playable audio stream",
                path.display()
            )));
        }
        self.open_source(path, SourceKind::Audio, MediaInfo::audio(info.duration_secs))
    }

    fn open_source(
        &mut self,
        path: &Path,
        kind: SourceKind,
        info: MediaInfo,
    ) -> ReelcraftResult<MediaId> {
        let reader = self.backend.open_reader(path)?;
        let id = self.graph.insert(
            MediaOp::Source {
                path: path.to_path_buf(),
                kind,
            },
            info,
            Vec::new(),
        );
        self.graph.attach_reader(id, reader);
        tracing::trace!(handle = %id, path = %path.display(), ?kind, "Opened media source");
        Ok(id)
    }

    /// `[start, end)` of `id`; `end` is clamped to the source duration.
    pub fn subclip(&mut self, id: MediaId, start_secs: f64, end_secs: f64) -> ReelcraftResult<MediaId> {
        let info = self.info(id)?;
        let end_secs = end_secs.min(info.duration_secs);
        if start_secs < 0.0 || end_secs <= start_secs {
            return Err(ReelcraftError::codec(format!(
                "empty sub-range [{start_secs:.3}, {end_secs:.3}) of {id}"
            )));
        }
        Ok(self.derive(
            MediaOp::Subclip {
                start_secs,
                end_secs,
            },
            info.with_duration(end_secs - start_secs),
            vec![id],
        ))
    }

    pub fn resize(&mut self, id: MediaId, width: u32, height: u32) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        if width == 0 || height == 0 {
            return Err(ReelcraftError::codec("resize to zero size"));
        }
        Ok(self.derive(
            MediaOp::Resize { width, height },
            MediaInfo {
                width,
                height,
                ..info
            },
            vec![id],
        ))
    }

    /// Center `id` on an opaque black `width x height` canvas.
    pub fn letterbox(&mut self, id: MediaId, width: u32, height: u32) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        if info.width > width || info.height > height {
            return Err(ReelcraftError::codec(format!(
                "{}x{} does not fit a {width}x{height} canvas",
                info.width, info.height
            )));
        }
        Ok(self.derive(
            MediaOp::Letterbox {
                color: "black".to_string(),
            },
            MediaInfo {
                width,
                height,
                ..info
            },
            vec![id],
        ))
    }

    /// Scale linearly from 1.0 at the start to `end_scale` at the end,
    /// keeping the frame size.
    pub fn zoom(&mut self, id: MediaId, end_scale: f64) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        if end_scale < 1.0 {
            return Err(ReelcraftError::codec("zoom must not shrink"));
        }
        Ok(self.derive(MediaOp::Zoom { end_scale }, info, vec![id]))
    }

    pub fn fade_in(&mut self, id: MediaId, secs: f64) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        let secs = secs.min(info.duration_secs);
        Ok(self.derive(MediaOp::FadeIn { secs }, info, vec![id]))
    }

    pub fn fade_out(&mut self, id: MediaId, secs: f64) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        let secs = secs.min(info.duration_secs);
        Ok(self.derive(MediaOp::FadeOut { secs }, info, vec![id]))
    }

    pub fn slide_in(&mut self, id: MediaId, secs: f64, edge: SlideEdge) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        let secs = secs.min(info.duration_secs);
        self.slide(id, info, MediaOp::SlideIn { secs, edge })
    }

    pub fn slide_out(&mut self, id: MediaId, secs: f64, edge: SlideEdge) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        let secs = secs.min(info.duration_secs);
        self.slide(id, info, MediaOp::SlideOut { secs, edge })
    }

    fn slide(&mut self, id: MediaId, info: MediaInfo, op: MediaOp) -> ReelcraftResult<MediaId> {
        let backdrop = self.graph.insert(
            MediaOp::Canvas {
                color: "black".to_string(),
            },
            MediaInfo {
                has_audio: false,
                ..info
            },
            Vec::new(),
        );
        let slid = self.derive(op, info, vec![id]);
        self.graph.attach_mask(slid, backdrop);
        Ok(slid)
    }

    /// Play `ids` back to back. All must share one frame size.
    pub fn concat(&mut self, ids: &[MediaId]) -> ReelcraftResult<MediaId> {
        let first = *ids
            .first()
            .ok_or_else(|| ReelcraftError::codec("concat of zero handles"))?;
        let base = self.video_info(first)?;
        let mut duration = 0.0;
        let mut has_audio = true;
        for &id in ids {
            let info = self.video_info(id)?;
            if (info.width, info.height) != (base.width, base.height) {
                return Err(ReelcraftError::codec(format!(
                    "concat size mismatch: {}x{} vs {}x{}",
                    info.width, info.height, base.width, base.height
                )));
            }
            duration += info.duration_secs;
            has_audio &= info.has_audio;
        }
        Ok(self.derive(
            MediaOp::Concat,
            MediaInfo {
                duration_secs: duration,
                has_audio,
                ..base
            },
            ids.to_vec(),
        ))
    }

    pub fn repeat(&mut self, id: MediaId, times: u32) -> ReelcraftResult<MediaId> {
        let info = self.info(id)?;
        if times == 0 {
            return Err(ReelcraftError::codec("repeat zero times"));
        }
        if times == 1 {
            return Ok(id);
        }
        Ok(self.derive(
            MediaOp::Repeat { times },
            info.with_duration(info.duration_secs * times as f64),
            vec![id],
        ))
    }

    pub fn without_audio(&mut self, id: MediaId) -> ReelcraftResult<MediaId> {
        let info = self.video_info(id)?;
        if !info.has_audio {
            return Ok(id);
        }
        Ok(self.derive(
            MediaOp::WithoutAudio,
            MediaInfo {
                has_audio: false,
                ..info
            },
            vec![id],
        ))
    }

    /// Draw positioned layers over `base` for its whole duration.
    pub fn composite(
        &mut self,
        base: MediaId,
        media: Vec<MediaLayer>,
        text: Vec<TextLayer>,
    ) -> ReelcraftResult<MediaId> {
        let info = self.video_info(base)?;
        let mut children = vec![base];
        for layer in &media {
            self.video_info(layer.id)?;
            children.push(layer.id);
        }
        Ok(self.derive(MediaOp::Composite { media, text }, info, children))
    }

    pub fn volume(&mut self, id: MediaId, factor: f64) -> ReelcraftResult<MediaId> {
        let info = self.audio_info(id)?;
        Ok(self.derive(MediaOp::Volume { factor }, info, vec![id]))
    }

    pub fn audio_fade_out(&mut self, id: MediaId, secs: f64) -> ReelcraftResult<MediaId> {
        let info = self.audio_info(id)?;
        let secs = secs.min(info.duration_secs);
        Ok(self.derive(MediaOp::AudioFadeOut { secs }, info, vec![id]))
    }

    /// Loop or cut `id` to exactly `duration_secs`.
    pub fn audio_loop(&mut self, id: MediaId, duration_secs: f64) -> ReelcraftResult<MediaId> {
        let info = self.audio_info(id)?;
        if duration_secs <= 0.0 {
            return Err(ReelcraftError::codec("audio loop to non-positive duration"));
        }
        Ok(self.derive(MediaOp::AudioLoop, info.with_duration(duration_secs), vec![id]))
    }

    /// Additive mix; the result lasts as long as the first track.
    pub fn mix_audio(&mut self, ids: &[MediaId]) -> ReelcraftResult<MediaId> {
        let first = *ids
            .first()
            .ok_or_else(|| ReelcraftError::codec("mix of zero tracks"))?;
        let info = self.audio_info(first)?;
        for &id in &ids[1..] {
            self.audio_info(id)?;
        }
        if ids.len() == 1 {
            return Ok(first);
        }
        Ok(self.derive(MediaOp::MixAudio, info, ids.to_vec()))
    }

    /// Pair the video of `video` with the audio of `audio`.
    pub fn set_audio(&mut self, video: MediaId, audio: MediaId) -> ReelcraftResult<MediaId> {
        let v = self.video_info(video)?;
        self.audio_info(audio)?;
        Ok(self.derive(
            MediaOp::SetAudio,
            MediaInfo {
                has_audio: true,
                ..v
            },
            vec![video, audio],
        ))
    }

    /// Encode the composition rooted at `id` into `output`.
    pub fn encode(&mut self, id: MediaId, output: &Path, options: &EncodeOptions) -> ReelcraftResult<()> {
        let info = self.info(id)?;
        if let Some(dead) = self.graph.find_released(id) {
            return Err(ReelcraftError::encode(format!(
                "composition {id} depends on released handle {dead}"
            )));
        }
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::debug!(
            handle = %id,
            output = %output.display(),
            duration_secs = info.duration_secs,
            backend = self.backend.name(),
            "Encoding composition"
        );
        self.backend.encode(&self.graph, id, output, options)
    }

    /// Release `id` and everything it was built from.
    pub fn release(&mut self, id: MediaId) -> ReleaseStats {
        reclaim::release(&mut self.graph, id)
    }

    pub fn release_all(&mut self) -> ReleaseStats {
        reclaim::release_all(&mut self.graph)
    }

    fn derive(&mut self, op: MediaOp, info: MediaInfo, children: Vec<MediaId>) -> MediaId {
        self.graph.insert(op, info, children)
    }

    fn video_info(&self, id: MediaId) -> ReelcraftResult<MediaInfo> {
        let info = self.info(id)?;
        if !info.has_video {
            return Err(ReelcraftError::codec(format!("{id} has no video stream")));
        }
        Ok(info)
    }

    fn audio_info(&self, id: MediaId) -> ReelcraftResult<MediaInfo> {
        let info = self.info(id)?;
        if !info.has_audio {
            return Err(ReelcraftError::codec(format!("{id} has no audio stream")));
        }
        Ok(info)
    }
}

impl Drop for Codec {
    fn drop(&mut self) {
        let stats = self.release_all();
        if stats.released > 0 {
            tracing::debug!(released = stats.released, "Released leftover media handles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{write_manifest, ManifestBackend, MediaManifest};

    fn fixture(dir: &Path, name: &str, manifest: MediaManifest) -> PathBuf {
        let path = dir.join(name);
        write_manifest(&path, &manifest).unwrap();
        path
    }

    #[test]
    fn test_open_video_registers_audio_sub_resource() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = MediaManifest::video(6.0, 1280, 720);
        m.has_audio = true;
        let path = fixture(dir.path(), "a.mp4", m);

        let mut codec = Codec::new(Box::new(ManifestBackend::new()));
        let id = codec.open_video(&path).unwrap();
        let audio = codec.node(id).unwrap().audio_resource().unwrap();
        assert!(codec.info(audio).unwrap().has_audio);
        assert_eq!(codec.graph().open_reader_count(), 2);

        codec.release(id);
        assert_eq!(codec.graph().open_reader_count(), 0);
        assert!(codec.info(id).is_err());
    }

    #[test]
    fn test_derived_info_tracks_duration_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "a.mp4", MediaManifest::video(6.0, 1280, 720));

        let mut codec = Codec::new(Box::new(ManifestBackend::new()));
        let src = codec.open_video(&path).unwrap();
        let sub = codec.subclip(src, 5.0, 10.0).unwrap();
        assert!((codec.info(sub).unwrap().duration_secs - 1.0).abs() < 1e-9);

        let small = codec.resize(sub, 1080, 607).unwrap();
        let boxed = codec.letterbox(small, 1080, 1920).unwrap();
        let info = codec.info(boxed).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let twice = codec.repeat(boxed, 2).unwrap();
        assert!((codec.info(twice).unwrap().duration_secs - 2.0).abs() < 1e-9);
        assert!(codec.letterbox(src, 100, 100).is_err());
    }

    #[test]
    fn test_encode_rejects_released_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "a.mp4", MediaManifest::video(4.0, 640, 480));

        let mut codec = Codec::new(Box::new(ManifestBackend::new()));
        let src = codec.open_video(&path).unwrap();
        let faded = codec.fade_in(src, 1.0).unwrap();
        codec.release(src);

        let err = codec
            .encode(faded, &dir.path().join("out.mp4"), &EncodeOptions::intermediate(1, 30))
            .unwrap_err();
        assert!(err.to_string().contains("released"));
    }

    #[test]
    fn test_concat_requires_matching_frames() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a.mp4", MediaManifest::video(4.0, 640, 480));
        let b = fixture(dir.path(), "b.mp4", MediaManifest::video(4.0, 320, 240));

        let mut codec = Codec::new(Box::new(ManifestBackend::new()));
        let a = codec.open_video(&a).unwrap();
        let b = codec.open_video(&b).unwrap();
        assert!(codec.concat(&[a, b]).is_err());
        let joined = codec.concat(&[a, a]).unwrap();
        assert!((codec.info(joined).unwrap().duration_secs - 8.0).abs() < 1e-9);
    }
}
