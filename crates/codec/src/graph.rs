//! Media handle graph.
//!
//! Every open source and every derived composition is a node in a
//! [`MediaGraph`] arena, addressed by a copyable [`MediaId`]. Derived nodes
//! list the nodes they were built from as children, so a finished
//! composition is a tree (or DAG, when a handle is reused) rooted at the
//! handle that gets encoded. Ids are never reused; released nodes stay in
//! the arena as tombstones so stale ids are detected instead of aliasing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Handle to a node in a [`MediaGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(pub(crate) u32);

impl MediaId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of file a source node was opened as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Image,
    Audio,
}

/// Stream selector used when compiling a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Video,
    Audio,
}

/// Duration and geometry of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub has_video: bool,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn video(duration_secs: f64, width: u32, height: u32) -> Self {
        Self {
            duration_secs,
            width,
            height,
            has_video: true,
            has_audio: false,
        }
    }

    pub fn audio(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            width: 0,
            height: 0,
            has_video: false,
            has_audio: true,
        }
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn has(&self, stream: Stream) -> bool {
        match stream {
            Stream::Video => self.has_video,
            Stream::Audio => self.has_audio,
        }
    }
}

/// Edge a slide transition enters from or exits towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideEdge {
    Left,
    Right,
    Top,
    Bottom,
}

impl SlideEdge {
    pub const ALL: [SlideEdge; 4] = [Self::Left, Self::Right, Self::Top, Self::Bottom];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// A caption or label drawn over a composite during an active window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayer {
    /// Text to draw; `\n` separates lines.
    pub text: String,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub box_color: Option<String>,
    /// Top-left corner in canvas pixels.
    pub x: f64,
    pub y: f64,
    /// Visible over `[start_secs, end_secs)`.
    pub start_secs: f64,
    pub end_secs: f64,
}

/// A video layer placed over the composite base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaLayer {
    pub id: MediaId,
    pub x: f64,
    pub y: f64,
    /// Visible window; always visible when `None`.
    pub window: Option<(f64, f64)>,
}

/// The operation a node performs on its children.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaOp {
    /// An opened file.
    Source { path: PathBuf, kind: SourceKind },
    /// Solid color frame, used as a backdrop.
    Canvas { color: String },
    /// `[start, end)` of the single child.
    Subclip { start_secs: f64, end_secs: f64 },
    Resize { width: u32, height: u32 },
    /// Center the child on an opaque canvas of the node's size.
    Letterbox { color: String },
    /// Linear zoom from 1.0 to `end_scale` across the node's duration.
    Zoom { end_scale: f64 },
    FadeIn { secs: f64 },
    FadeOut { secs: f64 },
    /// Slide over the mask backdrop.
    SlideIn { secs: f64, edge: SlideEdge },
    SlideOut { secs: f64, edge: SlideEdge },
    /// Children played back to back.
    Concat,
    /// Single child played `times` times.
    Repeat { times: u32 },
    WithoutAudio,
    /// `children[0]` is the base; media layers follow.
    Composite {
        media: Vec<MediaLayer>,
        text: Vec<TextLayer>,
    },
    Volume { factor: f64 },
    AudioFadeOut { secs: f64 },
    /// Loop the audio child and cut it to the node's duration.
    AudioLoop,
    /// Additive mix of all children; duration of the first.
    MixAudio,
    /// `children[0]` supplies video, `children[1]` audio.
    SetAudio,
}

impl MediaOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Canvas { .. } => "canvas",
            Self::Subclip { .. } => "subclip",
            Self::Resize { .. } => "resize",
            Self::Letterbox { .. } => "letterbox",
            Self::Zoom { .. } => "zoom",
            Self::FadeIn { .. } => "fade-in",
            Self::FadeOut { .. } => "fade-out",
            Self::SlideIn { .. } => "slide-in",
            Self::SlideOut { .. } => "slide-out",
            Self::Concat => "concat",
            Self::Repeat { .. } => "repeat",
            Self::WithoutAudio => "without-audio",
            Self::Composite { .. } => "composite",
            Self::Volume { .. } => "volume",
            Self::AudioFadeOut { .. } => "audio-fade-out",
            Self::AudioLoop => "audio-loop",
            Self::MixAudio => "mix-audio",
            Self::SetAudio => "set-audio",
        }
    }
}

/// An OS-level resource behind a node (file handle, decoder process).
pub trait MediaReader: Send {
    /// Close the resource. Must tolerate being called more than once.
    fn close(&mut self) -> std::io::Result<()>;
}

/// One node of the graph.
pub struct MediaNode {
    pub op: MediaOp,
    pub info: MediaInfo,
    pub(crate) children: Vec<MediaId>,
    pub(crate) reader: Option<Box<dyn MediaReader>>,
    pub(crate) audio: Option<MediaId>,
    pub(crate) mask: Option<MediaId>,
    pub(crate) released: bool,
}

impl MediaNode {
    pub fn children(&self) -> &[MediaId] {
        &self.children
    }

    /// Audio sub-resource opened alongside a video source.
    pub fn audio_resource(&self) -> Option<MediaId> {
        self.audio
    }

    /// Backdrop/mask sub-resource.
    pub fn mask(&self) -> Option<MediaId> {
        self.mask
    }

    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl fmt::Debug for MediaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaNode")
            .field("op", &self.op)
            .field("info", &self.info)
            .field("children", &self.children)
            .field("reader", &self.reader.is_some())
            .field("audio", &self.audio)
            .field("mask", &self.mask)
            .field("released", &self.released)
            .finish()
    }
}

/// Arena owning every node created by one codec instance.
#[derive(Debug, Default)]
pub struct MediaGraph {
    nodes: Vec<MediaNode>,
}

impl MediaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    pub fn insert(&mut self, op: MediaOp, info: MediaInfo, children: Vec<MediaId>) -> MediaId {
        let id = MediaId(self.nodes.len() as u32);
        self.nodes.push(MediaNode {
            op,
            info,
            children,
            reader: None,
            audio: None,
            mask: None,
            released: false,
        });
        id
    }

    pub fn get(&self, id: MediaId) -> Option<&MediaNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: MediaId) -> Option<&mut MediaNode> {
        self.nodes.get_mut(id.index())
    }

    /// Live node lookup; released or unknown ids yield `None`.
    pub fn live(&self, id: MediaId) -> Option<&MediaNode> {
        self.get(id).filter(|n| !n.released)
    }

    pub(crate) fn attach_reader(&mut self, id: MediaId, reader: Box<dyn MediaReader>) {
        if let Some(node) = self.get_mut(id) {
            node.reader = Some(reader);
        }
    }

    pub(crate) fn attach_audio(&mut self, id: MediaId, audio: MediaId) {
        if let Some(node) = self.get_mut(id) {
            node.audio = Some(audio);
        }
    }

    pub(crate) fn attach_mask(&mut self, id: MediaId, mask: MediaId) {
        if let Some(node) = self.get_mut(id) {
            node.mask = Some(mask);
        }
    }

    /// Add `child` to `parent`'s children. No cycle check is made; the
    /// reclaimer tolerates cycles.
    pub fn link_child(&mut self, parent: MediaId, child: MediaId) {
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes not yet released.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.released).count()
    }

    /// Nodes still holding an OS resource.
    pub fn open_reader_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.reader.is_some()).count()
    }

    /// Ids of live nodes that no live node references. Used for teardown.
    pub fn live_roots(&self) -> Vec<MediaId> {
        let mut referenced = vec![false; self.nodes.len()];
        for node in self.nodes.iter().filter(|n| !n.released) {
            for id in node
                .children
                .iter()
                .chain(node.audio.iter())
                .chain(node.mask.iter())
            {
                if let Some(flag) = referenced.get_mut(id.index()) {
                    *flag = true;
                }
            }
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, n)| !n.released && !referenced[*i])
            .map(|(i, _)| MediaId(i as u32))
            .collect()
    }

    /// First released node reachable from `root`, if any.
    pub fn find_released(&self, root: MediaId) -> Option<MediaId> {
        let mut stack = vec![root];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.get(id)?;
            if node.released {
                return Some(id);
            }
            stack.extend(node.children.iter().copied());
            stack.extend(node.mask.iter().copied());
        }
        None
    }
}
