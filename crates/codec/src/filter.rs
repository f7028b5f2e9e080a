//! Compiles a [`MediaGraph`] composition into an ffmpeg `-filter_complex`
//! program.
//!
//! Each `(node, stream)` pair is emitted once. Pairs consumed by more than
//! one parent are fanned out with `split`/`asplit`, since a filtergraph
//! label can only feed a single pad. Repeats of a file open the file once
//! per pass, so no decoded frames are buffered across passes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use reelcraft_common::error::{ReelcraftError, ReelcraftResult};

use crate::graph::{MediaGraph, MediaId, MediaOp, SlideEdge, SourceKind, Stream, TextLayer};

/// Sample rate audio is normalized to before sample-counted filters.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Largest `size` ffmpeg's `loop` filter accepts, in frames.
pub const LOOP_FILTER_MAX_FRAMES: u64 = 32_767;

/// One `-i` input of the ffmpeg command line.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterInput {
    File(PathBuf),
    /// A still image looped for `duration_secs` at `fps`.
    Still {
        path: PathBuf,
        duration_secs: f64,
        fps: u32,
    },
}

impl FilterInput {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::File(path) => vec!["-i".to_string(), path.display().to_string()],
            Self::Still {
                path,
                duration_secs,
                fps,
            } => vec![
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                fps.to_string(),
                "-t".to_string(),
                format!("{duration_secs:.3}"),
                "-i".to_string(),
                path.display().to_string(),
            ],
        }
    }
}

/// A compiled composition.
#[derive(Debug, Clone, Default)]
pub struct FilterProgram {
    pub inputs: Vec<FilterInput>,
    pub chains: Vec<String>,
    pub video_out: Option<String>,
    pub audio_out: Option<String>,
}

impl FilterProgram {
    /// The `-filter_complex` argument, `None` when no filter is needed.
    pub fn filter_complex(&self) -> Option<String> {
        if self.chains.is_empty() {
            None
        } else {
            Some(self.chains.join(";"))
        }
    }
}

/// Compile the composition rooted at `root`. Audio is included only when
/// `with_audio` is set and the root carries an audio stream.
pub fn compile(
    graph: &MediaGraph,
    root: MediaId,
    fps: u32,
    with_audio: bool,
) -> ReelcraftResult<FilterProgram> {
    let root_info = graph
        .live(root)
        .ok_or_else(|| ReelcraftError::encode(format!("cannot compile released handle {root}")))?
        .info;

    let mut compiler = Compiler {
        graph,
        fps: fps.max(1),
        uses: HashMap::new(),
        active: HashSet::new(),
        pending: HashMap::new(),
        inputs: HashMap::new(),
        program: FilterProgram::default(),
        next_label: 0,
    };

    let mut streams = Vec::new();
    if root_info.has_video {
        streams.push(Stream::Video);
    }
    if with_audio && root_info.has_audio {
        streams.push(Stream::Audio);
    }
    if streams.is_empty() {
        return Err(ReelcraftError::encode(format!("{root} has nothing to encode")));
    }

    for &stream in &streams {
        compiler.count(root, stream)?;
    }
    for &stream in &streams {
        let label = compiler.emit(root, stream)?;
        let out = match stream {
            Stream::Video => "vout",
            Stream::Audio => "aout",
        };
        let pass = match stream {
            Stream::Video => "null",
            Stream::Audio => "anull",
        };
        compiler.push(format!("[{label}]{pass}[{out}]"));
        match stream {
            Stream::Video => compiler.program.video_out = Some(format!("[{out}]")),
            Stream::Audio => compiler.program.audio_out = Some(format!("[{out}]")),
        }
    }

    Ok(compiler.program)
}

struct Compiler<'a> {
    graph: &'a MediaGraph,
    fps: u32,
    uses: HashMap<(MediaId, Stream), usize>,
    active: HashSet<(MediaId, Stream)>,
    pending: HashMap<(MediaId, Stream), Vec<String>>,
    inputs: HashMap<MediaId, usize>,
    program: FilterProgram,
    next_label: usize,
}

impl<'a> Compiler<'a> {
    fn node(&self, id: MediaId) -> ReelcraftResult<&'a crate::graph::MediaNode> {
        self.graph
            .live(id)
            .ok_or_else(|| ReelcraftError::encode(format!("composition references released handle {id}")))
    }

    /// The `(node, stream)` pairs that `(id, stream)` reads from.
    fn deps(&self, id: MediaId, stream: Stream) -> ReelcraftResult<Vec<(MediaId, Stream)>> {
        let node = self.node(id)?;
        let children = node.children();
        let first = |s: Stream| -> ReelcraftResult<Vec<(MediaId, Stream)>> {
            children
                .first()
                .map(|&c| vec![(c, s)])
                .ok_or_else(|| ReelcraftError::encode(format!("{} node {id} has no input", node.op.name())))
        };
        match (&node.op, stream) {
            (MediaOp::Source { .. } | MediaOp::Canvas { .. }, _) => Ok(Vec::new()),
            (MediaOp::SlideIn { .. } | MediaOp::SlideOut { .. }, Stream::Video) => {
                let mut deps = first(Stream::Video)?;
                let mask = node
                    .mask()
                    .ok_or_else(|| ReelcraftError::encode(format!("slide node {id} has no backdrop")))?;
                deps.insert(0, (mask, Stream::Video));
                Ok(deps)
            }
            (MediaOp::Repeat { .. }, s) if self.file_source(id, s)?.is_some() => Ok(Vec::new()),
            (MediaOp::Concat | MediaOp::MixAudio, s) => {
                Ok(children.iter().map(|&c| (c, s)).collect())
            }
            (MediaOp::Composite { .. }, Stream::Video) => {
                Ok(children.iter().map(|&c| (c, Stream::Video)).collect())
            }
            (MediaOp::SetAudio, Stream::Video) => first(Stream::Video),
            (MediaOp::SetAudio, Stream::Audio) => children
                .get(1)
                .map(|&c| vec![(c, Stream::Audio)])
                .ok_or_else(|| ReelcraftError::encode(format!("set-audio node {id} has no audio input"))),
            (_, s) => first(s),
        }
    }

    fn count(&mut self, id: MediaId, stream: Stream) -> ReelcraftResult<()> {
        if self.active.contains(&(id, stream)) {
            return Err(ReelcraftError::encode(format!("composition cycle at {id}")));
        }
        let uses = self.uses.entry((id, stream)).or_insert(0);
        *uses += 1;
        if *uses > 1 {
            return Ok(());
        }
        self.active.insert((id, stream));
        for (dep, s) in self.deps(id, stream)? {
            self.count(dep, s)?;
        }
        self.active.remove(&(id, stream));
        Ok(())
    }

    fn emit(&mut self, id: MediaId, stream: Stream) -> ReelcraftResult<String> {
        if let Some(labels) = self.pending.get_mut(&(id, stream)) {
            if let Some(label) = labels.pop() {
                return Ok(label);
            }
        }

        let label = self.build(id, stream)?;
        let uses = self.uses.get(&(id, stream)).copied().unwrap_or(1);
        if uses <= 1 {
            return Ok(label);
        }

        let outs: Vec<String> = (0..uses).map(|_| self.fresh()).collect();
        let split = match stream {
            Stream::Video => "split",
            Stream::Audio => "asplit",
        };
        let pads: String = outs.iter().map(|l| format!("[{l}]")).collect();
        self.push(format!("[{label}]{split}={uses}{pads}"));
        let mut outs = outs;
        let mine = outs.pop().unwrap_or(label);
        self.pending.insert((id, stream), outs);
        Ok(mine)
    }

    fn build(&mut self, id: MediaId, stream: Stream) -> ReelcraftResult<String> {
        let node = self.node(id)?;
        let info = node.info;
        let fps = self.fps;

        let filter = match (&node.op, stream) {
            (MediaOp::Source { path, kind }, s) => {
                let index = self.input(id, path, *kind, info.duration_secs);
                let spec = match s {
                    Stream::Video => "v:0",
                    Stream::Audio => "a:0",
                };
                return Ok(format!("{index}:{spec}"));
            }
            (MediaOp::Canvas { color }, _) => {
                let out = self.fresh();
                self.push(format!(
                    "color=c={color}:s={}x{}:r={fps}:d={:.3}[{out}]",
                    info.width, info.height, info.duration_secs
                ));
                return Ok(out);
            }
            (MediaOp::Subclip { start_secs, end_secs }, Stream::Video) => format!(
                "trim=start={start_secs:.3}:end={end_secs:.3},setpts=PTS-STARTPTS"
            ),
            (MediaOp::Subclip { start_secs, end_secs }, Stream::Audio) => format!(
                "atrim=start={start_secs:.3}:end={end_secs:.3},asetpts=PTS-STARTPTS"
            ),
            (MediaOp::Resize { width, height }, Stream::Video) => {
                format!("scale={width}:{height}")
            }
            (MediaOp::Letterbox { color }, Stream::Video) => format!(
                "pad={}:{}:(ow-iw)/2:(oh-ih)/2:color={color},setsar=1",
                info.width, info.height
            ),
            (MediaOp::Zoom { end_scale }, Stream::Video) => {
                let frames = (info.duration_secs * fps as f64).ceil().max(2.0) - 1.0;
                format!(
                    "zoompan=z='1+{:.5}*on/{frames:.0}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={fps}",
                    end_scale - 1.0,
                    info.width,
                    info.height
                )
            }
            (MediaOp::FadeIn { secs }, Stream::Video) => format!("fade=t=in:st=0:d={secs:.3}"),
            (MediaOp::FadeOut { secs }, Stream::Video) => format!(
                "fade=t=out:st={:.3}:d={secs:.3}",
                (info.duration_secs - secs).max(0.0)
            ),
            (MediaOp::SlideIn { secs, edge }, Stream::Video) => {
                let (x, y) = slide_in_position(*edge, *secs);
                return self.overlay_slide(id, x, y);
            }
            (MediaOp::SlideOut { secs, edge }, Stream::Video) => {
                let (x, y) = slide_out_position(*edge, *secs, info.duration_secs);
                return self.overlay_slide(id, x, y);
            }
            (MediaOp::Concat, s) => {
                let mut pads = String::new();
                for (dep, ds) in self.deps(id, s)? {
                    pads.push_str(&format!("[{}]", self.emit(dep, ds)?));
                }
                let n = node.children().len();
                let out = self.fresh();
                let (v, a) = match s {
                    Stream::Video => (1, 0),
                    Stream::Audio => (0, 1),
                };
                self.push(format!("{pads}concat=n={n}:v={v}:a={a}[{out}]"));
                return Ok(out);
            }
            (MediaOp::Repeat { times }, s) if self.file_source(id, s)?.is_some() => {
                return self.repeat_inputs(id, *times, s);
            }
            (MediaOp::Repeat { times }, Stream::Video) => {
                let frames = self.frames_of_child(id)?;
                if frames > LOOP_FILTER_MAX_FRAMES {
                    return Err(ReelcraftError::encode(format!(
                        "repeat of {id} spans {frames} frames, over the loop limit of {LOOP_FILTER_MAX_FRAMES}"
                    )));
                }
                format!(
                    "fps={fps},loop=loop={}:size={frames}:start=0,setpts=N/{fps}/TB",
                    times - 1
                )
            }
            (MediaOp::Repeat { times }, Stream::Audio) => {
                let samples = self.samples_of_child(id)?;
                format!(
                    "aresample={AUDIO_SAMPLE_RATE},aloop=loop={}:size={samples}:start=0,asetpts=N/{AUDIO_SAMPLE_RATE}/TB",
                    times - 1
                )
            }
            (MediaOp::Composite { media, text }, Stream::Video) => {
                let media = media.clone();
                let text = text.clone();
                return self.composite(id, &media, &text);
            }
            (MediaOp::Volume { factor }, Stream::Audio) => format!("volume={factor:.4}"),
            (MediaOp::AudioFadeOut { secs }, Stream::Audio) => format!(
                "afade=t=out:st={:.3}:d={secs:.3}",
                (info.duration_secs - secs).max(0.0)
            ),
            (MediaOp::AudioLoop, Stream::Audio) => {
                let samples = self.samples_of_child(id)?;
                format!(
                    "aresample={AUDIO_SAMPLE_RATE},aloop=loop=-1:size={samples}:start=0,atrim=duration={:.3},asetpts=N/{AUDIO_SAMPLE_RATE}/TB",
                    info.duration_secs
                )
            }
            (MediaOp::MixAudio, Stream::Audio) => {
                let mut pads = String::new();
                for (dep, ds) in self.deps(id, Stream::Audio)? {
                    pads.push_str(&format!("[{}]", self.emit(dep, ds)?));
                }
                let n = node.children().len();
                let out = self.fresh();
                self.push(format!(
                    "{pads}amix=inputs={n}:duration=first:dropout_transition=0:normalize=0[{out}]"
                ));
                return Ok(out);
            }
            // Streams an op does not touch pass straight through.
            (_, s) => {
                let (dep, ds) = self
                    .deps(id, s)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| ReelcraftError::encode(format!("{id} has no {s:?} input")))?;
                return self.emit(dep, ds);
            }
        };

        let (dep, ds) = self
            .deps(id, stream)?
            .into_iter()
            .next()
            .ok_or_else(|| ReelcraftError::encode(format!("{id} has no input")))?;
        let input = self.emit(dep, ds)?;
        let out = self.fresh();
        self.push(format!("[{input}]{filter}[{out}]"));
        Ok(out)
    }

    /// The file a repeat child streams `stream` from unchanged, seeing
    /// through stripped audio.
    fn file_source(&self, id: MediaId, stream: Stream) -> ReelcraftResult<Option<PathBuf>> {
        let node = self.node(id)?;
        let Some(&child) = node.children().first() else {
            return Ok(None);
        };
        let mut current = self.node(child)?;
        loop {
            match (&current.op, stream) {
                (MediaOp::Source { path, kind }, _) if *kind != SourceKind::Image => {
                    return Ok(Some(path.clone()));
                }
                (MediaOp::WithoutAudio, Stream::Video) => match current.children().first() {
                    Some(&next) => current = self.node(next)?,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
    }

    /// Play the child's file `times` times, one decoder input per pass, so
    /// nothing is buffered beyond what `concat` holds.
    fn repeat_inputs(&mut self, id: MediaId, times: u32, stream: Stream) -> ReelcraftResult<String> {
        let path = self
            .file_source(id, stream)?
            .ok_or_else(|| ReelcraftError::encode(format!("repeat {id} is not file-backed")))?;
        let spec = match stream {
            Stream::Video => "v:0",
            Stream::Audio => "a:0",
        };
        let mut pads = String::new();
        for _ in 0..times {
            let index = self.program.inputs.len();
            self.program.inputs.push(FilterInput::File(path.clone()));
            pads.push_str(&format!("[{index}:{spec}]"));
        }
        let (v, a) = match stream {
            Stream::Video => (1, 0),
            Stream::Audio => (0, 1),
        };
        let out = self.fresh();
        self.push(format!("{pads}concat=n={times}:v={v}:a={a}[{out}]"));
        Ok(out)
    }

    fn overlay_slide(&mut self, id: MediaId, x: String, y: String) -> ReelcraftResult<String> {
        let deps = self.deps(id, Stream::Video)?;
        let mut labels = Vec::with_capacity(deps.len());
        for (dep, ds) in deps {
            labels.push(self.emit(dep, ds)?);
        }
        let [backdrop, clip] = labels.as_slice() else {
            return Err(ReelcraftError::encode(format!("slide node {id} needs a clip and a backdrop")));
        };
        let out = self.fresh();
        self.push(format!(
            "[{backdrop}][{clip}]overlay=x={}:y={}:eof_action=pass[{out}]",
            quote(&x),
            quote(&y)
        ));
        Ok(out)
    }

    fn composite(
        &mut self,
        id: MediaId,
        media: &[crate::graph::MediaLayer],
        text: &[TextLayer],
    ) -> ReelcraftResult<String> {
        let deps = self.deps(id, Stream::Video)?;
        let mut labels = Vec::with_capacity(deps.len());
        for (dep, ds) in deps {
            labels.push(self.emit(dep, ds)?);
        }
        let mut labels = labels.into_iter();
        let mut current = labels
            .next()
            .ok_or_else(|| ReelcraftError::encode(format!("composite {id} has no base")))?;

        for (layer, label) in media.iter().zip(labels) {
            let out = self.fresh();
            let enable = layer
                .window
                .map(|(s, e)| format!(":enable={}", quote(&active_window(s, e))))
                .unwrap_or_default();
            self.push(format!(
                "[{current}][{label}]overlay=x={:.1}:y={:.1}{enable}[{out}]",
                layer.x, layer.y
            ));
            current = out;
        }

        if !text.is_empty() {
            let chain: Vec<String> = text.iter().map(drawtext).collect();
            let out = self.fresh();
            self.push(format!("[{current}]{}[{out}]", chain.join(",")));
            current = out;
        }
        Ok(current)
    }

    fn input(&mut self, id: MediaId, path: &std::path::Path, kind: SourceKind, duration_secs: f64) -> usize {
        if let Some(&index) = self.inputs.get(&id) {
            return index;
        }
        let input = match kind {
            SourceKind::Image => FilterInput::Still {
                path: path.to_path_buf(),
                duration_secs,
                fps: self.fps,
            },
            SourceKind::Video | SourceKind::Audio => FilterInput::File(path.to_path_buf()),
        };
        let index = self.program.inputs.len();
        self.program.inputs.push(input);
        self.inputs.insert(id, index);
        index
    }

    fn frames_of_child(&self, id: MediaId) -> ReelcraftResult<u64> {
        let child = self.first_child(id)?;
        Ok(((child * self.fps as f64).ceil() as u64).max(1))
    }

    fn samples_of_child(&self, id: MediaId) -> ReelcraftResult<u64> {
        let child = self.first_child(id)?;
        Ok(((child * AUDIO_SAMPLE_RATE as f64).ceil() as u64).max(1))
    }

    fn first_child(&self, id: MediaId) -> ReelcraftResult<f64> {
        let node = self.node(id)?;
        let child = node
            .children()
            .first()
            .ok_or_else(|| ReelcraftError::encode(format!("{id} has no input")))?;
        Ok(self.node(*child)?.info.duration_secs)
    }

    fn fresh(&mut self) -> String {
        let label = format!("n{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn push(&mut self, chain: String) {
        self.program.chains.push(chain);
    }
}

fn slide_in_position(edge: SlideEdge, secs: f64) -> (String, String) {
    let progress = format!("min(t/{secs:.3},1)");
    match edge {
        SlideEdge::Left => (format!("-W+W*{progress}"), "0".to_string()),
        SlideEdge::Right => (format!("W-W*{progress}"), "0".to_string()),
        SlideEdge::Top => ("0".to_string(), format!("-H+H*{progress}")),
        SlideEdge::Bottom => ("0".to_string(), format!("H-H*{progress}")),
    }
}

fn slide_out_position(edge: SlideEdge, secs: f64, duration_secs: f64) -> (String, String) {
    let start = (duration_secs - secs).max(0.0);
    let progress = format!("max(t-{start:.3},0)/{secs:.3}");
    match edge {
        SlideEdge::Left => (format!("-W*{progress}"), "0".to_string()),
        SlideEdge::Right => (format!("W*{progress}"), "0".to_string()),
        SlideEdge::Top => ("0".to_string(), format!("-H*{progress}")),
        SlideEdge::Bottom => ("0".to_string(), format!("H*{progress}")),
    }
}

fn active_window(start_secs: f64, end_secs: f64) -> String {
    format!("gte(t,{start_secs:.3})*lt(t,{end_secs:.3})")
}

fn drawtext(layer: &TextLayer) -> String {
    let mut filter = format!(
        "drawtext=fontfile={}:text={}:expansion=none:fontsize={}:fontcolor={}:x={:.1}:y={:.1}",
        quote(&layer.font_path.display().to_string()),
        quote(&layer.text),
        layer.font_size,
        layer.color,
        layer.x,
        layer.y,
    );
    if layer.stroke_width > 0 {
        filter.push_str(&format!(
            ":borderw={}:bordercolor={}",
            layer.stroke_width, layer.stroke_color
        ));
    }
    if let Some(color) = &layer.box_color {
        filter.push_str(&format!(":box=1:boxcolor={color}"));
    }
    filter.push_str(&format!(
        ":enable={}",
        quote(&active_window(layer.start_secs, layer.end_secs))
    ));
    filter
}

/// Escape an option value for use inside `-filter_complex`: backslash and
/// colon are escaped for the option parser, then the whole value is single
/// quoted for the graph parser. Quotes cannot be nested, so `'` becomes `’`.
pub fn quote(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => escaped.push('\u{2019}'),
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MediaInfo, MediaLayer};

    fn source(graph: &mut MediaGraph, name: &str, info: MediaInfo) -> MediaId {
        graph.insert(
            MediaOp::Source {
                path: PathBuf::from(name),
                kind: SourceKind::Video,
            },
            info,
            Vec::new(),
        )
    }

    #[test]
    fn test_quote_escapes_option_separators() {
        assert_eq!(quote("a:b"), "'a\\:b'");
        assert_eq!(quote("it's"), "'it\u{2019}s'");
        assert_eq!(quote("C:\\fonts"), "'C\\:\\\\fonts'");
    }

    #[test]
    fn test_normalize_chain_compiles_to_single_input() {
        let mut graph = MediaGraph::new();
        let src = source(&mut graph, "in.mp4", MediaInfo::video(10.0, 1920, 1080));
        let sub = graph.insert(
            MediaOp::Subclip {
                start_secs: 0.0,
                end_secs: 5.0,
            },
            MediaInfo::video(5.0, 1920, 1080),
            vec![src],
        );
        let scaled = graph.insert(
            MediaOp::Resize {
                width: 1080,
                height: 608,
            },
            MediaInfo::video(5.0, 1080, 608),
            vec![sub],
        );
        let boxed = graph.insert(
            MediaOp::Letterbox {
                color: "black".to_string(),
            },
            MediaInfo::video(5.0, 1080, 1920),
            vec![scaled],
        );

        let program = compile(&graph, boxed, 30, false).unwrap();
        assert_eq!(program.inputs, vec![FilterInput::File(PathBuf::from("in.mp4"))]);
        let fc = program.filter_complex().unwrap();
        assert!(fc.contains("[0:v:0]trim=start=0.000:end=5.000"));
        assert!(fc.contains("scale=1080:608"));
        assert!(fc.contains("pad=1080:1920"));
        assert_eq!(program.video_out.as_deref(), Some("[vout]"));
        assert!(program.audio_out.is_none());
    }

    #[test]
    fn test_shared_node_is_split() {
        let mut graph = MediaGraph::new();
        let src = source(&mut graph, "in.mp4", MediaInfo::video(2.0, 640, 480));
        let joined = graph.insert(MediaOp::Concat, MediaInfo::video(4.0, 640, 480), vec![src, src]);

        let program = compile(&graph, joined, 30, false).unwrap();
        let fc = program.filter_complex().unwrap();
        assert!(fc.contains("[0:v:0]split=2"));
        assert!(fc.contains("concat=n=2:v=1:a=0"));
        assert_eq!(program.inputs.len(), 1);
    }

    #[test]
    fn test_audio_pass_through_and_mix() {
        let mut graph = MediaGraph::new();
        let mut info = MediaInfo::video(8.0, 1080, 1920);
        info.has_audio = false;
        let video = source(&mut graph, "base.mp4", info);
        let narration = graph.insert(
            MediaOp::Source {
                path: PathBuf::from("voice.mp3"),
                kind: SourceKind::Audio,
            },
            MediaInfo::audio(8.0),
            Vec::new(),
        );
        let music = graph.insert(
            MediaOp::Source {
                path: PathBuf::from("song.mp3"),
                kind: SourceKind::Audio,
            },
            MediaInfo::audio(120.0),
            Vec::new(),
        );
        let looped = graph.insert(MediaOp::AudioLoop, MediaInfo::audio(8.0), vec![music]);
        let mixed = graph.insert(MediaOp::MixAudio, MediaInfo::audio(8.0), vec![narration, looped]);
        let mut out_info = info;
        out_info.has_audio = true;
        let final_node = graph.insert(MediaOp::SetAudio, out_info, vec![video, mixed]);

        let program = compile(&graph, final_node, 30, true).unwrap();
        let fc = program.filter_complex().unwrap();
        assert_eq!(program.inputs.len(), 3);
        assert!(fc.contains("amix=inputs=2:duration=first"));
        assert!(fc.contains("atrim=duration=8.000"));
        assert_eq!(program.audio_out.as_deref(), Some("[aout]"));
    }

    #[test]
    fn test_text_and_media_layers_are_windowed() {
        let mut graph = MediaGraph::new();
        let base = source(&mut graph, "base.mp4", MediaInfo::video(6.0, 1080, 1920));
        let logo = source(&mut graph, "logo.mp4", MediaInfo::video(6.0, 200, 200));
        let text = TextLayer {
            text: "hello: world".to_string(),
            font_path: PathBuf::from("/fonts/a.ttf"),
            font_size: 60,
            color: "#FFFFFF".to_string(),
            stroke_color: "#000000".to_string(),
            stroke_width: 1,
            box_color: None,
            x: 100.0,
            y: 1700.0,
            start_secs: 1.0,
            end_secs: 2.5,
        };
        let comp = graph.insert(
            MediaOp::Composite {
                media: vec![MediaLayer {
                    id: logo,
                    x: 10.0,
                    y: 10.0,
                    window: Some((0.0, 3.0)),
                }],
                text: vec![text],
            },
            MediaInfo::video(6.0, 1080, 1920),
            vec![base, logo],
        );

        let fc = compile(&graph, comp, 30, false).unwrap().filter_complex().unwrap();
        assert!(fc.contains("overlay=x=10.0:y=10.0:enable='gte(t,0.000)*lt(t,3.000)'"));
        assert!(fc.contains("text='hello\\: world'"));
        assert!(fc.contains("enable='gte(t,1.000)*lt(t,2.500)'"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = MediaGraph::new();
        let src = source(&mut graph, "in.mp4", MediaInfo::video(2.0, 640, 480));
        let fade = graph.insert(MediaOp::FadeIn { secs: 1.0 }, MediaInfo::video(2.0, 640, 480), vec![src]);
        graph.link_child(src, fade);
        // Sources ignore their children, so only a derived-node loop counts.
        assert!(compile(&graph, fade, 30, false).is_ok());

        let a = graph.insert(MediaOp::FadeIn { secs: 1.0 }, MediaInfo::video(2.0, 640, 480), Vec::new());
        graph.link_child(a, a);
        assert!(compile(&graph, a, 30, false).is_err());
    }

    #[test]
    fn test_long_file_repeat_reads_the_file_again() {
        let mut graph = MediaGraph::new();
        let src = source(&mut graph, "combined.mp4", MediaInfo::video(1200.0, 1080, 1920));
        let twice = graph.insert(MediaOp::Repeat { times: 2 }, MediaInfo::video(2400.0, 1080, 1920), vec![src]);

        let program = compile(&graph, twice, 30, false).unwrap();
        let fc = program.filter_complex().unwrap();
        assert!(!fc.contains("loop="));
        assert!(fc.contains("[0:v:0][1:v:0]concat=n=2:v=1:a=0"));
        assert_eq!(
            program.inputs,
            vec![
                FilterInput::File(PathBuf::from("combined.mp4")),
                FilterInput::File(PathBuf::from("combined.mp4")),
            ]
        );
    }

    #[test]
    fn test_repeat_sees_through_stripped_audio() {
        let mut graph = MediaGraph::new();
        let mut info = MediaInfo::video(10.0, 640, 480);
        info.has_audio = true;
        let src = source(&mut graph, "a.mp4", info);
        let silent = graph.insert(MediaOp::WithoutAudio, MediaInfo::video(10.0, 640, 480), vec![src]);
        let thrice = graph.insert(MediaOp::Repeat { times: 3 }, MediaInfo::video(30.0, 640, 480), vec![silent]);

        let program = compile(&graph, thrice, 30, false).unwrap();
        assert_eq!(program.inputs.len(), 3);
        assert!(program.filter_complex().unwrap().contains("concat=n=3:v=1:a=0"));
    }

    #[test]
    fn test_derived_repeat_respects_loop_limit() {
        let mut graph = MediaGraph::new();
        let src = source(&mut graph, "in.mp4", MediaInfo::video(1200.0, 640, 480));
        let short = graph.insert(
            MediaOp::FadeIn { secs: 1.0 },
            MediaInfo::video(1200.0, 640, 480),
            vec![src],
        );
        let looped = graph.insert(MediaOp::Repeat { times: 2 }, MediaInfo::video(2400.0, 640, 480), vec![short]);
        assert!(compile(&graph, looped, 30, false).is_err());

        let brief = graph.insert(
            MediaOp::Subclip {
                start_secs: 0.0,
                end_secs: 4.0,
            },
            MediaInfo::video(4.0, 640, 480),
            vec![short],
        );
        let looped = graph.insert(MediaOp::Repeat { times: 2 }, MediaInfo::video(8.0, 640, 480), vec![brief]);
        let fc = compile(&graph, looped, 30, false).unwrap().filter_complex().unwrap();
        assert!(fc.contains("loop=loop=1:size=120:start=0"));
    }

    #[test]
    fn test_image_zoom_grows_over_the_clip() {
        let mut graph = MediaGraph::new();
        let still = graph.insert(
            MediaOp::Source {
                path: PathBuf::from("photo.png"),
                kind: SourceKind::Image,
            },
            MediaInfo::video(4.0, 1080, 1080),
            Vec::new(),
        );
        let zoomed = graph.insert(
            MediaOp::Zoom { end_scale: 1.12 },
            MediaInfo::video(4.0, 1080, 1080),
            vec![still],
        );

        let program = compile(&graph, zoomed, 30, false).unwrap();
        assert!(matches!(program.inputs[0], FilterInput::Still { fps: 30, .. }));
        let fc = program.filter_complex().unwrap();
        assert!(fc.contains("zoompan=z='1+0.12000*on/119'"));
        assert!(fc.contains("s=1080x1080:fps=30"));
    }
}
