//! Join transitions applied to each newly merged sub-clip.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use reelcraft_codec::{Codec, MediaId, SlideEdge};
use reelcraft_common::error::ReelcraftResult;
use reelcraft_model::TransitionMode;

/// Length of every transition, in seconds.
pub const TRANSITION_SECS: f64 = 1.0;

/// A concrete transition. [`TransitionMode::Shuffle`] is not a variant; it
/// is resolved into one of these per join by [`Transition::sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "edge", rename_all = "kebab-case")]
pub enum Transition {
    None,
    FadeIn,
    FadeOut,
    SlideIn(SlideEdge),
    SlideOut(SlideEdge),
}

/// `(codec, clip, secs, edge) -> clip`. Edge is ignored by fades.
type Strategy = fn(&mut Codec, MediaId, f64, SlideEdge) -> ReelcraftResult<MediaId>;

/// Indexed by [`Transition::slot`].
const STRATEGIES: [Strategy; 5] = [keep, fade_in, fade_out, slide_in, slide_out];

fn keep(_: &mut Codec, id: MediaId, _: f64, _: SlideEdge) -> ReelcraftResult<MediaId> {
    Ok(id)
}

fn fade_in(codec: &mut Codec, id: MediaId, secs: f64, _: SlideEdge) -> ReelcraftResult<MediaId> {
    codec.fade_in(id, secs)
}

fn fade_out(codec: &mut Codec, id: MediaId, secs: f64, _: SlideEdge) -> ReelcraftResult<MediaId> {
    codec.fade_out(id, secs)
}

fn slide_in(codec: &mut Codec, id: MediaId, secs: f64, edge: SlideEdge) -> ReelcraftResult<MediaId> {
    codec.slide_in(id, secs, edge)
}

fn slide_out(codec: &mut Codec, id: MediaId, secs: f64, edge: SlideEdge) -> ReelcraftResult<MediaId> {
    codec.slide_out(id, secs, edge)
}

impl Transition {
    /// Resolve `mode` into a concrete transition for one join. Slides get a
    /// uniformly random edge; shuffle picks uniformly among the four effects.
    pub fn sample<R: Rng + ?Sized>(mode: TransitionMode, rng: &mut R) -> Self {
        let edge = SlideEdge::ALL[rng.gen_range(0..SlideEdge::ALL.len())];
        match mode {
            TransitionMode::None => Self::None,
            TransitionMode::FadeIn => Self::FadeIn,
            TransitionMode::FadeOut => Self::FadeOut,
            TransitionMode::SlideIn => Self::SlideIn(edge),
            TransitionMode::SlideOut => Self::SlideOut(edge),
            TransitionMode::Shuffle => match rng.gen_range(0..4) {
                0 => Self::FadeIn,
                1 => Self::FadeOut,
                2 => Self::SlideIn(edge),
                _ => Self::SlideOut(edge),
            },
        }
    }

    fn slot(self) -> (usize, SlideEdge) {
        match self {
            Self::None => (0, SlideEdge::Left),
            Self::FadeIn => (1, SlideEdge::Left),
            Self::FadeOut => (2, SlideEdge::Left),
            Self::SlideIn(edge) => (3, edge),
            Self::SlideOut(edge) => (4, edge),
        }
    }

    /// Apply the transition to `id` over `secs`.
    pub fn apply(self, codec: &mut Codec, id: MediaId, secs: f64) -> ReelcraftResult<MediaId> {
        let (slot, edge) = self.slot();
        STRATEGIES[slot](codec, id, secs, edge)
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::FadeIn => write!(f, "fade-in"),
            Self::FadeOut => write!(f, "fade-out"),
            Self::SlideIn(edge) => write!(f, "slide-in:{}", edge.as_str()),
            Self::SlideOut(edge) => write!(f, "slide-out:{}", edge.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reelcraft_codec::{read_manifest, write_manifest, EncodeOptions, ManifestBackend, MediaManifest};

    #[test]
    fn test_fixed_modes_sample_themselves() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..16 {
            assert_eq!(Transition::sample(TransitionMode::None, &mut rng), Transition::None);
            assert_eq!(Transition::sample(TransitionMode::FadeIn, &mut rng), Transition::FadeIn);
            assert_eq!(Transition::sample(TransitionMode::FadeOut, &mut rng), Transition::FadeOut);
        }
    }

    #[test]
    fn test_slide_edges_are_all_reachable() {
        let mut rng = StdRng::seed_from_u64(11);
        let edges: HashSet<SlideEdge> = (0..200)
            .filter_map(|_| match Transition::sample(TransitionMode::SlideIn, &mut rng) {
                Transition::SlideIn(edge) => Some(edge),
                _ => None,
            })
            .collect();
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn test_shuffle_covers_every_effect_but_none() {
        let mut rng = StdRng::seed_from_u64(5);
        let kinds: HashSet<usize> = (0..200)
            .map(|_| Transition::sample(TransitionMode::Shuffle, &mut rng).slot().0)
            .collect();
        assert_eq!(kinds, HashSet::from([1, 2, 3, 4]));
    }

    #[test]
    fn test_apply_runs_the_matching_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        write_manifest(&clip, &MediaManifest::video(3.0, 1080, 1920)).unwrap();

        let mut codec = Codec::new(Box::new(ManifestBackend::new()));
        let id = codec.open_video(&clip).unwrap();
        assert_eq!(Transition::None.apply(&mut codec, id, TRANSITION_SECS).unwrap(), id);

        let slid = Transition::SlideOut(SlideEdge::Top)
            .apply(&mut codec, id, TRANSITION_SECS)
            .unwrap();
        let out = dir.path().join("out.mp4");
        codec.encode(slid, &out, &EncodeOptions::intermediate(1, 30)).unwrap();
        assert_eq!(read_manifest(&out).unwrap().transitions, vec!["slide-out:top".to_string()]);
        assert_eq!(Transition::SlideOut(SlideEdge::Top).to_string(), "slide-out:top");
    }
}
