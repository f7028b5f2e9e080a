//! Shuffle scheduler: orders sub-clips for concatenation.

use rand::Rng;

use reelcraft_model::{CompositionSequence, ConcatMode, SubClip, TransitionMode};

/// Order `clips` under `mode`.
///
/// Sequential keeps source order. Random shuffles so that no clip follows
/// another with the same [`SubClip::key`] whenever the remaining clips allow
/// it.
pub fn order<R: Rng + ?Sized>(clips: Vec<SubClip>, mode: ConcatMode, rng: &mut R) -> Vec<SubClip> {
    match mode {
        ConcatMode::Sequential => clips,
        ConcatMode::Random => order_by_key(clips, |c| c.key(), rng),
    }
}

/// Order `clips` and pair them with the join settings for the merge.
pub fn sequence<R: Rng + ?Sized>(
    clips: Vec<SubClip>,
    concat_mode: ConcatMode,
    transition_mode: TransitionMode,
    rng: &mut R,
) -> CompositionSequence {
    let seq = CompositionSequence::new(order(clips, concat_mode, rng), concat_mode, transition_mode);
    if concat_mode == ConcatMode::Random && seq.has_adjacent_repeat() {
        tracing::warn!(clips = seq.clips.len(), "Could not avoid repeating a clip back to back");
    }
    seq
}

/// Randomized order avoiding equal neighbours, by `key`.
///
/// Greedy and non-backtracking: when every remaining item shares the key of
/// the last placed one, it places one of them anyway. Afterwards, if the
/// tail equals the head, the tail is swapped with its predecessor.
pub fn order_by_key<T, K, F, R>(items: Vec<T>, key: F, rng: &mut R) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    if items.len() <= 1 {
        return items;
    }
    let mut ordered = greedy(items, &key, rng);
    let n = ordered.len();
    if key(&ordered[n - 1]) == key(&ordered[0]) {
        tracing::debug!(len = n, "Tail repeats head, swapping with predecessor");
        ordered.swap(n - 1, n - 2);
    }
    ordered
}

fn greedy<T, K, F, R>(mut remaining: Vec<T>, key: &F, rng: &mut R) -> Vec<T>
where
    K: PartialEq,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    let mut ordered = Vec::with_capacity(remaining.len());
    let first = rng.gen_range(0..remaining.len());
    ordered.push(remaining.remove(first));

    let mut candidates = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let last = ordered.last().map(key);
        candidates.clear();
        candidates.extend(
            remaining
                .iter()
                .enumerate()
                .filter(|(_, item)| last.as_ref() != Some(&key(item)))
                .map(|(i, _)| i),
        );
        let pick = if candidates.is_empty() {
            rng.gen_range(0..remaining.len())
        } else {
            candidates[rng.gen_range(0..candidates.len())]
        };
        ordered.push(remaining.remove(pick));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(mut v: Vec<char>) -> Vec<char> {
        v.sort_unstable();
        v
    }

    fn has_adjacent_repeat(v: &[char]) -> bool {
        v.windows(2).any(|w| w[0] == w[1])
    }

    #[test]
    fn test_sequential_is_identity() {
        let clips = vec![
            SubClip::new("a.mp4", 0.0, 5.0, 1080, 607).unwrap(),
            SubClip::new("b.mp4", 0.0, 5.0, 1080, 607).unwrap(),
            SubClip::new("c.mp4", 0.0, 5.0, 1080, 607).unwrap(),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(order(clips.clone(), ConcatMode::Sequential, &mut rng), clips);
    }

    #[test]
    fn test_single_clip_is_identity() {
        let clips = vec![SubClip::new("a.mp4", 0.0, 5.0, 1080, 607).unwrap()];
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(order(clips.clone(), ConcatMode::Random, &mut rng), clips);
    }

    #[test]
    fn test_two_segments_of_one_source_are_a_permutation() {
        let clips = vec![
            SubClip::new("a.mp4", 0.0, 5.0, 1080, 607).unwrap(),
            SubClip::new("a.mp4", 5.0, 6.0, 1080, 607).unwrap(),
        ];
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = order(clips.clone(), ConcatMode::Random, &mut rng);
            assert_eq!(out.len(), 2);
            assert!(out.contains(&clips[0]) && out.contains(&clips[1]));
        }
    }

    #[test]
    fn test_balanced_duplicates_never_touch() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = order_by_key(vec!['a', 'a', 'b', 'b'], |c| *c, &mut rng);
            assert!(!has_adjacent_repeat(&out), "seed {seed}: {out:?}");
        }
    }

    #[test]
    fn test_all_identical_keys_degenerate() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = order_by_key(vec!['x'; 5], |c| *c, &mut rng);
        assert_eq!(out, vec!['x'; 5]);
    }

    #[test]
    fn test_majority_key_falls_back_without_panicking() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = order_by_key(vec!['a', 'a', 'a', 'b'], |c| *c, &mut rng);
            assert_eq!(sorted(out.clone()), vec!['a', 'a', 'a', 'b']);
            // Three equal keys in four slots must touch somewhere.
            assert!(has_adjacent_repeat(&out));
        }
    }

    #[test]
    fn test_tail_equal_to_head_is_swapped() {
        // Items tagged (key, id) so the swap is observable.
        let items = vec![('a', 0), ('b', 1), ('a', 2)];
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = order_by_key(items.clone(), |i| i.0, &mut rng);
            let keys: Vec<char> = out.iter().map(|i| i.0).collect();
            // Greedy yields a-b-a or b-a-a; the guard turns a-b-a into a-a-b.
            assert_ne!(keys, vec!['a', 'b', 'a']);
            assert_eq!(keys[1], 'a');
        }
    }

    proptest! {
        #[test]
        fn prop_greedy_repeats_only_when_exhausted(
            keys in proptest::collection::vec(proptest::sample::select(vec!['a', 'b', 'c', 'd']), 0..24),
            seed in any::<u64>(),
        ) {
            prop_assume!(!keys.is_empty());
            let mut rng = StdRng::seed_from_u64(seed);
            let out = greedy(keys.clone(), &|c: &char| *c, &mut rng);
            prop_assert_eq!(sorted(out.clone()), sorted(keys));
            for i in 1..out.len() {
                if out[i] == out[i - 1] {
                    // A repeat means nothing else was left to place.
                    prop_assert!(out[i..].iter().all(|c| *c == out[i - 1]));
                }
            }
        }

        #[test]
        fn prop_distinct_keys_never_repeat(n in 2usize..20, seed in any::<u64>()) {
            let items: Vec<usize> = (0..n).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            let out = order_by_key(items, |i| *i, &mut rng);
            prop_assert_eq!(out.len(), n);
            prop_assert!(out.windows(2).all(|w| w[0] != w[1]));
        }
    }

    #[test]
    fn test_sequence_carries_modes() {
        let clips: Vec<SubClip> = ["a.mp4", "b.mp4", "c.mp4"]
            .iter()
            .map(|p| SubClip::new(*p, 0.0, 2.0, 10, 10).unwrap())
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let seq = sequence(clips, ConcatMode::Random, TransitionMode::FadeOut, &mut rng);
        assert_eq!(seq.transition_mode, TransitionMode::FadeOut);
        assert_eq!(seq.clips.len(), 3);
        assert!(!seq.has_adjacent_repeat());
        assert!((seq.total_duration_secs() - 6.0).abs() < 1e-9);
    }
}
