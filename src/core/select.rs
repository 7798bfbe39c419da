use crate::cells::CellNum;
use crate::prng::Prng;

/// Draws one winner from a weighted candidate set.
///
/// Selection probability is proportional to `|strength|^stiffness`
/// relative to the other candidates; `stiffness = 1.0` gives the plain
/// proportional lottery. A single cumulative pass plus binary search,
/// not repeated pairwise coin flips: a randomized-comparator sort is
/// not a faithful weighted sample.
///
/// Returns `None` for an empty candidate set, and also when every
/// candidate has zero weight (a draw over total weight zero is
/// undefined).
pub fn draw_weighted(
    rng: &mut Prng,
    candidates: &[(CellNum, f32)],
    stiffness: f32,
) -> Option<CellNum> {
    if candidates.is_empty() {
        return None;
    }

    let mut cumulative = Vec::with_capacity(candidates.len());
    let mut total = 0.0f32;
    for &(_, strength) in candidates {
        let w = strength.abs().powf(stiffness);
        if w.is_finite() {
            total += w;
        }
        cumulative.push(total);
    }
    if total <= 0.0 {
        return None;
    }

    let r = rng.next_f32_01() * total;
    let pos = cumulative.partition_point(|&c| c <= r);
    let pos = pos.min(candidates.len() - 1);
    Some(candidates[pos].0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_no_winner() {
        let mut rng = Prng::new(1);
        assert_eq!(draw_weighted(&mut rng, &[], 1.0), None);
    }

    #[test]
    fn all_zero_weights_have_no_winner() {
        let mut rng = Prng::new(1);
        let candidates = [(0, 0.0), (1, 0.0)];
        assert_eq!(draw_weighted(&mut rng, &candidates, 1.0), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let mut rng = Prng::new(3);
        let candidates = [(4, 0.2)];
        for _ in 0..50 {
            assert_eq!(draw_weighted(&mut rng, &candidates, 1.0), Some(4));
        }
    }

    #[test]
    fn sign_is_ignored_only_magnitude_counts() {
        let mut rng = Prng::new(5);
        let candidates = [(0, -1.0), (1, 0.0)];
        for _ in 0..50 {
            assert_eq!(draw_weighted(&mut rng, &candidates, 1.0), Some(0));
        }
    }

    #[test]
    fn frequencies_track_relative_magnitudes() {
        // {a: 1, b: 3} must converge to 0.25 / 0.75.
        let mut rng = Prng::new(42);
        let candidates = [(0, 1.0), (1, 3.0)];

        let draws = 20_000;
        let mut hits = [0u32; 2];
        for _ in 0..draws {
            let winner = draw_weighted(&mut rng, &candidates, 1.0).unwrap();
            hits[winner] += 1;
        }

        let freq_a = hits[0] as f32 / draws as f32;
        assert!(
            (freq_a - 0.25).abs() < 0.02,
            "expected ~0.25 for the weaker candidate, got {freq_a}"
        );
    }

    #[test]
    fn stiffness_sharpens_the_draw() {
        // With stiffness 2 the weights {1, 3} act like {1, 9}.
        let mut rng = Prng::new(43);
        let candidates = [(0, 1.0), (1, 3.0)];

        let draws = 20_000;
        let mut hits = [0u32; 2];
        for _ in 0..draws {
            let winner = draw_weighted(&mut rng, &candidates, 2.0).unwrap();
            hits[winner] += 1;
        }

        let freq_a = hits[0] as f32 / draws as f32;
        assert!(
            (freq_a - 0.1).abs() < 0.02,
            "expected ~0.10 for the weaker candidate, got {freq_a}"
        );
    }
}
