use rand::seq::SliceRandom;
use rand::Rng;

pub fn shuffled_indices<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<i64> {
    let mut indices: Vec<i64> = (0..n as i64).collect();
    indices.shuffle(rng);
    return indices;
}

/// Draws an index from unnormalized non-negative weights.
pub fn sample_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let mut threshold = rng.random::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        if threshold < *w {
            return i;
        }
        threshold -= w;
    }
    // rounding can leave a sliver past the last bucket
    weights
        .iter()
        .rposition(|w| *w > 0.0)
        .unwrap_or(weights.len().saturating_sub(1))
}
