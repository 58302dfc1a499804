#![forbid(unsafe_code)]

use std::cmp::Ordering;

/// Cosine similarity in `[-1, 1]`; `None` when the vectors differ in length or either has
/// zero magnitude.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}

/// Ranks `candidates` by similarity to `query`, best first, keeping at most `limit` with a
/// score of at least `threshold`. Ties keep candidate order.
pub fn rank_similar<'a, K>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (K, &'a [f32])>,
    limit: usize,
    threshold: f32,
) -> Vec<(K, f32)> {
    let mut scored = candidates
        .into_iter()
        .filter_map(|(key, vector)| cosine(query, vector).map(|score| (key, score)))
        .filter(|(_, score)| *score >= threshold)
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        assert_eq!(cosine(&[1.0, 0.0], &[2.0, 0.0]), Some(1.0));
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), None);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn ranking_orders_filters_and_truncates() {
        let close = [1.0_f32, 0.1];
        let far = [0.0_f32, 1.0];
        let middle = [1.0_f32, 1.0];
        let ranked = rank_similar(
            &[1.0, 0.0],
            [
                ("far", &far[..]),
                ("close", &close[..]),
                ("middle", &middle[..]),
            ],
            2,
            0.5,
        );
        let keys = ranked.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        assert_eq!(keys, vec!["close", "middle"]);
    }
}
