//! Vector distance and nearest-neighbor ranking.
//!
//! Euclidean (L2) distance, the same metric pgvector's `<->` operator uses,
//! so vectors produced for a pgvector deployment rank identically here.

use netintent_core::sample::{ConfigSample, ScoredSample};

/// Euclidean distance between two vectors.
///
/// Accumulates in f64. Returns `f32::INFINITY` when the lengths differ or
/// either vector is empty, so mismatched rows always rank last.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }

    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();

    sum.sqrt() as f32
}

/// Rank samples by ascending distance to `query` and keep the first `limit`.
///
/// Ties are broken by ascending `sample_id`, so the order is total and
/// repeatable for an unchanged sample set.
pub fn rank_nearest<'a, I>(samples: I, query: &[f32], limit: usize) -> Vec<ScoredSample>
where
    I: IntoIterator<Item = &'a ConfigSample>,
{
    let mut scored: Vec<ScoredSample> = samples
        .into_iter()
        .filter(|s| s.embedding.len() == query.len())
        .map(|s| ScoredSample {
            distance: euclidean_distance(&s.embedding, query),
            sample: s.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.sample.sample_id.cmp(&b.sample.sample_id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn sample(id: i64, embedding: Vec<f32>) -> ConfigSample {
        ConfigSample {
            sample_id: id,
            category: "test".into(),
            intent_text: format!("intent {id}"),
            config_payload: json!({}),
            extra_metadata: None,
            embedding,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn distance_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(euclidean_distance(&v, &v), 0.0);
    }

    #[test]
    fn distance_known_value() {
        // 3-4-5 triangle
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn distance_mismatched_lengths() {
        assert!(euclidean_distance(&[1.0], &[1.0, 2.0]).is_infinite());
        assert!(euclidean_distance(&[], &[]).is_infinite());
    }

    #[test]
    fn ranks_by_ascending_distance() {
        let samples = vec![
            sample(1, vec![0.0, 5.0]),
            sample(2, vec![1.0, 0.0]),
            sample(3, vec![0.0, 2.0]),
        ];
        let ranked = rank_nearest(&samples, &[0.0, 0.0], 10);
        let ids: Vec<i64> = ranked.iter().map(|s| s.sample.sample_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn ties_break_by_lower_sample_id() {
        let samples = vec![
            sample(9, vec![1.0, 0.0]),
            sample(4, vec![0.0, 1.0]),
            sample(7, vec![-1.0, 0.0]),
        ];
        let ranked = rank_nearest(&samples, &[0.0, 0.0], 3);
        let ids: Vec<i64> = ranked.iter().map(|s| s.sample.sample_id).collect();
        assert_eq!(ids, vec![4, 7, 9]);
    }

    #[test]
    fn nan_embedding_does_not_break_ordering() {
        let samples: Vec<ConfigSample> = (1..=40)
            .map(|id| match id % 3 {
                0 => sample(id, vec![f32::NAN, 0.0]),
                _ => sample(id, vec![id as f32, 0.0]),
            })
            .collect();
        let ranked = rank_nearest(&samples, &[0.0, 0.0], 40);
        assert_eq!(ranked.len(), 40);

        let finite: Vec<i64> = ranked
            .iter()
            .filter(|s| !s.distance.is_nan())
            .map(|s| s.sample.sample_id)
            .collect();
        let mut expected = finite.clone();
        expected.sort();
        assert_eq!(finite, expected);
    }

    #[test]
    fn respects_limit_and_skips_mismatched() {
        let samples = vec![
            sample(1, vec![1.0, 0.0]),
            sample(2, vec![1.0, 0.0, 0.0]),
            sample(3, vec![2.0, 0.0]),
        ];
        let ranked = rank_nearest(&samples, &[0.0, 0.0], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].sample.sample_id, 1);

        let all = rank_nearest(&samples, &[0.0, 0.0], 10);
        assert_eq!(all.len(), 2);
    }
}
