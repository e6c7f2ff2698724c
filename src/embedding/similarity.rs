use crate::embedding::{Embedder, EmbeddingResult};

/// Cosine similarity of two vectors
///
/// Returns 0.0 when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Cosine distance, `1 - cosine_similarity`
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Index and distance of the candidate closest to `vector`
///
/// Ties resolve to the first occurrence. Returns None for an empty list.
///
/// # Example
///
/// ```
/// use spider_walker::embedding::nearest;
///
/// let candidates = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]];
/// let (index, distance) = nearest(&[1.0, 0.0], &candidates).unwrap();
/// assert_eq!(index, 0);
/// assert!(distance.abs() < 1e-6);
/// ```
pub fn nearest(vector: &[f32], candidates: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let distance = cosine_distance(vector, candidate);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }

    best
}

/// Embeds `query` and returns the nearest corpus entry
pub async fn most_similar(
    embedder: &dyn Embedder,
    query: &str,
    corpus: &[Vec<f32>],
) -> EmbeddingResult<Option<(usize, f32)>> {
    let vector = embedder.embed(query).await?;
    Ok(nearest(&vector, corpus))
}
