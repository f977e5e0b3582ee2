use std::hash::{DefaultHasher, Hash, Hasher};

use crate::evidence::normalize_content;

const DEFAULT_DIMS: usize = 1024;

/// Maps evidence text to a vector whose cosine similarity tracks content overlap.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashed bag of unigrams and bigrams, L2-normalised.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dims as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let normalized = normalize_content(text);
        let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

        let mut vector = vec![0.0f32; self.dims];
        for token in &tokens {
            vector[self.bucket(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            vector[self.bucket(&format!("{} {}", pair[0], pair[1]))] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

/// Cosine similarity; zero when either vector is empty or all zeros.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_similarity_one() {
        let e = HashingEmbedder::default();
        let a = e.embed("Semaglutide reduced body weight by 15 percent");
        let b = e.embed("semaglutide REDUCED body weight, by 15 percent.");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn one_extra_word_stays_close() {
        let e = HashingEmbedder::default();
        let a = e.embed("Drug X reduced mortality in condition Y patients over twelve months");
        let b = e.embed("Drug X reduced mortality in condition Y patients over twelve months abstract");
        assert!(cosine(&a, &b) > 0.9);
    }

    #[test]
    fn unrelated_text_is_far_apart() {
        let e = HashingEmbedder::default();
        let a = e.embed("Metformin improves insulin sensitivity in type 2 diabetes");
        let b = e.embed("Statin therapy lowers LDL cholesterol among elderly cohorts");
        assert!(cosine(&a, &b) < 0.3);
    }

    #[test]
    fn embeddings_are_unit_length() {
        let v = HashingEmbedder::new(64).embed("aspirin aspirin stroke prevention");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_similarity_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[], &[]), 0.0);
    }
}
