//! Text to vector conversion.
//!
//! The store only depends on the [`Embedder`] trait. [`HashingEmbedder`] is the
//! built-in, fully local implementation: signed feature hashing of word unigrams
//! and bigrams, L2-normalized, so that inner product equals cosine similarity.

use crate::config::{Number, DEFAULT_EMBEDDING_MODEL};
use crate::error::{Result, RetrievalError};
use crate::vector_ops::normalize_vector;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

/// Deterministic text embedder with a fixed output dimension.
pub trait Embedder: Send + Sync {
    /// Embed a single text. Empty input yields a zero vector, never an error.
    fn embed(&self, text: &str) -> Result<Vec<Number>>;

    /// Embed many texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize;

    /// Identifier persisted with the artifacts so a store is never queried with a different model.
    fn model_id(&self) -> &str;
}

const BIGRAM_WEIGHT: Number = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrievalError::Config(
                "embedder dimension must be greater than zero".into(),
            ));
        }
        Ok(Self { dimension })
    }

    fn accumulate(&self, feature: &str, weight: Number, vector: &mut [Number]) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let mut vector = vec![0.0; self.dimension];
        let tokens = tokenize(text);

        for token in &tokens {
            self.accumulate(token, 1.0, &mut vector);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&bigram, BIGRAM_WEIGHT, &mut vector);
        }

        normalize_vector(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>> {
        texts.par_iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        DEFAULT_EMBEDDING_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_ops::dot_product_simd;

    #[test]
    fn embedding_is_deterministic_and_unit_length() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let a = embedder.embed("The attention mechanism weighs tokens").unwrap();
        let b = embedder.embed("The attention mechanism weighs tokens").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        for text in ["", "   ", "?!"] {
            let v = embedder.embed(text).unwrap();
            assert_eq!(v.len(), 16);
            assert!(v.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let embedder = HashingEmbedder::new(32).unwrap();
        assert_eq!(
            embedder.embed("Rust, ownership!").unwrap(),
            embedder.embed("rust ownership").unwrap()
        );
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = HashingEmbedder::new(256).unwrap();
        let query = embedder.embed("vector index persistence").unwrap();
        let near = embedder.embed("the vector index supports persistence to disk").unwrap();
        let far = embedder.embed("bananas grow in tropical climates").unwrap();
        let near_score = dot_product_simd(&query, &near).unwrap();
        let far_score = dot_product_simd(&query, &far).unwrap();
        assert!(near_score > far_score);
    }

    #[test]
    fn batch_preserves_order() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let texts = ["alpha", "beta", "", "gamma delta"];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), texts.len());
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(&embedder.embed(text).unwrap(), vector);
        }
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }
}
