use rand::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use std::collections::{BTreeSet, HashMap};

use crate::config::Number;
use crate::vector_ops::dot_product_simd;

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 2;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 1;
const MAX_TABLES: usize = 8;
// Bucket keys are u64 bitmasks with one bit per projection.
const MAX_HASH_BITS: usize = 63;

/// Locality-sensitive hashing over random hyperplanes.
///
/// Only produces candidate slots; the caller rescores them exactly. The
/// hyperplanes come from a fixed seed, so rebuilding from the same vectors
/// after a load gives the same buckets.
pub struct RandomProjectionIndex {
    random_vectors: Vec<Vec<Number>>,
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
    num_tables: usize,
    num_projections: usize,
}

impl RandomProjectionIndex {
    pub fn new(
        dim: usize,
        data_size: usize,
        num_tables: Option<usize>,
        num_projections: Option<usize>,
    ) -> Self {
        let (auto_projections, auto_tables) = Self::calculate_params(data_size);
        let num_projections = num_projections
            .unwrap_or(auto_projections)
            .clamp(1, MAX_HASH_BITS);
        let num_tables = num_tables.unwrap_or(auto_tables).max(1);
        tracing::debug!(num_projections, num_tables, "building random projection index");

        let mut rng = StdRng::seed_from_u64(SEED);

        let random_vectors: Vec<Vec<Number>> = (0..num_tables * num_projections)
            .map(|_| StandardNormal.sample_iter(&mut rng).take(dim).collect())
            .collect();

        RandomProjectionIndex {
            random_vectors,
            hash_tables: vec![HashMap::new(); num_tables],
            num_tables,
            num_projections,
        }
    }

    fn calculate_params(data_size: usize) -> (usize, usize) {
        let log_size = (data_size.max(1) as f64).log2() as usize;
        let num_projections = (log_size + 2).clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = (log_size / 2 + 2).clamp(MIN_TABLES, MAX_TABLES);
        (num_projections, num_tables)
    }

    fn hash_vector(&self, vector: &[Number], table_index: usize) -> u64 {
        let start = table_index * self.num_projections;
        let end = start + self.num_projections;

        self.random_vectors[start..end]
            .iter()
            .map(|rv| dot_product_simd(rv, vector).unwrap_or(0.0))
            .enumerate()
            .fold(0u64, |acc, (i, proj)| {
                if proj >= 0.0 {
                    acc | (1 << i)
                } else {
                    acc
                }
            })
    }

    pub fn add(&mut self, vector: &[Number], slot: usize) {
        for i in 0..self.num_tables {
            let hash = self.hash_vector(vector, i);
            self.hash_tables[i].entry(hash).or_default().push(slot);
        }
    }

    /// Candidate slots from the query's bucket and every bucket one bit away, ascending.
    pub fn candidates(&self, query: &[Number]) -> Vec<usize> {
        let mut candidates = BTreeSet::new();

        for i in 0..self.num_tables {
            let query_hash = self.hash_vector(query, i);

            if let Some(bucket) = self.hash_tables[i].get(&query_hash) {
                candidates.extend(bucket.iter().copied());
            }

            // Multi-probe
            for j in 0..self.num_projections {
                let neighbor_hash = query_hash ^ (1 << j);
                if let Some(bucket) = self.hash_tables[i].get(&neighbor_hash) {
                    candidates.extend(bucket.iter().copied());
                }
            }
        }

        tracing::debug!(count = candidates.len(), "ann candidates");
        candidates.into_iter().collect()
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn num_projections(&self) -> usize {
        self.num_projections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vector_is_always_a_candidate() {
        let mut index = RandomProjectionIndex::new(8, 3, None, None);
        let vectors: [[f32; 8]; 3] = [
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        for (slot, v) in vectors.iter().enumerate() {
            index.add(v, slot);
        }
        for (slot, v) in vectors.iter().enumerate() {
            assert!(index.candidates(v).contains(&slot));
        }
    }

    #[test]
    fn same_seed_gives_same_buckets() {
        let v: [f32; 4] = [0.3, -0.2, 0.9, 0.1];
        let a = RandomProjectionIndex::new(4, 100, None, None);
        let b = RandomProjectionIndex::new(4, 100, None, None);
        for t in 0..a.num_tables() {
            assert_eq!(a.hash_vector(&v, t), b.hash_vector(&v, t));
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let index = RandomProjectionIndex::new(4, 1_000_000, Some(3), Some(5));
        assert_eq!(index.num_tables(), 3);
        assert_eq!(index.num_projections(), 5);
    }

    #[test]
    fn out_of_range_overrides_are_clamped() {
        let mut index = RandomProjectionIndex::new(4, 10, Some(0), Some(200));
        assert_eq!(index.num_tables(), 1);
        assert_eq!(index.num_projections(), MAX_HASH_BITS);

        let v: [f32; 4] = [0.5, -0.5, 0.25, 1.0];
        index.add(&v, 0);
        assert_eq!(index.candidates(&v), vec![0]);

        let index = RandomProjectionIndex::new(4, 10, None, Some(0));
        assert_eq!(index.num_projections(), 1);
    }
}
