//! Flat vector index with exact inner-product search.
//!
//! Vectors are L2-normalized on insertion and queries are normalized before
//! scoring, so scores are cosine similarities in `[-1, 1]`. Results are ordered
//! by descending score, ties by ascending slot id.
//!
//! On-disk layout (little-endian):
//!
//! ```text
//! magic "VKIX" | u32 version | u32 dimension | u64 count | count * dimension f32
//! ```

use crate::ann::RandomProjectionIndex;
use crate::config::Number;
use crate::error::{Result, RetrievalError};
use crate::persist::write_atomic;
use crate::vector_ops::{dot_product_simd, normalize_vector};
use memmap2::Mmap;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::mem::size_of;
use std::path::Path;

const MAGIC: &[u8; 4] = b"VKIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

pub type Checksum = [u8; 32];

pub struct FlatIndex {
    dimension: usize,
    count: usize,
    data: Vec<Number>,
    ann: Option<RandomProjectionIndex>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            count: 0,
            data: Vec::new(),
            ann: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn vector(&self, slot: usize) -> Option<&[Number]> {
        if slot >= self.count {
            return None;
        }
        let start = slot * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Attach a random projection index over the current vectors. Later `add`
    /// calls keep it up to date.
    pub fn enable_ann(&mut self, num_tables: Option<usize>, num_projections: Option<usize>) {
        let mut ann =
            RandomProjectionIndex::new(self.dimension, self.count, num_tables, num_projections);
        for slot in 0..self.count {
            let start = slot * self.dimension;
            ann.add(&self.data[start..start + self.dimension], slot);
        }
        self.ann = Some(ann);
    }

    pub fn uses_ann(&self) -> bool {
        self.ann.is_some()
    }

    /// Append vectors in order and return their slot ids. Nothing is added
    /// unless every vector has the index dimension.
    pub fn add(&mut self, vectors: &[Vec<Number>]) -> Result<Vec<usize>> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let first = self.count;
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            let mut normalized = vector.clone();
            normalize_vector(&mut normalized);
            if let Some(ann) = self.ann.as_mut() {
                ann.add(&normalized, self.count);
            }
            self.data.extend_from_slice(&normalized);
            self.count += 1;
        }

        Ok((first..self.count).collect())
    }

    /// Up to `k` `(slot, score)` pairs, best first.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<(usize, Number)>> {
        if k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut normalized_query = query.to_vec();
        normalize_vector(&mut normalized_query);

        let search_range: Vec<usize> = match self.ann.as_ref() {
            Some(ann) => {
                let candidates = ann.candidates(&normalized_query);
                if candidates.len() >= k.min(self.count) {
                    candidates
                } else {
                    tracing::debug!(
                        found = candidates.len(),
                        k,
                        "too few ann candidates, falling back to exact scan"
                    );
                    (0..self.count).collect()
                }
            }
            None => (0..self.count).collect(),
        };

        let mut scored: Vec<(usize, Number)> = search_range
            .into_par_iter()
            .map(|slot| {
                let start = slot * self.dimension;
                let vector = &self.data[start..start + self.dimension];
                let score = dot_product_simd(&normalized_query, vector).unwrap_or(0.0);
                (slot, score)
            })
            .collect();

        scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * size_of::<Number>());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.count as u64).to_le_bytes());
        bytes.extend(self.data.iter().flat_map(|&num| num.to_le_bytes()));
        bytes
    }

    pub fn from_bytes(bytes: &[u8], expected_dimension: Option<usize>) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RetrievalError::IndexCorrupt(format!(
                "index file is {} bytes, shorter than its header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(RetrievalError::IndexCorrupt(
                "index file has an unknown magic number".into(),
            ));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(RetrievalError::IndexCorrupt(format!(
                "unsupported index format version {}",
                version
            )));
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        if dimension == 0 {
            return Err(RetrievalError::IndexCorrupt("index dimension is zero".into()));
        }
        if let Some(expected) = expected_dimension {
            if dimension != expected {
                return Err(RetrievalError::IndexCorrupt(format!(
                    "index dimension {} does not match expected {}",
                    dimension, expected
                )));
            }
        }

        let count = read_u64(&bytes[12..20]);
        let body_len = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dimension))
            .and_then(|n| n.checked_mul(size_of::<Number>()))
            .ok_or_else(|| RetrievalError::IndexCorrupt("index vector count overflows".into()))?;
        if bytes.len() - HEADER_LEN != body_len {
            return Err(RetrievalError::IndexCorrupt(format!(
                "index body is {} bytes, expected {}",
                bytes.len() - HEADER_LEN,
                body_len
            )));
        }

        let data: Vec<Number> = bytes[HEADER_LEN..]
            .chunks_exact(size_of::<Number>())
            .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self {
            dimension,
            count: count as usize,
            data,
            ann: None,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes())?.persist()
    }

    pub fn load(path: &Path, expected_dimension: Option<usize>) -> Result<Self> {
        Self::load_with_checksum(path, expected_dimension).map(|(index, _)| index)
    }

    /// Load an index file and return the SHA-256 of its bytes alongside it.
    pub(crate) fn load_with_checksum(
        path: &Path,
        expected_dimension: Option<usize>,
    ) -> Result<(Self, Checksum)> {
        let file = File::open(path).map_err(|e| RetrievalError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| RetrievalError::io(path, e))?
            .len();
        if (len as usize) < HEADER_LEN {
            return Err(RetrievalError::IndexCorrupt(format!(
                "'{}' is {} bytes, shorter than the index header",
                path.display(),
                len
            )));
        }

        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| RetrievalError::io(path, e))?;
        let index = Self::from_bytes(&mmap, expected_dimension)?;
        Ok((index, checksum(&mmap)))
    }
}

pub fn checksum(bytes: &[u8]) -> Checksum {
    Sha256::digest(bytes).into()
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
