//! Exact (brute-force) nearest-neighbor index over squared L2 distance.
//!
//! Vectors live in one contiguous row-major buffer; position `i` in the index
//! is the `i`-th vector ever added. The on-disk form is self-describing:
//!
//! ```text
//! magic "PVIX" | version u32 | dimension u32 | count u64 | count*dimension f32 | sha256
//! ```
//!
//! All integers and floats are little-endian. The trailing SHA-256 covers every
//! preceding byte.

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::mem::size_of;
use std::path::Path;
use tracing::debug;

use crate::config::Number;
use crate::error::IndexError;
use crate::vector_ops::squared_l2_simd;

const MAGIC: &[u8; 4] = b"PVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const DIGEST_LEN: usize = 32;

/// Position reported for result slots that have no stored vector behind them.
pub const NO_MATCH: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index position, or [`NO_MATCH`]
    pub position: i64,
    /// Squared L2 distance to the query
    pub distance: Number,
}

impl Neighbor {
    fn no_match() -> Self {
        Self {
            position: NO_MATCH,
            distance: Number::INFINITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<Number>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors; zero for a fresh index.
    pub fn count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Appends vectors in order. Nothing is added if any vector has the wrong length.
    pub fn add(&mut self, vectors: &[Vec<Number>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[Number]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns exactly `k` neighbors by ascending distance. When `k` exceeds the
    /// number of stored vectors the tail is padded with [`NO_MATCH`] entries.
    ///
    /// The sort is stable, so exact ties come back in position order.
    pub fn search(&self, query: &[Number], k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        if self.dimension == 0 || query.len() != self.dimension {
            debug!(
                expected = self.dimension,
                actual = query.len(),
                "Query dimension mismatch"
            );
            return vec![Neighbor::no_match(); k];
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position: position as i64,
                distance: squared_l2_simd(query, vector),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        scored.resize(k, Neighbor::no_match());
        scored
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.count();
        let mut bytes =
            Vec::with_capacity(HEADER_LEN + self.data.len() * size_of::<Number>() + DIGEST_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(count as u64).to_le_bytes());
        bytes.extend(self.data.iter().flat_map(|&num| num.to_le_bytes()));
        let digest = Sha256::digest(&bytes);
        bytes.extend_from_slice(&digest);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN + DIGEST_LEN {
            return Err(IndexError::Truncated {
                expected: HEADER_LEN + DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::BadMagic);
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u64(&bytes[12..20]) as usize;

        let body_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(size_of::<Number>()))
            .ok_or(IndexError::Truncated {
                expected: usize::MAX,
                actual: bytes.len(),
            })?;
        let expected = HEADER_LEN + body_len + DIGEST_LEN;
        if bytes.len() != expected {
            return Err(IndexError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }

        let (payload, digest) = bytes.split_at(HEADER_LEN + body_len);
        if Sha256::digest(payload).as_slice() != digest {
            return Err(IndexError::ChecksumMismatch);
        }

        let data = payload[HEADER_LEN..]
            .chunks_exact(size_of::<Number>())
            .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    pub fn read_from(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN + DIGEST_LEN {
            return Err(IndexError::Truncated {
                expected: HEADER_LEN + DIGEST_LEN,
                actual: len,
            });
        }
        // The file is only read while mapped and is replaced by rename, never rewritten in place.
        let mmap = unsafe { Mmap::map(&file)? };
        let index = Self::from_bytes(&mmap)?;
        debug!(
            path = %path.display(),
            count = index.count(),
            dim = index.dimension,
            "Read vector index"
        );
        Ok(index)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
