//! Exact flat inner-product index.
//!
//! Vectors are L2-normalized on insert, so the inner product against a
//! normalized query is the cosine similarity. Every query scans every row.
//! Rows keep insertion order; position `i` is row `i` of the metadata table.

/// Position reported for result slots that have no matching row.
pub const NO_MATCH: i64 = -1;

/// One search hit: a row position and its inner-product score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row position, or [`NO_MATCH`] for padding slots
    pub position: i64,
    pub score: f32,
}

impl Neighbor {
    pub fn is_match(&self) -> bool {
        self.position != NO_MATCH
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Result count must be at least 1, got {0}")]
    InvalidK(usize),
}

/// Flat index over unit vectors, stored row-major.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    row_ids: Vec<u64>,
    vectors: Vec<f32>,
    zero_rows: usize,
}

impl FlatIndex {
    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions,
            row_ids: Vec::with_capacity(capacity),
            vectors: Vec::with_capacity(capacity * dimensions),
            zero_rows: 0,
        }
    }

    /// Build an index from an embedding matrix, one row per id, in order.
    pub fn build(
        dimensions: usize,
        row_ids: &[u64],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::with_capacity(dimensions, embeddings.len());
        for (&row_id, embedding) in row_ids.iter().zip(embeddings) {
            index.add(row_id, embedding)?;
        }
        if index.zero_rows > 0 {
            log::warn!("{} zero-norm vectors stored as zeros", index.zero_rows);
        }
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.row_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_ids.is_empty()
    }

    /// Rows that had zero norm and were stored as zero vectors.
    pub fn zero_rows(&self) -> usize {
        self.zero_rows
    }

    /// Stable row id stored at `position`.
    pub fn row_id(&self, position: usize) -> Option<u64> {
        self.row_ids.get(position).copied()
    }

    pub fn row_ids(&self) -> &[u64] {
        &self.row_ids
    }

    /// Iterate over `(row_id, vector)` in position order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> {
        self.row_ids
            .iter()
            .copied()
            .zip(self.vectors.chunks_exact(self.dimensions.max(1)))
    }

    /// Append a vector. It is normalized in place; a zero vector is kept as zeros.
    pub fn add(&mut self, row_id: u64, mut embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if l2_normalize(&mut embedding) < f32::EPSILON {
            self.zero_rows += 1;
        }

        self.row_ids.push(row_id);
        self.vectors.extend_from_slice(&embedding);
        Ok(())
    }

    /// The `k` rows with the highest inner product against `query`.
    ///
    /// Returns `min(k, len + 1)` entries, best first. Equal scores keep
    /// position order. When the index holds fewer than `k` rows a single
    /// [`NO_MATCH`] slot closes the list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK(k));
        }
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = self
            .iter()
            .enumerate()
            .map(|(position, (_, vector))| Neighbor {
                position: position as i64,
                score: inner_product(query, vector),
            })
            .collect();

        // stable: ties stay in position order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        // padding is bounded by the row count so any k >= 1 is safe
        let width = k.min(self.len().saturating_add(1));
        hits.resize(
            width,
            Neighbor {
                position: NO_MATCH,
                score: f32::NEG_INFINITY,
            },
        );

        Ok(hits)
    }

    /// Rebuild from stored parts. Vectors are trusted to be normalized already.
    pub(crate) fn from_parts(dimensions: usize, row_ids: Vec<u64>, vectors: Vec<f32>) -> Self {
        let zero_rows = vectors
            .chunks_exact(dimensions.max(1))
            .filter(|v| v.iter().all(|x| *x == 0.0))
            .count();
        Self {
            dimensions,
            row_ids,
            vectors,
            zero_rows,
        }
    }
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide `v` by its L2 norm in place and return the original norm.
/// A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = l2_norm(v);
    if norm >= f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
