//! In-memory vector index and the retriever bound to it.
//!
//! The index is built once per uploaded document and never mutated afterwards; replacing the
//! active document means building a fresh index. Search is an exact cosine-similarity scan,
//! which is plenty for the few hundred chunks a single PDF produces.

use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index construction received no chunks.
    #[error("cannot build an index from zero chunks")]
    Empty,
    /// A vector did not match the dimension of the rest of the index.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension shared by the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Vectors of zero length cannot be compared.
    #[error("vectors must have at least one dimension")]
    ZeroDimension,
}

/// Chunk text and its embedding, ready to be indexed.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Position of the chunk within its source document.
    pub position: usize,
    /// Raw chunk text.
    pub text: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Search hit returned by [`VectorIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Position of the chunk within its source document.
    pub position: usize,
    /// Cosine similarity between the query and the chunk.
    pub score: f32,
    /// Chunk text.
    pub text: String,
}

/// Immutable set of normalised chunk vectors.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// Build an index, normalising every vector and validating that all share one dimension.
    pub fn from_entries(entries: Vec<IndexedChunk>) -> Result<Self, IndexError> {
        let dimension = entries.first().ok_or(IndexError::Empty)?.vector.len();
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }

        let mut normalised = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            normalise(&mut entry.vector);
            normalised.push(entry);
        }

        Ok(Self {
            dimension,
            entries: normalised,
        })
    }

    /// Number of chunks held by the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks. Always `false` for a successfully built index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every vector in the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return up to `k` chunks ordered by descending cosine similarity to `query`.
    ///
    /// Ties keep document order so results are stable across runs.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalise(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| (slot, dot(&query, &entry.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(k.min(self.entries.len()))
            .map(|(slot, score)| {
                let entry = &self.entries[slot];
                ScoredChunk {
                    position: entry.position,
                    score,
                    text: entry.text.clone(),
                }
            })
            .collect())
    }
}

/// Similarity retriever bound to a single index.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl Retriever {
    /// Bind a retriever returning `top_k` chunks per query (at least one).
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }

    /// Number of chunks returned per query.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Index this retriever searches.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Retrieve the most similar chunks for an embedded query.
    pub fn retrieve(&self, query: &[f32]) -> Result<Vec<ScoredChunk>, IndexError> {
        self.index.search(query, self.top_k)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalise(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
