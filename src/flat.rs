use rayon::prelude::*;

use crate::config::SearchParams;
use crate::simd::inner_product_distance;
use crate::topk::{SearchResult, TopK};
use crate::PqError;

/// Exhaustive inner-product index over raw vectors.
///
/// Vectors are stored contiguously in vector-major order. Search scores
/// every stored vector with the SIMD kernel, so results are exact and serve
/// as ground truth for the PQ index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index from a set of equally sized vectors.
    pub fn new(data: &[Vec<f32>]) -> Result<Self, PqError> {
        if data.is_empty() {
            return Err(PqError::InvalidConfig("flat index requires non-empty data"));
        }
        let dim = data[0].len();
        if dim == 0 {
            return Err(PqError::InvalidConfig("vector dimension must be positive"));
        }
        if data.iter().any(|v| v.len() != dim) {
            return Err(PqError::InvalidConfig(
                "input vectors must share the same dimension",
            ));
        }
        Ok(Self {
            dim,
            data: data.concat(),
        })
    }

    /// Adopt a contiguous buffer of `len * dim` floats.
    pub fn from_buffer(buffer: Vec<f32>, dim: usize) -> Result<Self, PqError> {
        if dim == 0 {
            return Err(PqError::InvalidConfig("vector dimension must be positive"));
        }
        if buffer.is_empty() || buffer.len() % dim != 0 {
            return Err(PqError::InvalidConfig(
                "buffer length must be a positive multiple of the dimension",
            ));
        }
        Ok(Self { dim, data: buffer })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Check whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stored vector `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id >= self.len()`.
    pub fn vector(&self, id: usize) -> &[f32] {
        &self.data[id * self.dim..(id + 1) * self.dim]
    }

    /// Exact top-k by ascending inner-product distance.
    pub fn search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, PqError> {
        if query.len() != self.dim {
            return Err(PqError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut topk = TopK::new(params.top_k);
        for (id, vector) in self.data.chunks_exact(self.dim).enumerate() {
            topk.push(inner_product_distance(vector, query), id);
        }
        Ok(topk.into_sorted_vec())
    }

    /// Run independent searches in parallel.
    pub fn search_batch(
        &self,
        queries: &[Vec<f32>],
        params: SearchParams,
    ) -> Result<Vec<Vec<SearchResult>>, PqError> {
        queries
            .par_iter()
            .map(|query| self.search(query, params))
            .collect()
    }
}
