//! Per-query lookup tables for asymmetric distance computation.
//!
//! For a query `q` split into sub-vectors `q_s`, table `s` stores
//! `1 - dot(q_s, center)` for every center of codebook `s`. The approximate
//! distance of an encoded vector is then `Σ_s table[s][code[s]]`.

use crate::codebook::Codebook;
use crate::simd::inner_product_distance;

/// Lookup tables built for one query. Never shared between queries.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    tables: Vec<Vec<f32>>,
}

impl LookupTable {
    /// Build one table per codebook.
    ///
    /// `query.len()` must equal the sum of the codebook widths.
    pub fn build(query: &[f32], codebooks: &[Codebook]) -> Self {
        let mut tables = Vec::with_capacity(codebooks.len());
        let mut offset = 0usize;
        for codebook in codebooks {
            let query_sub = &query[offset..offset + codebook.dim];
            tables.push(build_subspace_table(query_sub, codebook));
            offset += codebook.dim;
        }
        debug_assert_eq!(offset, query.len());
        Self { tables }
    }

    pub fn subspace_num(&self) -> usize {
        self.tables.len()
    }

    /// Table for subspace `subspace`, indexed by cluster id.
    pub fn table(&self, subspace: usize) -> &[f32] {
        &self.tables[subspace]
    }

    /// Sum of table entries selected by `code`.
    ///
    /// `code` must hold one in-range cluster id per table. Callers scanning an
    /// index go through [`crate::PqIndex::search_with_lut`], which checks the
    /// table shapes once up front.
    #[inline]
    pub fn distance<T: Copy + Into<usize>>(&self, code: &[T]) -> f32 {
        debug_assert_eq!(code.len(), self.tables.len());
        code.iter()
            .zip(self.tables.iter())
            .map(|(&cluster, table)| table[cluster.into()])
            .sum()
    }
}

fn build_subspace_table(query_sub: &[f32], codebook: &Codebook) -> Vec<f32> {
    codebook
        .centers
        .iter()
        .map(|center| inner_product_distance(query_sub, center))
        .collect()
}
