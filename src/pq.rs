use std::sync::atomic::{AtomicUsize, Ordering};

use rand::prelude::*;
use rayon::prelude::*;

use crate::codebook::Codebook;
use crate::codes::{CodeView, CodeWidth, PqCodes};
use crate::config::{PqConfig, SearchParams};
use crate::kmeans::{run_kmeans, KMeansResult};
use crate::lut::LookupTable;
use crate::topk::{SearchResult, TopK};
use crate::PqError;

/// Product-quantization index: one codebook per subspace plus one code per vector.
///
/// The index is immutable once built, so any number of threads may query
/// it concurrently. Each query builds and owns its own [`LookupTable`] and
/// [`TopK`].
#[derive(Debug, Clone, PartialEq)]
pub struct PqIndex {
    pub(crate) dim: usize,
    pub(crate) codebooks: Vec<Codebook>,
    pub(crate) codes: PqCodes,
}

impl PqIndex {
    /// Train codebooks on `data` and encode every vector.
    ///
    /// Each subspace is clustered independently with its own RNG derived
    /// from `config.seed`, so the result does not depend on the order in
    /// which subspaces finish.
    pub fn train(data: &[Vec<f32>], config: &PqConfig) -> Result<Self, PqError> {
        let dim = check_dataset(data)?;
        let sub_dim = config.sub_dim(dim)?;
        let width = CodeWidth::for_clusters(config.clusters_per_subspace).ok_or(
            PqError::InvalidConfig("clusters_per_subspace must be between 1 and 65536"),
        )?;
        let subspace_num = config.subspace_num;
        let clusters = config.clusters_per_subspace;

        if data.len() < clusters {
            log::warn!(
                "{} training vectors for {clusters} clusters per subspace; some clusters will stay unpopulated",
                data.len()
            );
        }
        log::info!(
            "Training {subspace_num} subspaces ({} vectors, sub-dim {sub_dim}, {clusters} clusters each)",
            data.len()
        );

        let completed = AtomicUsize::new(0);
        let trained: Vec<(Codebook, Vec<usize>)> = (0..subspace_num)
            .into_par_iter()
            .map(|s| {
                let range = s * sub_dim..(s + 1) * sub_dim;
                let sub_data: Vec<Vec<f32>> = data.iter().map(|v| v[range.clone()].to_vec()).collect();
                let mut rng = subspace_rng(config.seed, s);
                let KMeansResult {
                    centroids,
                    assignments,
                    iterations,
                    converged,
                    empty_clusters,
                } = run_kmeans(
                    &sub_data,
                    clusters,
                    config.max_iter,
                    &mut rng,
                    config.empty_cluster_policy,
                );

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!(
                    "Subspace {s} k-means finished ({done}/{subspace_num}, {iterations} iterations{})",
                    if converged { ", converged" } else { "" }
                );
                if empty_clusters > 0 {
                    log::warn!("Subspace {s}: {empty_clusters} of {clusters} clusters are empty");
                }

                let codebook = Codebook {
                    clusters,
                    dim: sub_dim,
                    centers: centroids,
                };
                (codebook, assignments)
            })
            .collect();

        let (codebooks, assignments): (Vec<Codebook>, Vec<Vec<usize>>) = trained.into_iter().unzip();
        let codes = PqCodes::from_assignments(width, &assignments);

        Ok(Self {
            dim,
            codebooks,
            codes,
        })
    }

    /// Train from a contiguous vector-major buffer of `len * dim` floats.
    pub fn train_from_buffer(
        buffer: &[f32],
        dim: usize,
        config: &PqConfig,
    ) -> Result<Self, PqError> {
        if dim == 0 || buffer.len() % dim != 0 {
            return Err(PqError::InvalidConfig(
                "buffer length must be a multiple of the dimension",
            ));
        }
        let data: Vec<Vec<f32>> = buffer.chunks_exact(dim).map(<[f32]>::to_vec).collect();
        Self::train(&data, config)
    }

    /// Encode `data` against externally trained codebooks.
    ///
    /// Each sub-vector is mapped to its nearest center by squared L2, the
    /// same rule k-means uses for assignment.
    pub fn train_with_codebooks(
        data: &[Vec<f32>],
        codebooks: Vec<Codebook>,
    ) -> Result<Self, PqError> {
        let dim = check_dataset(data)?;
        let width = check_codebooks(dim, &codebooks)?;
        let sub_dim = codebooks[0].dim;

        let encoded: Vec<Vec<usize>> = data
            .par_iter()
            .map(|vector| {
                codebooks
                    .iter()
                    .zip(vector.chunks_exact(sub_dim))
                    .map(|(codebook, sub_vector)| codebook.nearest(sub_vector))
                    .collect()
            })
            .collect();

        let mut codes = PqCodes::new(width, codebooks.len());
        for code in &encoded {
            codes.push(code);
        }

        Ok(Self {
            dim,
            codebooks,
            codes,
        })
    }

    /// Assemble an index from codebooks and codes produced elsewhere.
    pub fn from_parts(
        dim: usize,
        codebooks: Vec<Codebook>,
        codes: PqCodes,
    ) -> Result<Self, PqError> {
        let width = check_codebooks(dim, &codebooks)?;
        if codes.subspace_num() != codebooks.len() {
            return Err(PqError::InvalidConfig(
                "code length must equal the number of codebooks",
            ));
        }
        if codes.width().max_clusters() < width.max_clusters() {
            return Err(PqError::InvalidConfig(
                "code width cannot address every cluster",
            ));
        }
        for (s, codebook) in codebooks.iter().enumerate() {
            if let Some(max) = codes.max_in_subspace(s) {
                if max >= codebook.clusters {
                    return Err(PqError::InvalidConfig(
                        "codes reference clusters missing from the codebook",
                    ));
                }
            }
        }
        Ok(Self {
            dim,
            codebooks,
            codes,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn subspace_num(&self) -> usize {
        self.codebooks.len()
    }

    pub fn sub_dim(&self) -> usize {
        self.dim / self.codebooks.len()
    }

    /// Number of encoded vectors.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Check whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codebooks(&self) -> &[Codebook] {
        &self.codebooks
    }

    pub fn codes(&self) -> &PqCodes {
        &self.codes
    }

    /// Concatenate the centers selected by the code of vector `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id >= self.len()`.
    pub fn reconstruct(&self, id: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        for (s, codebook) in self.codebooks.iter().enumerate() {
            out.extend_from_slice(codebook.center(self.codes.get(id, s)));
        }
        out
    }

    /// Build the per-subspace lookup tables for `query`.
    pub fn build_lut(&self, query: &[f32]) -> Result<LookupTable, PqError> {
        if query.len() != self.dim {
            return Err(PqError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        Ok(LookupTable::build(query, &self.codebooks))
    }

    /// Approximate top-k by ascending inner-product distance.
    pub fn search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, PqError> {
        if self.is_empty() {
            return Err(PqError::EmptyIndex);
        }
        let lut = self.build_lut(query)?;
        self.search_with_lut(&lut, params)
    }

    /// Scan every code with prebuilt tables.
    ///
    /// The scan is a single linear pass: no coarse quantizer or pruning.
    /// `lut` must come from this index's codebooks: one table per subspace,
    /// each with one entry per cluster.
    pub fn search_with_lut(
        &self,
        lut: &LookupTable,
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, PqError> {
        if lut.subspace_num() != self.subspace_num() {
            return Err(PqError::DimensionMismatch {
                expected: self.subspace_num(),
                got: lut.subspace_num(),
            });
        }
        let tables_fit = self
            .codebooks
            .iter()
            .enumerate()
            .all(|(s, codebook)| lut.table(s).len() == codebook.clusters);
        if !tables_fit {
            return Err(PqError::InvalidConfig(
                "lookup table sizes do not match the codebooks",
            ));
        }

        let subspace_num = self.subspace_num();
        Ok(match self.codes.view() {
            CodeView::U8(codes) => scan(lut, codes, subspace_num, params.top_k),
            CodeView::U16(codes) => scan(lut, codes, subspace_num, params.top_k),
        })
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

fn scan<T: Copy + Into<usize>>(
    lut: &LookupTable,
    codes: &[T],
    subspace_num: usize,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut topk = TopK::new(top_k);
    for (id, code) in codes.chunks_exact(subspace_num).enumerate() {
        topk.push(lut.distance(code), id);
    }
    topk.into_sorted_vec()
}

fn subspace_rng(seed: u64, subspace: usize) -> StdRng {
    let salt = (subspace as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    StdRng::seed_from_u64(seed ^ salt)
}

fn check_dataset(data: &[Vec<f32>]) -> Result<usize, PqError> {
    if data.is_empty() {
        return Err(PqError::InvalidConfig(
            "training data must be non-empty",
        ));
    }
    let dim = data[0].len();
    if data.iter().any(|v| v.len() != dim) {
        return Err(PqError::InvalidConfig(
            "input vectors must share the same dimension",
        ));
    }
    Ok(dim)
}

/// Validate codebooks against the full dimension and return the code width they need.
pub(crate) fn check_codebooks(dim: usize, codebooks: &[Codebook]) -> Result<CodeWidth, PqError> {
    if codebooks.is_empty() {
        return Err(PqError::InvalidConfig("at least one codebook is required"));
    }
    if codebooks.iter().any(|c| !c.is_consistent()) {
        return Err(PqError::InvalidConfig(
            "codebook cluster count does not match its centers",
        ));
    }
    let sub_dim = codebooks[0].dim;
    if codebooks.iter().any(|c| c.dim != sub_dim) {
        return Err(PqError::InvalidConfig(
            "codebooks must share the same sub-dimension",
        ));
    }
    if sub_dim * codebooks.len() != dim {
        return Err(PqError::IndivisibleDimension {
            dim,
            subspaces: codebooks.len(),
        });
    }
    let max_clusters = codebooks.iter().map(|c| c.clusters).max().unwrap_or(0);
    CodeWidth::for_clusters(max_clusters).ok_or(PqError::InvalidConfig(
        "codebooks may hold at most 65536 clusters",
    ))
}
