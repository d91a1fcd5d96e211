use crate::kmeans::nearest_centroid;
use crate::PqError;

/// Cluster centers for one subspace.
///
/// `centers[c]` is the center of cluster `c` and has length `dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    pub clusters: usize,
    pub dim: usize,
    pub centers: Vec<Vec<f32>>,
}

impl Codebook {
    /// Wrap a set of centers, checking that they share one dimension.
    pub fn new(centers: Vec<Vec<f32>>) -> Result<Self, PqError> {
        let Some(first) = centers.first() else {
            return Err(PqError::InvalidConfig("codebook must hold at least one center"));
        };
        let dim = first.len();
        if dim == 0 {
            return Err(PqError::InvalidConfig("codebook centers must be non-empty"));
        }
        if centers.iter().any(|c| c.len() != dim) {
            return Err(PqError::InvalidConfig(
                "codebook centers must share the same dimension",
            ));
        }
        Ok(Self {
            clusters: centers.len(),
            dim,
            centers,
        })
    }

    #[inline]
    pub fn center(&self, cluster: usize) -> &[f32] {
        &self.centers[cluster]
    }

    /// Cluster whose center is closest to `sub_vector` in squared L2.
    pub fn nearest(&self, sub_vector: &[f32]) -> usize {
        nearest_centroid(sub_vector, &self.centers).0
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.clusters > 0
            && self.clusters == self.centers.len()
            && self.centers.iter().all(|c| c.len() == self.dim)
    }
}
