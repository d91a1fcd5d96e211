use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::PqError;

/// Largest cluster count a subspace may use; codes are at most 16 bits wide.
pub const MAX_CLUSTERS: usize = 1 << 16;

/// What k-means does with a cluster that ends an iteration with no members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClusterPolicy {
    /// Keep the previous center unchanged.
    #[default]
    KeepStale,
    /// Move the center onto the sample that is farthest from its own center.
    ReseedFromWorstFit,
}

/// Product-quantization build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PqConfig {
    /// Number of subspaces (M). Must evenly divide the vector dimension.
    pub subspace_num: usize,
    /// Centers per subspace codebook (C). Determines the code width.
    pub clusters_per_subspace: usize,
    /// Upper bound on k-means iterations per subspace.
    pub max_iter: usize,
    /// Seed for center initialisation.
    pub seed: u64,
    pub empty_cluster_policy: EmptyClusterPolicy,
}

impl Default for PqConfig {
    fn default() -> Self {
        Self {
            subspace_num: 4,
            clusters_per_subspace: 256,
            max_iter: 20,
            seed: 0x5eed_cafe,
            empty_cluster_policy: EmptyClusterPolicy::KeepStale,
        }
    }
}

impl PqConfig {
    pub fn new(subspace_num: usize, clusters_per_subspace: usize) -> Self {
        Self {
            subspace_num,
            clusters_per_subspace,
            ..Self::default()
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster_policy = policy;
        self
    }

    /// Read a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self, PqError> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Width of each subspace for vectors of dimension `dim`.
    pub fn sub_dim(&self, dim: usize) -> Result<usize, PqError> {
        self.validate(dim)?;
        Ok(dim / self.subspace_num)
    }

    /// Check the configuration against vectors of dimension `dim`.
    pub fn validate(&self, dim: usize) -> Result<(), PqError> {
        if self.subspace_num == 0 {
            return Err(PqError::InvalidConfig("subspace_num must be positive"));
        }
        if dim == 0 {
            return Err(PqError::InvalidConfig("vector dimension must be positive"));
        }
        if dim % self.subspace_num != 0 {
            return Err(PqError::IndivisibleDimension {
                dim,
                subspaces: self.subspace_num,
            });
        }
        if self.clusters_per_subspace == 0 || self.clusters_per_subspace > MAX_CLUSTERS {
            return Err(PqError::InvalidConfig(
                "clusters_per_subspace must be between 1 and 65536",
            ));
        }
        if self.max_iter == 0 {
            return Err(PqError::InvalidConfig("max_iter must be positive"));
        }
        Ok(())
    }
}

/// Parameters for a single search call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub top_k: usize,
}

impl SearchParams {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new(10)
    }
}
