pub mod codebook;
pub mod codes;
pub mod config;
pub mod flat;
pub mod io;
pub mod kmeans;
pub mod lut;
pub mod math;
pub mod persist;
pub mod pq;
pub mod simd;
pub mod topk;

pub use codebook::Codebook;
pub use codes::{CodeWidth, PqCodes};
pub use config::{EmptyClusterPolicy, PqConfig, SearchParams};
pub use flat::FlatIndex;
pub use lut::LookupTable;
pub use pq::PqIndex;
pub use topk::{SearchResult, TopK};


/// Errors that can occur when building, persisting or querying a PQ index.
#[derive(thiserror::Error, Debug)]
pub enum PqError {
    /// Returned when the dimension of an input vector does not match the index.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when the vector dimension cannot be split into equal subspaces.
    #[error("dimension {dim} is not divisible by {subspaces} subspaces")]
    IndivisibleDimension { dim: usize, subspaces: usize },
    /// Returned when an invalid configuration or input shape is supplied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Returned when a query is issued against an index holding no vectors.
    #[error("index is empty; train it before searching")]
    EmptyIndex,
    /// Returned when persistence encounters an I/O failure.
    #[error("i/o error while reading or writing an index: {0}")]
    Io(#[from] std::io::Error),
    /// Returned when the persisted bytes are inconsistent or corrupt.
    #[error("invalid persisted index: {0}")]
    InvalidPersistence(&'static str),
    /// Returned when a JSON configuration file cannot be parsed.
    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),
}
