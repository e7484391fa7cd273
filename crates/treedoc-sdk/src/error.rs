//! Error types for the Treedoc SDK.

use crate::network::NetworkError;
use thiserror::Error;
use treedoc_core::SiteId;
use treedoc_tree::TreeError;

/// Error type for replica operations.
#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote operation could not be applied; the replica has diverged and
    /// refuses further work.
    #[error("Replica {0} is faulted")]
    Faulted(SiteId),
}

/// Result type for replica operations.
pub type Result<T> = std::result::Result<T, ReplicaError>;
