//! Error types for the document tree.

use thiserror::Error;
use treedoc_core::NodeId;

/// Errors that can occur when mutating the document tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Slot {slot} of node {id} is already initialized")]
    SlotOccupied { id: NodeId, slot: u32 },

    #[error("Slot {slot} of node {id} is not alive")]
    NotAlive { id: NodeId, slot: u32 },

    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Slot {slot} exceeds the limit of {max} atoms per node")]
    SlotOutOfRange { slot: u32, max: usize },

    #[error("Invalid position: {position} (length: {length})")]
    PositionOutOfBounds { position: usize, length: usize },
}

impl TreeError {
    /// Whether the error proves that an operation was delivered out of
    /// causal order or was never valid. Such errors are unrecoverable for the
    /// replica that sees them.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, TreeError::PositionOutOfBounds { .. })
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
