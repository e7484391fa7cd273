//! Replicated operations.
//!
//! Operations are the only unit of replication. Slots are indices into a
//! node's atom sequence.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};

/// A single edit against the document tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new root node holding `atom` at `slot`.
    InsertRoot { id: NodeId, slot: u32, atom: char },
    /// Create a new node under `parent`'s atom at `parent_slot`.
    InsertNew {
        parent: NodeId,
        parent_slot: u32,
        id: NodeId,
        slot: u32,
        atom: char,
    },
    /// Fill an uninitialized slot of an existing node.
    Insert { id: NodeId, slot: u32, atom: char },
    /// Tombstone the atom at `slot`.
    Delete { id: NodeId, slot: u32 },
}

impl Operation {
    /// The node this operation writes into.
    pub fn target(&self) -> NodeId {
        match self {
            Operation::InsertRoot { id, .. }
            | Operation::InsertNew { id, .. }
            | Operation::Insert { id, .. }
            | Operation::Delete { id, .. } => *id,
        }
    }

    pub fn slot(&self) -> u32 {
        match self {
            Operation::InsertRoot { slot, .. }
            | Operation::InsertNew { slot, .. }
            | Operation::Insert { slot, .. }
            | Operation::Delete { slot, .. } => *slot,
        }
    }

    pub fn is_insert(&self) -> bool {
        !matches!(self, Operation::Delete { .. })
    }

    /// Whether the operation mints a brand-new node.
    pub fn creates_node(&self) -> bool {
        matches!(
            self,
            Operation::InsertRoot { .. } | Operation::InsertNew { .. }
        )
    }
}
