//! Atom slots.

use serde::{Deserialize, Serialize};

/// Arena index of a node inside a [`crate::Document`].
pub(crate) type NodeIndex = usize;

/// Lifecycle of one character slot: `Uninitialized -> Alive -> Dead`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomState {
    Uninitialized,
    Alive,
    /// Tombstone: kept so later operations can still address the slot.
    Dead,
}

/// One character slot of a node.
#[derive(Clone, Debug)]
pub struct Atom {
    pub(crate) state: AtomState,
    pub(crate) value: Option<char>,
    /// Alive atoms in this slot's subtree: the atom itself plus its children.
    pub(crate) size: usize,
    /// Disambiguator list, sorted ascending by child `NodeId`.
    pub(crate) children: Vec<NodeIndex>,
}

impl Atom {
    pub(crate) fn placeholder() -> Self {
        Self {
            state: AtomState::Uninitialized,
            value: None,
            size: 0,
            children: Vec::new(),
        }
    }

    pub fn state(&self) -> AtomState {
        self.state
    }

    /// The character, kept for tombstones as well.
    pub fn value(&self) -> Option<char> {
        self.value
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_alive(&self) -> bool {
        self.state == AtomState::Alive
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Alive atoms hanging below this slot, excluding the atom itself.
    pub(crate) fn children_size(&self) -> usize {
        self.size - usize::from(self.is_alive())
    }
}
