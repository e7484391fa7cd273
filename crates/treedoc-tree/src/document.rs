//! Treedoc - the replicated document tree.
//!
//! Every character lives in an [`Atom`] slot of a node. A node owns a growable
//! sequence of atoms; each atom can carry a *disambiguator list* of child nodes
//! that render before the atom's own character. Roots form a forest sorted by
//! [`NodeId`], and every disambiguator list is sorted the same way, so replicas
//! that applied the same operations render the same string no matter the
//! arrival order of concurrent inserts.
//!
//! Nodes live in an arena and refer to each other by index. Nothing is ever
//! removed: a delete only tombstones an atom.
//!
//! ```text
//! render(node) = for atom in node.atoms:
//!                    for child in atom.children: render(child)
//!                    if atom is Alive: emit atom.value
//! ```

use crate::atom::{Atom, AtomState, NodeIndex};
use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;
use treedoc_core::{NodeId, Operation, SiteId};

/// Default cap on characters per node.
pub const DEFAULT_MAX_ATOMS_PER_NODE: usize = 65535;

/// Tuning knobs for a [`Document`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Characters per node are capped to bound per-node linear scans. Once a
    /// node is full, even same-site typing branches into a child node hung
    /// from the slot just past the cap.
    pub max_atoms_per_node: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_atoms_per_node: DEFAULT_MAX_ATOMS_PER_NODE,
        }
    }
}

/// A change in the linear text, reported for every tree mutation so a display
/// buffer can follow along without re-rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edit {
    Insert { position: usize, value: char },
    Delete { position: usize },
}

/// Structural counters, mostly for diagnostics and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub alive: usize,
    pub dead: usize,
    pub uninitialized: usize,
    pub height: usize,
}

#[derive(Clone, Debug)]
struct DocNode {
    id: NodeId,
    atoms: Vec<Atom>,
    /// Parent node and the slot this node hangs from. `None` for roots.
    parent: Option<(NodeIndex, usize)>,
    size: usize,
}

/// Traversal step used by the explicit-stack walks.
enum Visit {
    Node(NodeIndex),
    Char(char),
}

/// The replicated document.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<DocNode>,
    index: HashMap<NodeId, NodeIndex>,
    /// Root nodes, sorted by id.
    roots: Vec<NodeIndex>,
    size: usize,
    /// Next unused node counter per site.
    counters: HashMap<SiteId, u32>,
    config: DocumentConfig,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            roots: Vec::new(),
            size: 0,
            counters: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Number of visible characters.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Look up an atom by identity.
    pub fn atom(&self, id: &NodeId, slot: u32) -> Option<&Atom> {
        let idx = *self.index.get(id)?;
        self.nodes[idx].atoms.get(slot as usize)
    }

    /// Alive atoms in the subtree rooted at `id`.
    pub fn node_size(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).map(|&idx| self.nodes[idx].size)
    }

    /// The node and slot `id` hangs from, or `None` for roots and unknown ids.
    pub fn parent_of(&self, id: &NodeId) -> Option<(NodeId, u32)> {
        let idx = *self.index.get(id)?;
        self.nodes[idx]
            .parent
            .map(|(parent, slot)| (self.nodes[parent].id, slot as u32))
    }

    /// Ids of the root nodes, in forest order.
    pub fn root_ids(&self) -> Vec<NodeId> {
        self.roots.iter().map(|&idx| self.nodes[idx].id).collect()
    }

    /// The id a new node minted by `site` would get.
    pub fn next_id(&self, site: SiteId) -> NodeId {
        NodeId::new(site, self.counters.get(&site).copied().unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------

    /// Apply a local or remote operation.
    ///
    /// Returns the resulting [`Edit`], or `None` when the operation was a
    /// repeated delete. On error the document is left untouched.
    pub fn apply_operation(&mut self, op: &Operation) -> Result<Option<Edit>> {
        match *op {
            Operation::InsertRoot { id, slot, atom } => {
                let slot = self.check_slot(slot)?;
                if self.index.contains_key(&id) {
                    return Err(TreeError::DuplicateNode(id));
                }
                let pos = self
                    .roots
                    .binary_search_by(|&r| self.nodes[r].id.cmp(&id))
                    .unwrap_or_else(|p| p);
                let idx = self.alloc_node(id, None);
                self.roots.insert(pos, idx);
                trace!(node = %id, "created root node");
                self.activate(idx, slot, atom)
            }
            Operation::InsertNew {
                parent,
                parent_slot,
                id,
                slot,
                atom,
            } => {
                let parent_idx = self.lookup(&parent)?;
                let parent_slot = self.check_branch_slot(parent_slot)?;
                let slot = self.check_slot(slot)?;
                if self.index.contains_key(&id) {
                    return Err(TreeError::DuplicateNode(id));
                }
                self.ensure_slot(parent_idx, parent_slot);
                let pos = {
                    let siblings = &self.nodes[parent_idx].atoms[parent_slot].children;
                    siblings
                        .binary_search_by(|&c| self.nodes[c].id.cmp(&id))
                        .unwrap_or_else(|p| p)
                };
                let idx = self.alloc_node(id, Some((parent_idx, parent_slot)));
                self.nodes[parent_idx].atoms[parent_slot]
                    .children
                    .insert(pos, idx);
                trace!(node = %id, parent = %parent, parent_slot, "created child node");
                self.activate(idx, slot, atom)
            }
            Operation::Insert { id, slot, atom } => {
                let idx = self.lookup(&id)?;
                let slot_idx = self.check_slot(slot)?;
                let occupied = self.nodes[idx]
                    .atoms
                    .get(slot_idx)
                    .is_some_and(|a| a.state != AtomState::Uninitialized);
                if occupied {
                    return Err(TreeError::SlotOccupied { id, slot });
                }
                self.ensure_slot(idx, slot_idx);
                self.activate(idx, slot_idx, atom)
            }
            Operation::Delete { id, slot } => {
                let idx = self.lookup(&id)?;
                let slot_idx = slot as usize;
                match self.nodes[idx].atoms.get(slot_idx).map(|a| a.state) {
                    Some(AtomState::Alive) => {}
                    Some(AtomState::Dead) => return Ok(None),
                    _ => return Err(TreeError::NotAlive { id, slot }),
                }
                let position = self.position_of_index(idx, slot_idx);
                self.nodes[idx].atoms[slot_idx].state = AtomState::Dead;
                self.propagate(idx, slot_idx, false);
                Ok(Some(Edit::Delete { position }))
            }
        }
    }

    fn lookup(&self, id: &NodeId) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or(TreeError::UnknownNode(*id))
    }

    fn check_slot(&self, slot: u32) -> Result<usize> {
        let max = self.config.max_atoms_per_node;
        let idx = slot as usize;
        if idx >= max {
            return Err(TreeError::SlotOutOfRange { slot, max });
        }
        Ok(idx)
    }

    /// A node may carry one extra, never-filled slot at the cap that only
    /// holds children, so a full node can still be branched after.
    fn check_branch_slot(&self, slot: u32) -> Result<usize> {
        let max = self.config.max_atoms_per_node;
        let idx = slot as usize;
        if idx > max {
            return Err(TreeError::SlotOutOfRange { slot, max });
        }
        Ok(idx)
    }

    fn alloc_node(&mut self, id: NodeId, parent: Option<(NodeIndex, usize)>) -> NodeIndex {
        let idx = self.nodes.len();
        self.nodes.push(DocNode {
            id,
            atoms: Vec::new(),
            parent,
            size: 0,
        });
        self.index.insert(id, idx);
        let next = self.counters.entry(id.site).or_insert(0);
        *next = (*next).max(id.counter.saturating_add(1));
        idx
    }

    /// Grow the atom sequence with placeholders so `slot` exists.
    fn ensure_slot(&mut self, idx: NodeIndex, slot: usize) {
        let atoms = &mut self.nodes[idx].atoms;
        if atoms.len() <= slot {
            atoms.resize_with(slot + 1, Atom::placeholder);
        }
    }

    fn activate(&mut self, idx: NodeIndex, slot: usize, value: char) -> Result<Option<Edit>> {
        self.ensure_slot(idx, slot);
        let atom = &mut self.nodes[idx].atoms[slot];
        atom.state = AtomState::Alive;
        atom.value = Some(value);
        self.propagate(idx, slot, true);
        let position = self.position_of_index(idx, slot);
        Ok(Some(Edit::Insert { position, value }))
    }

    /// Adjust sizes by one from the atom at `(idx, slot)` up to the document.
    fn propagate(&mut self, idx: NodeIndex, slot: usize, grow: bool) {
        let step = |value: &mut usize| {
            if grow {
                *value += 1;
            } else {
                *value -= 1;
            }
        };

        let mut cursor = Some((idx, slot));
        while let Some((node_idx, slot)) = cursor {
            let node = &mut self.nodes[node_idx];
            step(&mut node.atoms[slot].size);
            step(&mut node.size);
            cursor = node.parent;
        }
        step(&mut self.size);
    }

    // ------------------------------------------------------------------
    // Position <-> identity translation
    // ------------------------------------------------------------------

    /// Linear position of an atom: the number of Alive atoms before it.
    pub fn position_of(&self, id: &NodeId, slot: u32) -> Option<usize> {
        let idx = *self.index.get(id)?;
        let slot = slot as usize;
        if slot >= self.nodes[idx].atoms.len() {
            return None;
        }
        Some(self.position_of_index(idx, slot))
    }

    fn position_of_index(&self, idx: NodeIndex, slot: usize) -> usize {
        let node = &self.nodes[idx];
        let mut position: usize = node.atoms[..slot].iter().map(|a| a.size).sum::<usize>()
            + node.atoms[slot].children_size();

        let mut current = idx;
        while let Some((parent_idx, parent_slot)) = self.nodes[current].parent {
            let parent = &self.nodes[parent_idx];
            position += parent.atoms[..parent_slot]
                .iter()
                .map(|a| a.size)
                .sum::<usize>();
            position += self.size_before(
                &parent.atoms[parent_slot].children,
                &self.nodes[current].id,
            );
            current = parent_idx;
        }
        position + self.size_before(&self.roots, &self.nodes[current].id)
    }

    /// Total size of the entries of a sorted node list that sort before `id`.
    fn size_before(&self, list: &[NodeIndex], id: &NodeId) -> usize {
        list.iter()
            .map(|&i| &self.nodes[i])
            .take_while(|n| n.id < *id)
            .map(|n| n.size)
            .sum()
    }

    /// Find the Alive atom at `position`.
    fn locate(&self, mut position: usize) -> Option<(NodeIndex, usize)> {
        if position >= self.size {
            return None;
        }

        let mut list: &[NodeIndex] = &self.roots;
        'descend: loop {
            let mut chosen = None;
            for &candidate in list {
                let size = self.nodes[candidate].size;
                if position < size {
                    chosen = Some(candidate);
                    break;
                }
                position -= size;
            }
            let node_idx = chosen?;

            for (slot, atom) in self.nodes[node_idx].atoms.iter().enumerate() {
                let below = atom.children_size();
                if position < below {
                    list = &atom.children;
                    continue 'descend;
                }
                position -= below;
                if atom.is_alive() {
                    if position == 0 {
                        return Some((node_idx, slot));
                    }
                    position -= 1;
                }
            }
            return None;
        }
    }

    /// Identity of the Alive atom at `position`.
    pub fn id_at_position(&self, position: usize) -> Option<(NodeId, u32)> {
        self.locate(position)
            .map(|(idx, slot)| (self.nodes[idx].id, slot as u32))
    }

    pub fn char_at(&self, position: usize) -> Option<char> {
        self.locate(position)
            .and_then(|(idx, slot)| self.nodes[idx].atoms[slot].value)
    }

    /// Insert `value` so it ends up at `position`, apply it, and return the
    /// operation to broadcast.
    ///
    /// Sequential typing by the same site fills the next slot of the node it
    /// is already writing into; anything else branches into a new child node.
    pub fn insert_at_position(
        &mut self,
        site: SiteId,
        position: usize,
        value: char,
    ) -> Result<Operation> {
        if position > self.size {
            return Err(TreeError::PositionOutOfBounds {
                position,
                length: self.size,
            });
        }
        let op = self.plan_insert(site, position, value)?;
        self.apply_operation(&op)?;
        Ok(op)
    }

    fn plan_insert(&self, site: SiteId, position: usize, value: char) -> Result<Operation> {
        let cap = self.config.max_atoms_per_node;
        let before = position.checked_sub(1).and_then(|p| self.locate(p));
        let after = self.locate(position);

        if let Some((node_idx, slot)) = before {
            let node = &self.nodes[node_idx];
            let next = slot + 1;
            // Only the children of the next slot sit between `before` and it.
            let (free, clear) = match node.atoms.get(next) {
                None => (true, true),
                Some(atom) => (
                    atom.state == AtomState::Uninitialized,
                    atom.children_size() == 0,
                ),
            };
            if clear && free && next < cap && node.id.site == site {
                return Ok(Operation::Insert {
                    id: node.id,
                    slot: next as u32,
                    atom: value,
                });
            }
            if clear {
                return Ok(Operation::InsertNew {
                    parent: node.id,
                    parent_slot: next as u32,
                    id: self.next_id(site),
                    slot: 0,
                    atom: value,
                });
            }
        }

        // `after` is the first visible atom past `before`, so its own
        // children are empty.
        if let Some((node_idx, slot)) = after {
            let node = &self.nodes[node_idx];
            if node.atoms[slot].children_size() == 0 {
                return Ok(Operation::InsertNew {
                    parent: node.id,
                    parent_slot: slot as u32,
                    id: self.next_id(site),
                    slot: 0,
                    atom: value,
                });
            }
        }

        // Nothing visible anywhere: any new root renders at position 0.
        Ok(Operation::InsertRoot {
            id: self.next_id(site),
            slot: 0,
            atom: value,
        })
    }

    /// Tombstone the character at `position`, apply it, and return the
    /// operation to broadcast.
    pub fn delete_at_position(&mut self, position: usize) -> Result<Operation> {
        let (idx, slot) = self
            .locate(position)
            .ok_or(TreeError::PositionOutOfBounds {
                position,
                length: self.size,
            })?;
        let op = Operation::Delete {
            id: self.nodes[idx].id,
            slot: slot as u32,
        };
        self.apply_operation(&op)?;
        Ok(op)
    }

    // ------------------------------------------------------------------
    // Rendering and introspection
    // ------------------------------------------------------------------

    /// The canonical document string.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.size);
        let mut stack: Vec<Visit> = self
            .roots
            .iter()
            .rev()
            .filter(|&&r| self.nodes[r].size > 0)
            .map(|&r| Visit::Node(r))
            .collect();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Char(c) => out.push(c),
                Visit::Node(idx) => {
                    for atom in self.nodes[idx].atoms.iter().rev() {
                        if atom.is_alive() {
                            if let Some(c) = atom.value {
                                stack.push(Visit::Char(c));
                            }
                        }
                        for &child in atom.children.iter().rev() {
                            if self.nodes[child].size > 0 {
                                stack.push(Visit::Node(child));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Depth of the deepest node; roots are at depth 0.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack: Vec<(NodeIndex, usize)> = self.roots.iter().map(|&r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            height = height.max(depth);
            for atom in &self.nodes[idx].atoms {
                stack.extend(atom.children.iter().map(|&c| (c, depth + 1)));
            }
        }
        height
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            nodes: self.nodes.len(),
            height: self.height(),
            ..Default::default()
        };
        for atom in self.nodes.iter().flat_map(|n| n.atoms.iter()) {
            match atom.state {
                AtomState::Alive => stats.alive += 1,
                AtomState::Dead => stats.dead += 1,
                AtomState::Uninitialized => stats.uninitialized += 1,
            }
        }
        stats
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
