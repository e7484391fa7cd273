//! Pending-operation queue with causal delivery.
//!
//! An element is deliverable when two conditions hold against the local
//! vector `V`:
//!
//! ```text
//! elem.version == V[elem.site] + 1      // next from its origin (site-FIFO)
//! V >= elem.vector                      // everything it saw has arrived
//! ```
//!
//! `elem.vector` is the sender's vector *before* it counted the operation, so
//! `elem.vector[elem.site] == elem.version - 1`.
//!
//! Delivering one element can unblock others, so the buffer is rescanned
//! until nothing more becomes ready.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use treedoc_core::{SiteId, VersionVector};

/// A remote operation waiting for causal delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueElem<O> {
    pub op: O,
    /// Origin replica.
    pub site: SiteId,
    /// Per-origin sequence number, starting at 1.
    pub version: u64,
    /// The origin's version vector when it generated `op`.
    pub vector: VersionVector,
}

impl<O> QueueElem<O> {
    pub fn new(op: O, site: SiteId, version: u64, vector: VersionVector) -> Self {
        Self {
            op,
            site,
            version,
            vector,
        }
    }

    /// Check if this element can be delivered on top of `local`.
    pub fn is_ready(&self, local: &VersionVector) -> bool {
        self.version == local.get(&self.site) + 1 && local.dominates(&self.vector)
    }

    /// Check if `local` already counts this element.
    pub fn is_delivered(&self, local: &VersionVector) -> bool {
        self.version <= local.get(&self.site)
    }
}

/// Buffer of operations that arrived ahead of their causal dependencies.
#[derive(Debug, Clone)]
pub struct CausalQueue<O> {
    pending: Vec<QueueElem<O>>,
}

impl<O> CausalQueue<O> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Offer a received element.
    ///
    /// Returns every element that became deliverable, in the order they must
    /// be applied. `local` is advanced for each returned element, so the
    /// caller must apply all of them.
    ///
    /// Elements already counted by `local`, and copies of elements already
    /// buffered, are dropped.
    pub fn enqueue(&mut self, elem: QueueElem<O>, local: &mut VersionVector) -> Vec<QueueElem<O>> {
        if elem.is_delivered(local) {
            warn!(site = %elem.site, version = elem.version, "dropping already delivered operation");
            return Vec::new();
        }
        if self.contains(&elem.site, elem.version) {
            warn!(site = %elem.site, version = elem.version, "dropping duplicate of buffered operation");
            return Vec::new();
        }
        if !elem.is_ready(local) {
            trace!(
                site = %elem.site,
                version = elem.version,
                have = local.get(&elem.site),
                "buffering operation until its dependencies arrive"
            );
            self.pending.push(elem);
            return Vec::new();
        }

        local.increment_to(elem.site, elem.version);
        let mut ready = vec![elem];
        self.release(local, &mut ready);
        ready
    }

    /// Move every element that is now deliverable from the buffer into
    /// `ready`, repeating until no element changes state.
    fn release(&mut self, local: &mut VersionVector, ready: &mut Vec<QueueElem<O>>) {
        while let Some(idx) = self.pending.iter().position(|p| p.is_ready(local)) {
            let elem = self.pending.remove(idx);
            trace!(site = %elem.site, version = elem.version, "releasing buffered operation");
            local.increment_to(elem.site, elem.version);
            ready.push(elem);
        }
    }

    fn contains(&self, site: &SiteId, version: u64) -> bool {
        self.pending
            .iter()
            .any(|p| p.site == *site && p.version == version)
    }

    /// Number of buffered elements.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffered elements, in arrival order.
    pub fn pending(&self) -> impl Iterator<Item = &QueueElem<O>> {
        self.pending.iter()
    }
}

impl<O> Default for CausalQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}
