//! Append-only log of applied operations.
//!
//! Every operation a replica applies, local or remote, is written here with
//! its origin and per-origin version. A peer that reports its version vector
//! can then be sent exactly the entries it lacks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use treedoc_core::{SiteId, VersionVector};

/// One applied operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry<O> {
    pub site: SiteId,
    pub version: u64,
    pub op: O,
}

/// Operations in the order this replica applied them.
///
/// Per origin site, versions appear in increasing order since causal
/// delivery is site-FIFO.
#[derive(Debug, Clone)]
pub struct OperationLog<O> {
    entries: Vec<LogEntry<O>>,
    sites: BTreeSet<SiteId>,
}

impl<O> OperationLog<O> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            sites: BTreeSet::new(),
        }
    }

    pub fn write(&mut self, site: SiteId, version: u64, op: O) {
        self.sites.insert(site);
        self.entries.push(LogEntry { site, version, op });
    }

    /// Entries the holder of `peer` has not seen, oldest first.
    ///
    /// Scans from the newest entry backwards. A site is settled at its first
    /// entry the peer already has, since everything older from that site is
    /// covered too. The scan ends once every logged site is settled.
    pub fn missing_operations(&self, peer: &VersionVector) -> Vec<LogEntry<O>>
    where
        O: Clone,
    {
        let mut settled = BTreeSet::new();
        let mut missing = Vec::new();

        for entry in self.entries.iter().rev() {
            if settled.len() == self.sites.len() {
                break;
            }
            if settled.contains(&entry.site) {
                continue;
            }
            if entry.version > peer.get(&entry.site) {
                missing.push(entry.clone());
            } else {
                settled.insert(entry.site);
            }
        }

        missing.reverse();
        missing
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in application order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry<O>> {
        self.entries.iter()
    }

    /// Sites with at least one logged entry.
    pub fn sites(&self) -> impl Iterator<Item = &SiteId> {
        self.sites.iter()
    }
}

impl<O> Default for OperationLog<O> {
    fn default() -> Self {
        Self::new()
    }
}
