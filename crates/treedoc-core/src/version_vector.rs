//! Version vector for causal context tracking.
//!
//! A version vector records the highest contiguous counter received from each
//! site. Missing sites read as zero, so an empty vector is the causal bottom.

use crate::id::SiteId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of comparing two version vectors under the causal partial order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CausalOrder {
    /// Every entry is `<=` and at least one is `<`.
    LessThan,
    /// Every entry is `>=` and at least one is `>`.
    GreaterThan,
    Equal,
    /// One site is ahead while another is behind.
    Conflict,
}

impl CausalOrder {
    /// The ordering seen from the other side of the comparison.
    pub fn reverse(self) -> Self {
        match self {
            CausalOrder::LessThan => CausalOrder::GreaterThan,
            CausalOrder::GreaterThan => CausalOrder::LessThan,
            other => other,
        }
    }
}

/// A version vector tracking the frontier of seen operations per site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    /// Map from site to highest contiguous counter.
    entries: BTreeMap<SiteId, u64>,
}

impl VersionVector {
    /// Create an empty version vector.
    pub fn new() -> Self {
        VersionVector {
            entries: BTreeMap::new(),
        }
    }

    /// Create a version vector from entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (SiteId, u64)>) -> Self {
        VersionVector {
            entries: entries.into_iter().filter(|(_, seq)| *seq > 0).collect(),
        }
    }

    /// Get the counter for a site (absent sites read as 0).
    pub fn get(&self, site: &SiteId) -> u64 {
        self.entries.get(site).copied().unwrap_or(0)
    }

    /// Increment the counter for a site, returning the new value.
    pub fn increment(&mut self, site: SiteId) -> u64 {
        let entry = self.entries.entry(site).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Raise the counter for a site to `counter`. Never lowers it.
    pub fn increment_to(&mut self, site: SiteId, counter: u64) {
        if counter == 0 {
            return;
        }
        let entry = self.entries.entry(site).or_insert(0);
        *entry = (*entry).max(counter);
    }

    /// Merge with another version vector (component-wise max).
    pub fn merge(&mut self, other: &VersionVector) {
        for (site, &seq) in &other.entries {
            self.increment_to(*site, seq);
        }
    }

    /// Compare under the causal partial order.
    pub fn compare(&self, other: &VersionVector) -> CausalOrder {
        let sites: BTreeSet<&SiteId> = self.entries.keys().chain(other.entries.keys()).collect();

        let mut ahead = false;
        let mut behind = false;
        for site in sites {
            let ours = self.get(site);
            let theirs = other.get(site);
            if ours > theirs {
                ahead = true;
            } else if ours < theirs {
                behind = true;
            }
            if ahead && behind {
                return CausalOrder::Conflict;
            }
        }

        match (ahead, behind) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::GreaterThan,
            (false, true) => CausalOrder::LessThan,
            (true, true) => CausalOrder::Conflict,
        }
    }

    /// Check if this vector has seen everything `other` has.
    /// Returns true if for all sites, self[s] >= other[s].
    pub fn dominates(&self, other: &VersionVector) -> bool {
        matches!(
            self.compare(other),
            CausalOrder::GreaterThan | CausalOrder::Equal
        )
    }

    /// Iterate over all non-zero entries in site order.
    pub fn iter(&self) -> impl Iterator<Item = (&SiteId, &u64)> {
        self.entries.iter()
    }

    /// Get the number of sites tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the version vector is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the sum of all counters (total operations seen).
    pub fn total_operations(&self) -> u64 {
        self.entries.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(n: u128) -> SiteId {
        SiteId::from_u128(n)
    }

    #[test]
    fn test_version_vector_basic() {
        let mut vv = VersionVector::new();
        assert_eq!(vv.get(&site(1)), 0);

        vv.increment_to(site(1), 5);
        assert_eq!(vv.get(&site(1)), 5);

        let seq = vv.increment(site(1));
        assert_eq!(seq, 6);
        assert_eq!(vv.get(&site(1)), 6);

        vv.increment_to(site(1), 3);
        assert_eq!(vv.get(&site(1)), 6, "increment_to never lowers");
    }

    #[test]
    fn test_compare_orders() {
        let a = VersionVector::from_entries([(site(1), 5), (site(2), 3)]);
        let b = VersionVector::from_entries([(site(1), 3), (site(2), 3)]);
        let c = VersionVector::from_entries([(site(1), 3), (site(2), 5)]);

        assert_eq!(a.compare(&b), CausalOrder::GreaterThan);
        assert_eq!(b.compare(&a), CausalOrder::LessThan);
        assert_eq!(a.compare(&a.clone()), CausalOrder::Equal);
        assert_eq!(a.compare(&c), CausalOrder::Conflict);
        assert_eq!(c.compare(&a), CausalOrder::Conflict);
    }

    #[test]
    fn test_missing_entries_are_zero() {
        let empty = VersionVector::new();
        let explicit_zero = VersionVector::from_entries([(site(1), 0)]);
        assert_eq!(empty.compare(&explicit_zero), CausalOrder::Equal);

        let one = VersionVector::from_entries([(site(4), 1)]);
        assert_eq!(empty.compare(&one), CausalOrder::LessThan);
        assert_eq!(one.compare(&empty), CausalOrder::GreaterThan);

        let other = VersionVector::from_entries([(site(5), 1)]);
        assert_eq!(one.compare(&other), CausalOrder::Conflict);
    }

    #[test]
    fn test_version_vector_merge() {
        let mut vv1 = VersionVector::from_entries([(site(1), 5), (site(2), 3)]);
        let vv2 = VersionVector::from_entries([(site(1), 3), (site(2), 7), (site(3), 1)]);

        vv1.merge(&vv2);
        assert_eq!(vv1.get(&site(1)), 5);
        assert_eq!(vv1.get(&site(2)), 7);
        assert_eq!(vv1.get(&site(3)), 1);
        assert!(vv1.dominates(&vv2));
        assert_eq!(vv1.total_operations(), 13);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = VersionVector::from_entries([(site(1), 1)]);
        let copy = original.clone();
        original.increment(site(1));

        assert_eq!(copy.get(&site(1)), 1);
        assert_eq!(original.get(&site(1)), 2);
    }

    #[test]
    fn test_version_vector_serialization() {
        let vv = VersionVector::from_entries([(site(1), 5), (site(2), 10)]);

        let json = serde_json::to_string(&vv).unwrap();
        let deserialized: VersionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(vv, deserialized);
    }
}
