//! Property-based tests for the version vector partial order.
//!
//! These laws are what the causal delivery queue relies on:
//!  - compare is consistent under swapped arguments
//!  - merge is commutative, associative and idempotent
//!  - merge produces an upper bound of both inputs

use proptest::prelude::*;
use treedoc_core::{CausalOrder, NodeId, SiteId, VersionVector};

fn vector_strategy() -> impl Strategy<Value = VersionVector> {
    prop::collection::vec((0u128..4, 0u64..6), 0..6).prop_map(|entries| {
        let mut vv = VersionVector::new();
        for (site, seq) in entries {
            vv.increment_to(SiteId::from_u128(site), seq);
        }
        vv
    })
}

proptest! {
    #[test]
    fn compare_is_consistent_when_swapped(
        a in vector_strategy(),
        b in vector_strategy()
    ) {
        prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
    }

    #[test]
    fn compare_equal_iff_same_entries(
        a in vector_strategy(),
        b in vector_strategy()
    ) {
        prop_assert_eq!(a.compare(&b) == CausalOrder::Equal, a == b);
    }

    #[test]
    fn merge_is_commutative(
        a in vector_strategy(),
        b in vector_strategy()
    ) {
        let mut left = a.clone();
        left.merge(&b);
        let mut right = b.clone();
        right.merge(&a);
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_is_associative(
        a in vector_strategy(),
        b in vector_strategy(),
        c in vector_strategy()
    ) {
        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent(a in vector_strategy()) {
        let mut merged = a.clone();
        merged.merge(&a);
        prop_assert_eq!(merged, a);
    }

    #[test]
    fn merge_is_upper_bound(
        a in vector_strategy(),
        b in vector_strategy()
    ) {
        let mut merged = a.clone();
        merged.merge(&b);
        prop_assert!(merged.dominates(&a));
        prop_assert!(merged.dominates(&b));
    }

    #[test]
    fn node_id_bytes_preserve_order(
        s1 in any::<u128>(), c1 in any::<u32>(),
        s2 in any::<u128>(), c2 in any::<u32>()
    ) {
        let a = NodeId::new(SiteId::from_u128(s1), c1);
        let b = NodeId::new(SiteId::from_u128(s2), c2);
        prop_assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
        prop_assert_eq!(NodeId::from_bytes(a.to_bytes()), a);
    }
}
