//! Causal delivery tests.
//!
//! These tests drive the queue and the log the way a replica does: operations
//! generated on several sites are delivered out of order, duplicated and
//! late, and every replica must still end up with the same document.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use treedoc_causal::{CausalQueue, OperationLog, QueueElem};
use treedoc_core::{Operation, SiteId, VersionVector};
use treedoc_tree::{Document, DocumentConfig};

fn site(n: u128) -> SiteId {
    SiteId::from_u128(n)
}

#[test]
fn test_queue_releases_buffered_run() {
    let origin = site(1);
    let mut queue = CausalQueue::new();
    let mut local = VersionVector::new();

    let make = |version: u64| {
        let vector = VersionVector::from_entries([(origin, version - 1)]);
        QueueElem::new(version, origin, version, vector)
    };

    for version in [2, 3, 4] {
        assert!(queue.enqueue(make(version), &mut local).is_empty());
    }
    assert_eq!(queue.len(), 3);

    let released: Vec<u64> = queue
        .enqueue(make(1), &mut local)
        .into_iter()
        .map(|e| e.op)
        .collect();
    assert_eq!(released, vec![1, 2, 3, 4]);
    assert!(queue.is_empty());
    assert_eq!(local.get(&origin), 4);
}

#[test]
fn test_missing_operations_for_lagging_peer() {
    let (a, b, c) = (site(1), site(2), site(3));
    let mut log = OperationLog::new();
    log.write(a, 1, "a1");
    log.write(b, 1, "b1");
    log.write(a, 2, "a2");
    log.write(c, 1, "c1");
    log.write(b, 2, "b2");
    log.write(a, 3, "a3");

    // The peer is current on b but behind on a and has never heard from c.
    let peer = VersionVector::from_entries([(a, 1), (b, 2)]);
    let missing: Vec<(SiteId, u64, &str)> = log
        .missing_operations(&peer)
        .into_iter()
        .map(|e| (e.site, e.version, e.op))
        .collect();

    assert_eq!(missing, vec![(a, 2, "a2"), (c, 1, "c1"), (a, 3, "a3")]);
}

#[test]
fn test_missing_operations_replay_through_queue() {
    let (a, b) = (site(1), site(2));
    let mut log = OperationLog::new();
    let mut sender = VersionVector::new();
    for (origin, op) in [(a, 'x'), (b, 'y'), (a, 'z')] {
        let version = sender.increment(origin);
        log.write(origin, version, op);
    }

    let mut peer = VersionVector::new();
    let mut queue = CausalQueue::new();
    let mut snapshot = VersionVector::new();
    let mut applied = Vec::new();
    for entry in log.missing_operations(&peer) {
        let elem = QueueElem::new(entry.op, entry.site, entry.version, snapshot.clone());
        snapshot.increment_to(entry.site, entry.version);
        applied.extend(queue.enqueue(elem, &mut peer).into_iter().map(|e| e.op));
    }

    assert_eq!(applied, vec!['x', 'y', 'z']);
    assert_eq!(peer, sender);
}

// ============================================================================
// Delivery order properties
// ============================================================================

/// Build a history over three sites. Each step is `(origin, caught_up)`:
/// a caught-up origin has seen every earlier operation before generating.
fn history(steps: &[(u128, bool)]) -> (Vec<QueueElem<usize>>, VersionVector) {
    let mut views: Vec<VersionVector> = (0..3).map(|_| VersionVector::new()).collect();
    let mut everything = VersionVector::new();
    let mut out = Vec::new();

    for (i, &(n, caught_up)) in steps.iter().enumerate() {
        let origin = site(n + 1);
        let view = &mut views[n as usize];
        if caught_up {
            view.merge(&everything);
        }
        let snapshot = view.clone();
        let version = view.increment(origin);
        everything.increment_to(origin, version);
        out.push(QueueElem::new(i, origin, version, snapshot));
    }
    (out, everything)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn queue_releases_each_element_once_in_causal_order(
        steps in prop::collection::vec((0u128..3, any::<bool>()), 1..40),
        seed in any::<u64>(),
        duplicates in 0usize..10,
    ) {
        let (sent, everything) = history(&steps);

        let mut arrivals = sent.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..duplicates {
            let elem = sent[rng.gen_range(0..sent.len())].clone();
            arrivals.push(elem);
        }
        arrivals.shuffle(&mut rng);

        let mut queue = CausalQueue::new();
        let mut local = VersionVector::new();
        let mut released = Vec::new();
        for elem in arrivals {
            released.extend(queue.enqueue(elem, &mut local));
        }

        prop_assert!(queue.is_empty());
        prop_assert_eq!(&local, &everything);

        let mut seen: Vec<usize> = released.iter().map(|e| e.op).collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..sent.len()).collect::<Vec<_>>());

        // Replay the release order against a fresh vector.
        let mut check = VersionVector::new();
        for elem in &released {
            prop_assert_eq!(elem.version, check.get(&elem.site) + 1);
            prop_assert!(check.dominates(&elem.vector));
            check.increment(elem.site);
        }
    }
}

// ============================================================================
// Replicated editing through the queue
// ============================================================================

struct Site {
    id: SiteId,
    doc: Document,
    vector: VersionVector,
    queue: CausalQueue<Operation>,
    log: OperationLog<Operation>,
}

impl Site {
    fn new(id: SiteId, config: DocumentConfig) -> Self {
        Self {
            id,
            doc: Document::with_config(config),
            vector: VersionVector::new(),
            queue: CausalQueue::new(),
            log: OperationLog::new(),
        }
    }

    fn edit(&mut self, rng: &mut StdRng) -> Option<QueueElem<Operation>> {
        let op = if self.doc.is_empty() || rng.gen_bool(0.7) {
            let pos = rng.gen_range(0..=self.doc.len());
            let ch = rng.gen_range(b'a'..=b'z') as char;
            self.doc.insert_at_position(self.id, pos, ch).ok()?
        } else {
            let pos = rng.gen_range(0..self.doc.len());
            self.doc.delete_at_position(pos).ok()?
        };
        let snapshot = self.vector.clone();
        let version = self.vector.increment(self.id);
        self.log.write(self.id, version, op.clone());
        Some(QueueElem::new(op, self.id, version, snapshot))
    }

    fn receive(&mut self, elem: QueueElem<Operation>) {
        for ready in self.queue.enqueue(elem, &mut self.vector) {
            self.doc.apply_operation(&ready.op).unwrap();
            self.log.write(ready.site, ready.version, ready.op);
        }
    }
}

fn run_session(seed: u64, config: DocumentConfig) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sites: Vec<Site> = (1..=3).map(|n| Site::new(site(n), config.clone())).collect();
    let mut sent: Vec<QueueElem<Operation>> = Vec::new();

    for _ in 0..120 {
        let who = rng.gen_range(0..sites.len());
        if sent.is_empty() || rng.gen_bool(0.5) {
            if let Some(elem) = sites[who].edit(&mut rng) {
                sent.push(elem);
            }
        } else {
            // Any earlier message, possibly a duplicate or one of our own.
            let elem = sent[rng.gen_range(0..sent.len())].clone();
            sites[who].receive(elem);
        }
    }

    // A late joiner receives everything in a random order.
    let mut observer = Site::new(site(9), config);
    let mut shuffled = sent.clone();
    shuffled.shuffle(&mut rng);
    for elem in shuffled {
        observer.receive(elem);
    }
    assert!(observer.queue.is_empty());

    for s in &mut sites {
        for elem in sent.iter().rev() {
            s.receive(elem.clone());
        }
        assert!(s.queue.is_empty());
        assert_eq!(s.doc.render(), observer.doc.render());
        assert_eq!(s.vector, observer.vector);
        assert_eq!(s.log.len(), sent.len());
    }
}

#[test]
fn test_shuffled_delivery_converges() {
    for seed in 0..20 {
        run_session(seed, DocumentConfig::default());
    }
}

#[test]
fn test_shuffled_delivery_converges_with_small_nodes() {
    for seed in 0..20 {
        run_session(seed, DocumentConfig { max_atoms_per_node: 3 });
    }
}
