use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use treedoc_sdk::{
    create_network, MemoryTransport, NetworkTransport, PeerId, Replica, ReplicaConfigBuilder,
    SyncManager,
};

/// Statistics collected during a simulation run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub num_replicas: usize,
    pub edits_per_replica: usize,
    pub max_atoms_per_node: usize,
    pub total_edits: u64,
    pub sync_requests: usize,
    pub final_length: usize,
    pub nodes: usize,
    pub tombstones: usize,
    pub height: usize,
    pub converged: bool,
    pub total_time: Duration,
    pub edits_per_second: f64,
}

impl SimulationStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Simulation Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>30} ║", self.num_replicas);
        println!("║  Edits per Replica:         {:>30} ║", self.edits_per_replica);
        println!("║  Atoms per Node:            {:>30} ║", self.max_atoms_per_node);
        println!("║  Total Edits Applied:       {:>30} ║", self.total_edits);
        println!("║  Sync Requests:             {:>30} ║", self.sync_requests);
        println!("║  Final Length:              {:>30} ║", self.final_length);
        println!("║  Tree Nodes:                {:>30} ║", self.nodes);
        println!("║  Tombstones:                {:>30} ║", self.tombstones);
        println!("║  Tree Height:               {:>30} ║", self.height);
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Edits/Second:              {:>30.0} ║", self.edits_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Generator that yields (requester, responder) pairs for sync rounds
fn sync_pair_generator(num_replicas: usize, num_syncs: usize) -> impl Stream<Item = (usize, usize)> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_syncs {
            let requester = rng.gen_range(0..num_replicas);
            let responder = rng.gen_range(0..num_replicas);
            yield (requester, responder);
        }
    }
}

fn start_replicas(
    num_replicas: usize,
    max_atoms_per_node: usize,
) -> Vec<SyncManager<MemoryTransport>> {
    create_network(num_replicas)
        .into_iter()
        .filter_map(|transport| {
            let config = ReplicaConfigBuilder::new()
                .max_atoms_per_node(max_atoms_per_node)
                .build();
            let (replica, outbox) = Replica::new(config);
            let Some(inbox) = transport.subscribe() else {
                warn!(peer = %transport.local_id(), "transport already subscribed");
                return None;
            };
            let manager = SyncManager::new(Arc::new(replica), Arc::new(transport));
            manager.spawn_broadcaster(outbox);
            manager.spawn_server(inbox);
            Some(manager)
        })
        .collect()
}

/// Random local typing and deleting on one replica. Returns the number of
/// edits applied.
async fn edit_randomly(replica: Arc<Replica>, edits: usize) -> u64 {
    let mut rng = StdRng::from_entropy();
    let mut applied = 0;
    for i in 0..edits {
        let len = replica.len();
        let result = if len > 0 && rng.gen_bool(0.25) {
            replica.delete(rng.gen_range(0..len))
        } else {
            let c = rng.gen_range(b'a'..=b'z') as char;
            // Mostly type after the previous character, sometimes jump.
            let pos = if rng.gen_bool(0.8) {
                len
            } else {
                rng.gen_range(0..=len)
            };
            replica.insert(pos, c)
        };
        match result {
            Ok(_) => applied += 1,
            Err(e) => {
                warn!(site = %replica.site(), error = %e, "edit failed, stopping");
                break;
            }
        }

        if i % 16 == 0 {
            tokio::task::yield_now().await;
        }
    }
    applied
}

async fn wait_for_convergence(
    managers: &[SyncManager<MemoryTransport>],
    total: u64,
    deadline: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        let settled = managers
            .iter()
            .all(|m| m.replica().vector().total_operations() == total);
        if settled {
            let text = managers[0].replica().render();
            return managers.iter().all(|m| m.replica().render() == text);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Run replicas over an in-memory network with concurrent random edits,
/// followed by random anti-entropy rounds, and check they converge.
pub async fn simulate(
    num_replicas: usize,
    edits_per_replica: usize,
    max_atoms_per_node: usize,
) -> SimulationStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Treedoc Replication Simulation                      ║");
    println!("║  Replicas: {} | Edits/Replica: {} | Atoms/Node: {} ║",
             num_replicas, edits_per_replica, max_atoms_per_node);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let managers = start_replicas(num_replicas, max_atoms_per_node);

    println!("\n[Phase 1/2] Editing concurrently...");

    let handles: Vec<_> = managers
        .iter()
        .map(|m| tokio::spawn(edit_randomly(Arc::clone(m.replica()), edits_per_replica)))
        .collect();

    let mut total_edits = 0;
    for handle in handles {
        match handle.await {
            Ok(applied) => total_edits += applied,
            Err(e) => warn!(error = %e, "editing task failed"),
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Running sync rounds...");

    let mut sync_requests = 0;
    let mut pairs = Box::pin(sync_pair_generator(managers.len(), managers.len() * 4));
    while let Some((requester, responder)) = pairs.next().await {
        if requester == responder {
            continue;
        }
        let peer = PeerId::new(format!("peer-{}", responder));
        match managers[requester].request_sync(&peer).await {
            Ok(()) => sync_requests += 1,
            Err(e) => warn!(peer = %peer, error = %e, "sync request failed"),
        }
    }

    let converged = wait_for_convergence(&managers, total_edits, Duration::from_secs(10)).await;
    let total_time = start.elapsed();

    println!("[Phase 2/2] ✓ Completed");

    let (final_length, stats) = match managers.first() {
        Some(m) => (m.replica().len(), m.replica().stats()),
        None => (0, Default::default()),
    };
    info!(converged, final_length, "simulation finished");

    SimulationStats {
        num_replicas,
        edits_per_replica,
        max_atoms_per_node,
        total_edits,
        sync_requests,
        final_length,
        nodes: stats.tree.nodes,
        tombstones: stats.tree.dead,
        height: stats.tree.height,
        converged,
        total_time,
        edits_per_second: total_edits as f64 / total_time.as_secs_f64(),
    }
}

/// Run the simulation at growing replica counts
pub async fn simulate_scaling(max_replicas: usize, step_size: usize) -> bool {
    let mut all_converged = true;
    let mut current_replicas = step_size;
    while current_replicas <= max_replicas {
        let stats = simulate(current_replicas, 100, 64).await;
        stats.print();
        all_converged &= stats.converged;
        current_replicas += step_size;
    }
    all_converged
}
