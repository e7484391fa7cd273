//! Offline Sync Example
//!
//! This example shows two replicas editing while partitioned and catching up
//! through a sync exchange once they reconnect.
//!
//! Run with: cargo run --example offline_sync

use std::sync::Arc;
use std::time::Duration;
use treedoc_sdk::{create_network, NetworkTransport, PeerId, Replica, ReplicaConfig, SyncManager};

fn type_text(replica: &Replica, position: usize, text: &str) -> treedoc_sdk::Result<()> {
    for (i, c) in text.chars().enumerate() {
        replica.insert(position + i, c)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> treedoc_sdk::Result<()> {
    println!("=== Offline Sync Example ===\n");

    let mut managers = Vec::new();
    for transport in create_network(2) {
        let (replica, outbox) = Replica::new(ReplicaConfig::default());
        let inbox = transport.subscribe().expect("fresh transport");
        let manager = SyncManager::new(Arc::new(replica), Arc::new(transport));
        manager.spawn_broadcaster(outbox);
        manager.spawn_server(inbox);
        managers.push(manager);
    }
    let (mobile, desktop) = (&managers[0], &managers[1]);
    let (mobile_id, desktop_id) = (PeerId::new("peer-0"), PeerId::new("peer-1"));

    // === Phase 1: Both online ===
    println!("=== Phase 1: Both Online ===\n");
    type_text(desktop.replica(), 0, "Shopping List\n")?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Mobile sees:\n{}", mobile.replica().render());

    // === Phase 2: Mobile goes offline ===
    println!("=== Phase 2: Mobile Goes Offline ===\n");
    mobile.transport().disconnect(&desktop_id).await?;
    desktop.transport().disconnect(&mobile_id).await?;

    let end = mobile.replica().len();
    type_text(mobile.replica(), end, "[ ] Milk\n[ ] Eggs\n")?;
    let end = desktop.replica().len();
    type_text(desktop.replica(), end, "[ ] Coffee\n")?;

    println!("Mobile's document:\n{}", mobile.replica().render());
    println!("Desktop's document:\n{}", desktop.replica().render());

    // === Phase 3: Mobile reconnects ===
    println!("=== Phase 3: Mobile Reconnects ===\n");
    mobile.transport().connect(&desktop_id).await?;
    desktop.transport().connect(&mobile_id).await?;
    mobile.request_sync_all().await;
    desktop.request_sync_all().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("Mobile's document:\n{}", mobile.replica().render());
    println!("Desktop's document:\n{}", desktop.replica().render());
    println!(
        "Converged: {}",
        mobile.replica().render() == desktop.replica().render()
    );

    Ok(())
}
