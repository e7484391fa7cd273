//! Wiring between a replica and a network transport.
//!
//! The [`SyncManager`] forwards a replica's outbox to the transport, feeds
//! incoming messages to the replica, and runs the log-driven anti-entropy
//! exchange:
//!
//! ```text
//! A -> B   SyncRequest { vector: V_A }
//! B -> A   SyncResponse { entries: B.log.missing_operations(V_A) }
//! ```
//!
//! Entries keep their original vectors, so they go through A's causal queue
//! like any other remote operation and duplicates are dropped there.

use crate::error::{ReplicaError, Result};
use crate::network::{Message, NetworkTransport, PeerId};
use crate::replica::{Outbox, Replica};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connects one replica to one transport.
pub struct SyncManager<T: NetworkTransport> {
    replica: Arc<Replica>,
    transport: Arc<T>,
}

impl<T: NetworkTransport> Clone for SyncManager<T> {
    fn clone(&self) -> Self {
        Self {
            replica: Arc::clone(&self.replica),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: NetworkTransport> SyncManager<T> {
    pub fn new(replica: Arc<Replica>, transport: Arc<T>) -> Self {
        Self { replica, transport }
    }

    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Broadcast everything the replica pushes to `outbox` until the replica
    /// is dropped. Failed broadcasts are logged and never retried; a later
    /// sync exchange repairs the gap.
    pub fn spawn_broadcaster(&self, mut outbox: Outbox) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let site = self.replica.site();
        tokio::spawn(async move {
            while let Some(message) = outbox.recv().await {
                if let Err(e) = transport.broadcast(message).await {
                    warn!(site = %site, error = %e, "broadcast failed");
                }
            }
            debug!(site = %site, "outbox closed");
        })
    }

    /// Spawn [`Self::serve`] on the runtime.
    pub fn spawn_server(
        &self,
        inbox: mpsc::UnboundedReceiver<(PeerId, Message)>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.serve(inbox).await })
    }

    /// Handle incoming messages until the inbox closes or the replica
    /// faults.
    pub async fn serve(&self, mut inbox: mpsc::UnboundedReceiver<(PeerId, Message)>) {
        while let Some((from, message)) = inbox.recv().await {
            match self.handle(&from, message).await {
                Ok(_) => {}
                Err(ReplicaError::Faulted(_)) => {
                    warn!(site = %self.replica.site(), "replica faulted, no longer serving");
                    return;
                }
                Err(ReplicaError::Tree(e)) if e.is_protocol_violation() => {
                    warn!(site = %self.replica.site(), peer = %from, error = %e, "replica faulted, no longer serving");
                    return;
                }
                Err(e) => {
                    warn!(site = %self.replica.site(), peer = %from, error = %e, "failed to handle message");
                }
            }
        }
        debug!(site = %self.replica.site(), "inbox closed");
    }

    /// Handle one message from `from`. Returns how many operations were
    /// applied to the replica.
    pub async fn handle(&self, from: &PeerId, message: Message) -> Result<usize> {
        match message {
            Message::Operation(envelope) => self.replica.deliver(envelope),
            Message::SyncRequest { vector } => {
                let entries = self.replica.missing_operations(&vector);
                debug!(
                    site = %self.replica.site(),
                    peer = %from,
                    missing = entries.len(),
                    "answering sync request"
                );
                if !entries.is_empty() {
                    self.transport
                        .send(from, Message::SyncResponse { entries })
                        .await?;
                }
                Ok(0)
            }
            Message::SyncResponse { entries } => {
                let applied = self.replica.deliver_all(entries)?;
                info!(site = %self.replica.site(), peer = %from, applied, "sync response applied");
                Ok(applied)
            }
        }
    }

    /// Ask `peer` for every operation this replica is missing.
    pub async fn request_sync(&self, peer: &PeerId) -> Result<()> {
        let vector = self.replica.vector();
        self.transport
            .send(peer, Message::SyncRequest { vector })
            .await?;
        Ok(())
    }

    /// Send a sync request to every connected peer. Returns how many requests
    /// went out.
    pub async fn request_sync_all(&self) -> usize {
        let peers = self.transport.connected_peers().await;
        let results = join_all(peers.iter().map(|peer| self.request_sync(&peer.id))).await;

        let mut sent = 0;
        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(()) => sent += 1,
                Err(e) => warn!(peer = %peer.id, error = %e, "sync request failed"),
            }
        }
        sent
    }
}
