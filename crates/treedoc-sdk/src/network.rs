//! Network transport abstractions for replica synchronization.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use treedoc_causal::QueueElem;
use treedoc_core::{Operation, SiteId, VersionVector};

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer connection state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connected,
}

/// Information about a connected peer.
#[derive(Clone, Debug)]
pub struct Peer {
    pub id: PeerId,
    pub state: PeerState,
}

/// One operation as it travels between replicas.
///
/// `vector` is the origin's version vector before it counted this operation,
/// so `vector[site] == version - 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub vector: VersionVector,
    pub site: SiteId,
    pub version: u64,
    pub op: Operation,
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<Envelope> for QueueElem<Operation> {
    fn from(env: Envelope) -> Self {
        QueueElem::new(env.op, env.site, env.version, env.vector)
    }
}

impl From<QueueElem<Operation>> for Envelope {
    fn from(elem: QueueElem<Operation>) -> Self {
        Self {
            vector: elem.vector,
            site: elem.site,
            version: elem.version,
            op: elem.op,
        }
    }
}

/// Messages exchanged between peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A freshly generated operation.
    Operation(Envelope),
    /// Ask a peer for everything the sender's vector lacks.
    SyncRequest { vector: VersionVector },
    /// Operations missing at the requester, oldest first.
    SyncResponse { entries: Vec<Envelope> },
}

/// Network error type.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Peer not found: {0}")]
    PeerNotFound(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Disconnected")]
    Disconnected,
}

/// Abstract network transport trait.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    /// Connect to a peer.
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Disconnect from a peer.
    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError>;

    /// Send a message to a specific peer.
    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError>;

    /// Broadcast a message to all connected peers.
    async fn broadcast(&self, message: Message) -> Result<(), NetworkError>;

    /// Get list of connected peers.
    async fn connected_peers(&self) -> Vec<Peer>;

    /// Take the incoming message stream. Only the first call gets it.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<(PeerId, Message)>>;
}

type SharedMessageReceiver = Arc<RwLock<Option<mpsc::UnboundedReceiver<(PeerId, Message)>>>>;
type SharedOutgoing = Arc<RwLock<HashMap<PeerId, mpsc::UnboundedSender<(PeerId, Message)>>>>;

/// In-memory transport for testing and simulation.
///
/// Channels are unbounded so two replicas answering each other's sync
/// requests can never block on one another.
pub struct MemoryTransport {
    local_id: PeerId,
    peers: Arc<RwLock<HashMap<PeerId, Peer>>>,
    message_tx: mpsc::UnboundedSender<(PeerId, Message)>,
    message_rx: SharedMessageReceiver,
    outgoing: SharedOutgoing,
}

impl MemoryTransport {
    pub fn new(local_id: PeerId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            local_id,
            peers: Arc::new(RwLock::new(HashMap::new())),
            message_tx: tx,
            message_rx: Arc::new(RwLock::new(Some(rx))),
            outgoing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Connect two memory transports together.
    pub fn connect_to(&self, other: &MemoryTransport) {
        self.peers.write().insert(
            other.local_id.clone(),
            Peer {
                id: other.local_id.clone(),
                state: PeerState::Connected,
            },
        );
        self.outgoing
            .write()
            .insert(other.local_id.clone(), other.message_tx.clone());

        other.peers.write().insert(
            self.local_id.clone(),
            Peer {
                id: self.local_id.clone(),
                state: PeerState::Connected,
            },
        );
        other
            .outgoing
            .write()
            .insert(self.local_id.clone(), self.message_tx.clone());
    }
}

#[async_trait]
impl NetworkTransport for MemoryTransport {
    async fn connect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if !self.outgoing.read().contains_key(peer_id) {
            return Err(NetworkError::ConnectionFailed(format!(
                "no route to {}",
                peer_id
            )));
        }
        self.peers.write().insert(
            peer_id.clone(),
            Peer {
                id: peer_id.clone(),
                state: PeerState::Connected,
            },
        );
        Ok(())
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<(), NetworkError> {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.state = PeerState::Disconnected;
        }
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, message: Message) -> Result<(), NetworkError> {
        let connected = self
            .peers
            .read()
            .get(peer_id)
            .is_some_and(|p| p.state == PeerState::Connected);
        if !connected {
            return Err(NetworkError::PeerNotFound(peer_id.to_string()));
        }

        let tx = self.outgoing.read().get(peer_id).cloned();
        match tx {
            Some(tx) => tx
                .send((self.local_id.clone(), message))
                .map_err(|_| NetworkError::Disconnected),
            None => Err(NetworkError::PeerNotFound(peer_id.to_string())),
        }
    }

    async fn broadcast(&self, message: Message) -> Result<(), NetworkError> {
        let senders: Vec<_> = {
            let peers = self.peers.read();
            let outgoing = self.outgoing.read();
            outgoing
                .iter()
                .filter(|(id, _)| {
                    peers
                        .get(*id)
                        .is_some_and(|p| p.state == PeerState::Connected)
                })
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };

        let mut failed = Vec::new();
        for (id, tx) in senders {
            if tx.send((self.local_id.clone(), message.clone())).is_err() {
                failed.push(id.to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::SendFailed(failed.join(", ")))
        }
    }

    async fn connected_peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<(PeerId, Message)>> {
        self.message_rx.write().take()
    }
}

/// Create a fully connected network of memory transports.
pub fn create_network(count: usize) -> Vec<MemoryTransport> {
    let transports: Vec<_> = (0..count)
        .map(|i| MemoryTransport::new(PeerId::new(format!("peer-{}", i))))
        .collect();

    for i in 0..count {
        for j in (i + 1)..count {
            transports[i].connect_to(&transports[j]);
        }
    }

    transports
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Envelope {
        Envelope {
            vector: VersionVector::new(),
            site: SiteId::from_u128(1),
            version: 1,
            op: Operation::InsertRoot {
                id: treedoc_core::NodeId::new(SiteId::from_u128(1), 0),
                slot: 0,
                atom: 'x',
            },
        }
    }

    #[test]
    fn test_memory_transport() {
        let transport1 = MemoryTransport::new(PeerId::new("peer-1"));
        let transport2 = MemoryTransport::new(PeerId::new("peer-2"));

        transport1.connect_to(&transport2);

        let peers1 = tokio_test::block_on(transport1.connected_peers());
        let peers2 = tokio_test::block_on(transport2.connected_peers());

        assert_eq!(peers1.len(), 1);
        assert_eq!(peers2.len(), 1);
    }

    #[tokio::test]
    async fn test_network_creation() {
        let network = create_network(3);
        assert_eq!(network.len(), 3);

        for transport in &network {
            let peers = transport.connected_peers().await;
            assert_eq!(peers.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_send_and_broadcast() {
        let network = create_network(3);
        let mut inbox1 = network[1].subscribe().unwrap();
        let mut inbox2 = network[2].subscribe().unwrap();
        assert!(network[1].subscribe().is_none());

        let message = Message::Operation(envelope());
        network[0].broadcast(message.clone()).await.unwrap();
        assert_eq!(inbox1.recv().await.unwrap(), (PeerId::new("peer-0"), message.clone()));
        assert_eq!(inbox2.recv().await.unwrap(), (PeerId::new("peer-0"), message));

        let request = Message::SyncRequest {
            vector: VersionVector::new(),
        };
        network[2]
            .send(&PeerId::new("peer-1"), request.clone())
            .await
            .unwrap();
        assert_eq!(inbox1.recv().await.unwrap(), (PeerId::new("peer-2"), request));
    }

    #[tokio::test]
    async fn test_disconnected_peer_is_skipped() {
        let network = create_network(2);
        let peer1 = PeerId::new("peer-1");
        network[0].disconnect(&peer1).await.unwrap();

        assert!(network[0].connected_peers().await.is_empty());
        assert_eq!(
            network[0].send(&peer1, Message::Operation(envelope())).await,
            Err(NetworkError::PeerNotFound("peer-1".to_string()))
        );
        network[0].broadcast(Message::Operation(envelope())).await.unwrap();

        network[0].connect(&peer1).await.unwrap();
        assert_eq!(network[0].connected_peers().await.len(), 1);
        assert!(network[0].connect(&PeerId::new("nowhere")).await.is_err());
    }

    #[test]
    fn test_envelope_wire_format() {
        let env = envelope();
        let bytes = env.encode().unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), env);
        assert!(Envelope::decode(b"{\"site\":").is_err());

        let elem: QueueElem<Operation> = env.clone().into();
        assert_eq!(elem.version, 1);
        assert_eq!(Envelope::from(elem), env);
    }
}
