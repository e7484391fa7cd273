//! Treedoc SDK - replicas, transports and anti-entropy
//!
//! This crate wraps the document tree and the causal delivery layer into a
//! [`Replica`]: one site's copy of a shared plain-text document that can be
//! edited locally and fed remote operations in any order.
//!
//! # Quick Start
//!
//! ```rust
//! use treedoc_sdk::{Message, Replica, ReplicaConfig};
//!
//! let (alice, mut outbox) = Replica::new(ReplicaConfig::default());
//! let (bob, _bob_outbox) = Replica::new(ReplicaConfig::default());
//!
//! alice.insert(0, 'h').unwrap();
//! alice.insert(1, 'i').unwrap();
//!
//! // Normally a `SyncManager` broadcasts the outbox over a transport.
//! while let Ok(Message::Operation(envelope)) = outbox.try_recv() {
//!     bob.deliver(envelope).unwrap();
//! }
//! assert_eq!(bob.render(), "hi");
//! ```
//!
//! # Architecture
//!
//! - [`replica`] - Per-site document state behind one lock
//! - [`network`] - Wire messages and network transport abstractions
//! - [`sync`] - Broadcast, message dispatch and sync requests
//! - [`config`] - Replica configuration
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod network;
pub mod replica;
pub mod sync;

pub use config::{ReplicaConfig, ReplicaConfigBuilder};
pub use error::{ReplicaError, Result};
pub use network::{
    create_network, Envelope, MemoryTransport, Message, NetworkError, NetworkTransport, Peer,
    PeerId, PeerState,
};
pub use replica::{Outbox, Replica, ReplicaStats};
pub use sync::SyncManager;

pub use treedoc_core::{NodeId, Operation, SiteId, VersionVector};
pub use treedoc_tree::{Edit, TreeError, TreeStats};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ReplicaConfig;
    pub use crate::error::ReplicaError;
    pub use crate::network::{NetworkTransport, PeerId};
    pub use crate::replica::Replica;
    pub use crate::sync::SyncManager;
}
