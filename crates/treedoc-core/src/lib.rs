// File: `crates/treedoc-core/src/lib.rs`
//! Treedoc core primitives.
//!
//! - [`id`]: fixed-width replica ([`SiteId`]) and node ([`NodeId`]) identities
//! - [`operation`]: the [`Operation`] variants that travel between replicas
//! - [`version_vector`]: per-site causal clocks with a partial-order compare

pub mod id;
pub mod operation;
pub mod version_vector;

pub use id::{IdError, NodeId, SiteId, NODE_ID_LEN, SITE_ID_LEN};
pub use operation::Operation;
pub use version_vector::{CausalOrder, VersionVector};
