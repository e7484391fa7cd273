// File: `crates/treedoc-tree/src/lib.rs`
//! # treedoc-tree
//!
//! The replicated document tree for collaborative plain-text editing.
//!
//! Every inserted character gets a permanent identity `(NodeId, slot)`. The
//! tree translates between those identities and linear cursor positions, and
//! merges remote operations so that every replica renders the same string.
//!
//! ## Example
//!
//! ```rust
//! use treedoc_core::SiteId;
//! use treedoc_tree::Document;
//!
//! let alice = SiteId::from_u128(1);
//! let mut doc = Document::new();
//!
//! for (i, c) in "helo".chars().enumerate() {
//!     doc.insert_at_position(alice, i, c).unwrap();
//! }
//! let op = doc.insert_at_position(alice, 3, 'l').unwrap();
//!
//! let mut replica = Document::new();
//! for (i, c) in "helo".chars().enumerate() {
//!     replica.insert_at_position(alice, i, c).unwrap();
//! }
//! replica.apply_operation(&op).unwrap();
//!
//! assert_eq!(doc.render(), "hello");
//! assert_eq!(replica.render(), "hello");
//! ```

pub mod atom;
pub mod document;
pub mod error;

pub use atom::{Atom, AtomState};
pub use document::{Document, DocumentConfig, Edit, TreeStats, DEFAULT_MAX_ATOMS_PER_NODE};
pub use error::{Result, TreeError};
