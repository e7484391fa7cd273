//! Identity primitives.
//!
//! A [`SiteId`] names one replica for the lifetime of a session. A [`NodeId`]
//! is a site id followed by that site's node counter, so ids minted by
//! different sites never collide and every id is totally ordered by its bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ulid::Ulid;

/// Width of an encoded [`SiteId`] in bytes.
pub const SITE_ID_LEN: usize = 16;

/// Width of an encoded [`NodeId`] in bytes: site bytes then a big-endian `u32`.
pub const NODE_ID_LEN: usize = SITE_ID_LEN + 4;

/// Errors raised when decoding fixed-width ids.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Invalid id length: expected {expected} bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },
}

/// Opaque fixed-width replica identity.
///
/// Backed by a ULID so freshly generated ids are unique without coordination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteId(Ulid);

impl SiteId {
    /// Generate a fresh site id for a new session.
    pub fn generate() -> Self {
        SiteId(Ulid::new())
    }

    pub fn from_bytes(bytes: [u8; SITE_ID_LEN]) -> Self {
        SiteId(Ulid::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; SITE_ID_LEN] {
        self.0.to_bytes()
    }

    /// Decode from a byte slice that must be exactly [`SITE_ID_LEN`] long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let array: [u8; SITE_ID_LEN] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: SITE_ID_LEN,
            found: bytes.len(),
        })?;
        Ok(Self::from_bytes(array))
    }

    /// Build a site id from a small integer. Handy for tests and simulations
    /// where readable, deterministic ordering matters.
    pub fn from_u128(value: u128) -> Self {
        Self::from_bytes(value.to_be_bytes())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Permanent identity of one document node.
///
/// Field order matters: the derived ordering compares the site first and the
/// counter second, which is exactly the byte order of [`NodeId::to_bytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub site: SiteId,
    pub counter: u32,
}

impl NodeId {
    pub fn new(site: SiteId, counter: u32) -> Self {
        Self { site, counter }
    }

    pub fn to_bytes(&self) -> [u8; NODE_ID_LEN] {
        let mut bytes = [0u8; NODE_ID_LEN];
        bytes[..SITE_ID_LEN].copy_from_slice(&self.site.to_bytes());
        bytes[SITE_ID_LEN..].copy_from_slice(&self.counter.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        let mut site = [0u8; SITE_ID_LEN];
        site.copy_from_slice(&bytes[..SITE_ID_LEN]);
        let mut counter = [0u8; 4];
        counter.copy_from_slice(&bytes[SITE_ID_LEN..]);
        Self {
            site: SiteId::from_bytes(site),
            counter: u32::from_be_bytes(counter),
        }
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let array: [u8; NODE_ID_LEN] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: NODE_ID_LEN,
            found: bytes.len(),
        })?;
        Ok(Self::from_bytes(array))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_byte_layout() {
        let site = SiteId::from_u128(7);
        let id = NodeId::new(site, 0x0102_0304);
        let bytes = id.to_bytes();

        assert_eq!(&bytes[..SITE_ID_LEN], &site.to_bytes());
        assert_eq!(&bytes[SITE_ID_LEN..], &[1, 2, 3, 4]);
        assert_eq!(NodeId::from_bytes(bytes), id);
    }

    #[test]
    fn test_ordering_matches_bytes() {
        let ids = [
            NodeId::new(SiteId::from_u128(1), 300),
            NodeId::new(SiteId::from_u128(2), 0),
            NodeId::new(SiteId::from_u128(1), 2),
            NodeId::new(SiteId::from_u128(u128::MAX), 1),
        ];

        for a in &ids {
            for b in &ids {
                assert_eq!(a.cmp(b), a.to_bytes().cmp(&b.to_bytes()));
            }
        }
    }

    #[test]
    fn test_invalid_length() {
        let err = NodeId::try_from_slice(&[0u8; 3]).unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidLength {
                expected: NODE_ID_LEN,
                found: 3
            }
        );
        assert!(SiteId::try_from_slice(&[9u8; SITE_ID_LEN]).is_ok());
    }

    #[test]
    fn test_generated_sites_are_distinct() {
        assert_ne!(SiteId::generate(), SiteId::generate());
    }
}
