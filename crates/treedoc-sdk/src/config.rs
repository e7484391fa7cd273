//! Replica configuration.

use treedoc_core::SiteId;
use treedoc_tree::{DocumentConfig, DEFAULT_MAX_ATOMS_PER_NODE};

/// Configuration for a [`crate::Replica`].
#[derive(Clone, Debug)]
pub struct ReplicaConfig {
    /// Fixed site identity. A fresh one is generated when unset.
    pub site_id: Option<SiteId>,
    /// Cap on characters stored in a single tree node.
    pub max_atoms_per_node: usize,
    /// Buffer size of the edit event channel.
    pub event_capacity: usize,
}

impl ReplicaConfig {
    pub fn document_config(&self) -> DocumentConfig {
        DocumentConfig {
            max_atoms_per_node: self.max_atoms_per_node.max(1),
        }
    }
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            site_id: None,
            max_atoms_per_node: DEFAULT_MAX_ATOMS_PER_NODE,
            event_capacity: 1024,
        }
    }
}

/// Builder for replica configuration.
pub struct ReplicaConfigBuilder {
    config: ReplicaConfig,
}

impl ReplicaConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
        }
    }

    pub fn site_id(mut self, site: SiteId) -> Self {
        self.config.site_id = Some(site);
        self
    }

    /// Clamped to at least one; a node must hold a character.
    pub fn max_atoms_per_node(mut self, max: usize) -> Self {
        self.config.max_atoms_per_node = max.max(1);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> ReplicaConfig {
        self.config
    }
}

impl Default for ReplicaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
