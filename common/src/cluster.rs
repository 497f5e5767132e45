//! Cluster state snapshots as observed by a single node.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Cluster-wide block that restricts what may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBlock {
    /// Persisted cluster state has not been restored from disk yet.
    StateNotRecovered,
    /// No master has been elected.
    NoMasterElected,
}

/// Immutable view of the cluster at a given version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Monotonically increasing version.
    pub version: u64,
    /// The node that observed this snapshot.
    pub local_node: NodeId,
    /// The currently elected master, if any.
    pub master_node: Option<NodeId>,
    /// Global blocks in effect.
    pub blocks: BTreeSet<ClusterBlock>,
}

impl ClusterSnapshot {
    /// Create an empty snapshot at the given version.
    pub fn new(version: u64, local_node: NodeId) -> Self {
        Self {
            version,
            local_node,
            master_node: None,
            blocks: BTreeSet::new(),
        }
    }

    /// The state a node holds before it has joined a cluster or read its
    /// persisted state: version 0, no master, not recovered.
    pub fn initial(local_node: NodeId) -> Self {
        Self::new(0, local_node)
            .with_block(ClusterBlock::StateNotRecovered)
            .with_block(ClusterBlock::NoMasterElected)
    }

    /// Copy of this snapshot with the version bumped by one.
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// Set the elected master.
    pub fn with_master(mut self, master: Option<NodeId>) -> Self {
        if master.is_some() {
            self.blocks.remove(&ClusterBlock::NoMasterElected);
        } else {
            self.blocks.insert(ClusterBlock::NoMasterElected);
        }
        self.master_node = master;
        self
    }

    /// Add a global block.
    pub fn with_block(mut self, block: ClusterBlock) -> Self {
        self.blocks.insert(block);
        self
    }

    /// Remove a global block.
    pub fn without_block(mut self, block: ClusterBlock) -> Self {
        self.blocks.remove(&block);
        self
    }

    /// Whether the observing node is the elected master.
    pub fn is_local_node_master(&self) -> bool {
        self.master_node.as_ref() == Some(&self.local_node)
    }

    /// Whether the given block is in effect.
    pub fn has_global_block(&self, block: ClusterBlock) -> bool {
        self.blocks.contains(&block)
    }

    /// Whether persisted state is still being recovered.
    pub fn is_recovery_blocked(&self) -> bool {
        self.has_global_block(ClusterBlock::StateNotRecovered)
    }
}
