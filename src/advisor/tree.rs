//! Arena-based search tree with a transposition map.
//!
//! Nodes live in a flat `Vec` referenced by `NodeId`. States reached by
//! different move orders hash to the same key and share a node.

use rustc_hash::FxHashMap;

use super::node::{NodeId, SearchNode};
use crate::core::Faction;

/// The search tree for one advisory run.
#[derive(Debug)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
    by_hash: FxHashMap<u64, NodeId>,
}

impl SearchTree {
    /// Create a tree with a root for the advising faction to move.
    #[must_use]
    pub fn new(root_to_move: Faction) -> Self {
        Self {
            nodes: vec![SearchNode::new(root_to_move, 0)],
            by_hash: FxHashMap::default(),
        }
    }

    /// The root node ID (always 0).
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::new(0)
    }

    /// Get a node.
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id.0 as usize]
    }

    /// Get a node mutably.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut SearchNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate a node, registering its state hash for transposition.
    pub fn alloc(&mut self, node: SearchNode, hash: u64) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        self.by_hash.entry(hash).or_insert(id);
        id
    }

    /// Look up an existing node by state hash.
    #[must_use]
    pub fn lookup(&self, hash: u64) -> Option<NodeId> {
        self.by_hash.get(&hash).copied()
    }

    /// Number of allocated nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}
