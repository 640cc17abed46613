//! Search tree nodes and edges.
//!
//! Arena-allocated, index-referenced. Rewards are scalar, always from the
//! advising faction's perspective.

use smallvec::SmallVec;

use crate::core::Faction;
use crate::scene::Move;

/// Index into the search tree's node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for "no node".
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Create a node ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Whether this is the sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// One candidate move out of a node.
#[derive(Clone, Debug)]
pub struct MoveEdge {
    pub mv: Move,
    /// Child node; `NONE` until expanded.
    pub child: NodeId,
    pub visits: u32,
    pub total_reward: f64,
}

impl MoveEdge {
    /// A fresh, unexpanded edge.
    #[must_use]
    pub fn new(mv: Move) -> Self {
        Self {
            mv,
            child: NodeId::NONE,
            visits: 0,
            total_reward: 0.0,
        }
    }

    /// Mean reward over visits; 0 for an unvisited edge.
    #[must_use]
    pub fn mean_reward(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_reward / f64::from(self.visits)
        }
    }

    /// Whether the edge already leads to a node.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        !self.child.is_none()
    }
}

/// A search tree node.
#[derive(Clone, Debug)]
pub struct SearchNode {
    /// Faction to move here.
    pub to_move: Faction,

    /// Depth from the root.
    pub depth: u16,

    pub visits: u32,

    pub is_terminal: bool,

    /// Reward at a terminal node, advising faction's perspective.
    pub terminal_reward: Option<f64>,

    /// Candidate moves out of this node.
    pub edges: SmallVec<[MoveEdge; 8]>,
}

impl SearchNode {
    /// A fresh node with no edges.
    #[must_use]
    pub fn new(to_move: Faction, depth: u16) -> Self {
        Self {
            to_move,
            depth,
            visits: 0,
            is_terminal: false,
            terminal_reward: None,
            edges: SmallVec::new(),
        }
    }

    /// Whether any edge is still unexpanded.
    #[must_use]
    pub fn has_unexpanded(&self) -> bool {
        self.edges.iter().any(|edge| !edge.is_expanded())
    }

    /// Indices of unexpanded edges.
    pub fn unexpanded_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| !edge.is_expanded())
            .map(|(i, _)| i)
    }

    /// The most-visited edge, if any was visited at all.
    #[must_use]
    pub fn best_edge_by_visits(&self) -> Option<&MoveEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.visits > 0)
            .max_by_key(|edge| edge.visits)
    }
}
