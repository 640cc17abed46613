//! UCB1 tree search over the lightweight model.
//!
//! Read-only with respect to the live scene: candidate root moves come from
//! the scene's own reachability, everything after that happens on
//! [`LightState`] clones. The result is advice; the caller decides whether
//! to surface it.

use std::time::{Duration, Instant};

use crate::core::{Faction, SimRng};
use crate::scene::{Move, Outcome, Scene};

use super::config::AdvisorConfig;
use super::light::LightState;
use super::node::{MoveEdge, NodeId, SearchNode};
use super::tree::SearchTree;

/// What the advisor has to say.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advice {
    /// Recommended move.
    Move(Move),
    /// No legal move exists for the advising faction.
    NoMove,
}

impl Advice {
    /// The recommended move, if any.
    #[must_use]
    pub fn as_move(self) -> Option<Move> {
        match self {
            Advice::Move(mv) => Some(mv),
            Advice::NoMove => None,
        }
    }
}

/// Search diagnostics for tuning.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchStats {
    pub rollouts: u32,
    pub nodes_expanded: u32,
    pub max_depth: u16,
    pub time_us: u64,
}

/// Scalar reward from the advising faction's perspective, if terminal.
fn outcome_reward(outcome: Outcome, advising: Faction) -> Option<f64> {
    match outcome {
        Outcome::Ongoing => None,
        Outcome::PlayerEliminated => Some(if advising == Faction::Player { 0.0 } else { 1.0 }),
        Outcome::EnemyEliminated => Some(if advising == Faction::Player { 1.0 } else { 0.0 }),
    }
}

/// The move advisor.
pub struct MoveAdvisor {
    config: AdvisorConfig,
    rng: SimRng,
    stats: SearchStats,
}

impl MoveAdvisor {
    /// Create an advisor.
    #[must_use]
    pub fn new(config: AdvisorConfig) -> Self {
        let rng = SimRng::new(config.seed);
        Self {
            config,
            rng,
            stats: SearchStats::default(),
        }
    }

    /// Diagnostics from the latest search.
    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Recommend a move for `faction` on the current scene.
    ///
    /// Budgeted by wall clock and rollout count, whichever ends first. A
    /// single legal move is returned without searching; an empty move set is
    /// [`Advice::NoMove`]; a search that never explored a child falls back
    /// to a uniformly random legal move.
    pub fn recommend(&mut self, scene: &Scene, faction: Faction) -> Advice {
        let start = Instant::now();
        self.stats = SearchStats::default();

        let root_moves = scene.legal_moves(faction);
        if root_moves.is_empty() {
            return Advice::NoMove;
        }
        if root_moves.len() == 1 {
            return Advice::Move(root_moves[0]);
        }

        let root_state = LightState::from_scene(scene);
        let mut tree = SearchTree::new(faction);
        {
            let root = tree.root();
            let node = tree.get_mut(root);
            for mv in &root_moves {
                node.edges.push(MoveEdge::new(*mv));
            }
        }

        let budget = Duration::from_millis(self.config.time_budget_ms);
        while self.stats.rollouts < self.config.max_rollouts && start.elapsed() < budget {
            let mut state = root_state.clone();
            self.iterate(&mut tree, &mut state, faction);
            self.stats.rollouts += 1;
        }
        self.stats.time_us = start.elapsed().as_micros() as u64;

        match tree.get(tree.root()).best_edge_by_visits() {
            Some(edge) => Advice::Move(edge.mv),
            None => {
                let idx = self.rng.gen_range_usize(0..root_moves.len());
                Advice::Move(root_moves[idx])
            }
        }
    }

    /// One select → expand → simulate → backpropagate pass.
    fn iterate(&mut self, tree: &mut SearchTree, state: &mut LightState, advising: Faction) {
        let mut path: Vec<(NodeId, usize)> = Vec::new();
        let mut current = tree.root();

        loop {
            let node = tree.get(current);

            if node.is_terminal {
                let reward = node.terminal_reward.unwrap_or(0.5);
                self.backpropagate(tree, &path, reward);
                return;
            }
            if u32::from(node.depth) >= self.config.rollout_depth || node.edges.is_empty() {
                let reward = state.share(advising);
                self.backpropagate(tree, &path, reward);
                return;
            }

            let to_move = node.to_move;

            if node.has_unexpanded() {
                let choices: Vec<usize> = node.unexpanded_edges().collect();
                let edge_idx = choices[self.rng.gen_range_usize(0..choices.len())];
                let mv = tree.get(current).edges[edge_idx].mv;
                state.apply_move(to_move, &mv);
                state.grow();
                path.push((current, edge_idx));

                let child = self.expand_child(tree, current, edge_idx, state, advising);
                let reward = match tree.get(child).terminal_reward {
                    Some(reward) => reward,
                    None => {
                        let depth = tree.get(child).depth;
                        self.rollout(state, advising, to_move.opponent(), depth)
                    }
                };
                self.backpropagate(tree, &path, reward);
                return;
            }

            let edge_idx = self.select_ucb(tree.get(current), advising);
            let mv = tree.get(current).edges[edge_idx].mv;
            state.apply_move(to_move, &mv);
            state.grow();
            path.push((current, edge_idx));

            let child = tree.get(current).edges[edge_idx].child;
            if child.is_none() {
                let reward = state.share(advising);
                self.backpropagate(tree, &path, reward);
                return;
            }
            current = child;
        }
    }

    /// Link (or create) the child node for an edge; transpositions share
    /// nodes by state hash.
    fn expand_child(
        &mut self,
        tree: &mut SearchTree,
        parent: NodeId,
        edge_idx: usize,
        state: &LightState,
        advising: Faction,
    ) -> NodeId {
        let hash = state.hash_key();
        let child = match tree.lookup(hash) {
            Some(existing) => existing,
            None => {
                let depth = tree.get(parent).depth + 1;
                let to_move = tree.get(parent).to_move.opponent();
                let mut node = SearchNode::new(to_move, depth);
                match outcome_reward(state.outcome(), advising) {
                    Some(reward) => {
                        node.is_terminal = true;
                        node.terminal_reward = Some(reward);
                    }
                    None => {
                        for mv in state.legal_moves(to_move) {
                            node.edges.push(MoveEdge::new(mv));
                        }
                    }
                }
                let id = tree.alloc(node, hash);
                self.stats.nodes_expanded += 1;
                if depth > self.stats.max_depth {
                    self.stats.max_depth = depth;
                }
                id
            }
        };
        tree.get_mut(parent).edges[edge_idx].child = child;
        child
    }

    /// Uniform-random rollout to the depth cap or a terminal outcome.
    fn rollout(
        &mut self,
        state: &mut LightState,
        advising: Faction,
        first_mover: Faction,
        start_depth: u16,
    ) -> f64 {
        let mut rng = self.rng.fork();
        let mut mover = first_mover;
        for _ in u32::from(start_depth)..self.config.rollout_depth {
            if let Some(reward) = outcome_reward(state.outcome(), advising) {
                return reward;
            }
            let moves = state.legal_moves(mover);
            if let Some(mv) = rng.choose(&moves).copied() {
                state.apply_move(mover, &mv);
            }
            state.grow();
            mover = mover.opponent();
        }
        outcome_reward(state.outcome(), advising).unwrap_or_else(|| state.share(advising))
    }

    /// UCB1 over a fully expanded node, flipping exploitation for the
    /// opponent's nodes.
    fn select_ucb(&self, node: &SearchNode, advising: Faction) -> usize {
        let ln_parent = f64::from(node.visits.max(1)).ln();
        node.edges
            .iter()
            .enumerate()
            .map(|(i, edge)| {
                let mean = edge.mean_reward();
                let exploitation = if node.to_move == advising {
                    mean
                } else {
                    1.0 - mean
                };
                let exploration = if edge.visits == 0 {
                    f64::INFINITY
                } else {
                    self.config.exploration_constant
                        * (ln_parent / f64::from(edge.visits)).sqrt()
                };
                (i, exploitation + exploration)
            })
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn backpropagate(&mut self, tree: &mut SearchTree, path: &[(NodeId, usize)], reward: f64) {
        for &(node_id, edge_idx) in path.iter().rev() {
            let node = tree.get_mut(node_id);
            node.visits += 1;
            let edge = &mut node.edges[edge_idx];
            edge.visits += 1;
            edge.total_reward += reward;
        }
    }
}
