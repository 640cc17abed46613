//! Advisor search parameters.

use serde::{Deserialize, Serialize};

/// Tunables for one advisory search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// UCB1 exploration constant (default `sqrt(2)`).
    pub exploration_constant: f64,

    /// Hard rollout cap; the search stops here even with time left.
    pub max_rollouts: u32,

    /// Wall-clock budget. Whichever of the two budgets hits first wins.
    pub time_budget_ms: u64,

    /// Rollout depth cap in plies.
    pub rollout_depth: u32,

    /// Seed for the rollout RNG; same seed, same advice.
    pub seed: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            exploration_constant: std::f64::consts::SQRT_2,
            max_rollouts: 100,
            time_budget_ms: 500,
            rollout_depth: 20,
            seed: 42,
        }
    }
}

impl AdvisorConfig {
    /// Override the exploration constant.
    #[must_use]
    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration_constant = c;
        self
    }

    /// Override the rollout cap.
    #[must_use]
    pub fn with_max_rollouts(mut self, rollouts: u32) -> Self {
        self.max_rollouts = rollouts;
        self
    }

    /// Override the time budget.
    #[must_use]
    pub fn with_time_budget_ms(mut self, ms: u64) -> Self {
        self.time_budget_ms = ms;
        self
    }

    /// Override the rollout depth.
    #[must_use]
    pub fn with_rollout_depth(mut self, plies: u32) -> Self {
        self.rollout_depth = plies;
        self
    }

    /// Override the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
