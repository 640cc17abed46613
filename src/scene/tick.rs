//! The economy tick.
//!
//! One call advances the scene by exactly one fixed step:
//!
//! 1. expired freezes clear
//! 2. production pulses (+1 per eligible cell, accumulator-gated)
//! 3. active bridges emit dots (1 source point each) and advance them;
//!    completed dots transfer, capture at ≤0 flips the cell and prunes its
//!    outgoing bridges
//! 4. conflicted bridges decay both endpoints; an exhausted endpoint gets
//!    half the cost back and the bridge is removed
//! 5. invalid and dry-sourced bridges are pruned
//!
//! Everything is integer points plus fixed per-tick float deltas, so two
//! peers ticking the same state stay convergent.

use smallvec::SmallVec;

use super::Scene;
use crate::core::{CellId, Faction};

/// What one tick changed, for replay logging and sync hooks.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    /// Cells whose faction flipped this tick.
    pub captured: SmallVec<[CellId; 2]>,

    /// Bridges removed this tick, as `(source, target, faction)`.
    pub removed_bridges: Vec<(CellId, CellId, Faction)>,
}

impl TickReport {
    /// Whether the tick left the graph untouched.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.captured.is_empty() && self.removed_bridges.is_empty()
    }
}

impl Scene {
    /// Advance the simulation by one fixed time step.
    pub fn tick(&mut self) -> TickReport {
        let dt = self.config.dt();
        self.tick_count += 1;
        let now = self.now_ms();
        let mut report = TickReport::default();

        self.expire_freezes(now);
        self.run_production(dt);

        let mut dead = vec![false; self.bridges.len()];
        self.run_flow(dt, now, &mut dead, &mut report);
        self.run_conflict_decay(&mut dead);
        self.prune(dead, &mut report);

        report
    }

    fn expire_freezes(&mut self, now: u64) {
        for i in 0..self.cells.len() {
            if self.cells[i].frozen_until.is_some_and(|until| until <= now) {
                self.cells[i].frozen_until = None;
            }
        }
    }

    fn run_production(&mut self, dt: f32) {
        let now = self.now_ms();
        self.production_acc += dt;
        while self.production_acc >= self.config.production_interval {
            self.production_acc -= self.config.production_interval;
            for i in 0..self.cells.len() {
                let frozen = self.cells[i].is_frozen(now);
                let cell = &mut self.cells[i];
                if cell.faction.is_playable() && !frozen {
                    cell.points = (cell.points + 1).min(self.config.max_points);
                }
            }
        }
    }

    /// Emission, dot advancement, transfers, captures.
    fn run_flow(
        &mut self,
        dt: f32,
        now: u64,
        dead: &mut [bool],
        report: &mut TickReport,
    ) {
        for bi in 0..self.bridges.len() {
            if dead[bi] {
                continue;
            }
            let (source, target, faction, conflict) = {
                let b = &self.bridges[bi];
                (b.source, b.target, b.faction, b.conflict)
            };

            // Faction mismatch against the current source owner: invalid,
            // self-heals by pruning rather than faulting.
            if self.cells[source.index()].faction != faction {
                dead[bi] = true;
                continue;
            }
            // Conflicted bridges are frozen in effect; only decay applies.
            if conflict {
                continue;
            }
            if self.cells[source.index()].is_frozen(now)
                || self.cells[target.index()].is_frozen(now)
            {
                continue;
            }

            // Emit: one source point becomes one in-flight dot.
            {
                let bridge = &mut self.bridges[bi];
                bridge.emission_acc += dt;
                while bridge.emission_acc >= self.config.emission_interval {
                    bridge.emission_acc -= self.config.emission_interval;
                    let src = &mut self.cells[source.index()];
                    if src.points > 0 {
                        src.points -= 1;
                        bridge.dots.push(0.0);
                    }
                }
            }

            // Advance dots; harvest the completed ones.
            let completed = {
                let bridge = &mut self.bridges[bi];
                for dot in bridge.dots.iter_mut() {
                    *dot += self.config.dot_delta;
                }
                let done = bridge.dots.iter().filter(|dot| **dot >= 1.0).count();
                bridge.dots.retain(|dot| *dot < 1.0);
                done
            };

            for _ in 0..completed {
                let tgt = &mut self.cells[target.index()];
                if tgt.faction == faction {
                    tgt.points = (tgt.points + 1).min(self.config.max_points);
                } else if tgt.points <= 1 {
                    // Capture: owner flips, points reset, and every bridge
                    // sourced at the captured cell loses its invariant.
                    tgt.faction = faction;
                    tgt.points = 1;
                    report.captured.push(target);
                    for (bj, slot) in dead.iter_mut().enumerate() {
                        if !*slot && self.bridges[bj].source == target {
                            *slot = true;
                        }
                    }
                } else {
                    tgt.points -= 1;
                }
            }
        }
    }

    fn run_conflict_decay(&mut self, dead: &mut [bool]) {
        for bi in 0..self.bridges.len() {
            if dead[bi] || !self.bridges[bi].conflict {
                continue;
            }
            let (source, target) = {
                let b = &self.bridges[bi];
                (b.source, b.target)
            };
            // One counter drives each conflicted pair: the bridge with the
            // lower source id. Both endpoints lose exactly 1 per firing.
            if source.raw() > target.raw() {
                continue;
            }

            let fires = {
                let bridge = &mut self.bridges[bi];
                bridge.conflict_progress += self.config.conflict_delta;
                if bridge.conflict_progress >= 1.0 {
                    bridge.conflict_progress -= 1.0;
                    true
                } else {
                    false
                }
            };
            if !fires {
                continue;
            }

            for id in [source, target] {
                let cell = &mut self.cells[id.index()];
                cell.points = cell.points.saturating_sub(1);
            }

            // An exhausted endpoint ends the standoff: the bridge it was
            // sourcing is removed and half of that bridge's cost flows back.
            for id in [source, target] {
                if self.cells[id.index()].points > 0 {
                    continue;
                }
                let sourced = self.bridges.iter().position(|b| {
                    b.conflict && b.source == id && b.joins(source, target)
                });
                if let Some(bj) = sourced {
                    if !dead[bj] {
                        dead[bj] = true;
                        let refund = self.bridges[bj].cost / 2;
                        let cell = &mut self.cells[id.index()];
                        cell.points = (cell.points + refund).min(self.config.max_points);
                    }
                }
            }
        }
    }

    /// Final removal pass: flagged bridges plus dry sources.
    fn prune(&mut self, mut dead: Vec<bool>, report: &mut TickReport) {
        for (bi, slot) in dead.iter_mut().enumerate() {
            if !*slot && self.cells[self.bridges[bi].source.index()].points == 0 {
                *slot = true;
            }
        }
        if !dead.contains(&true) {
            return;
        }

        let mut kept = Vec::with_capacity(self.bridges.len());
        for (bi, bridge) in self.bridges.drain(..).enumerate() {
            if dead[bi] {
                report
                    .removed_bridges
                    .push((bridge.source, bridge.target, bridge.faction));
            } else {
                kept.push(bridge);
            }
        }
        self.bridges = kept;
        self.refresh_conflicts();
    }
}
