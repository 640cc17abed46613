//! Turn coordination.
//!
//! ## State machine
//!
//! Local play: `Idle → LocalPlayerTurn ⇄ LocalEnemyTurn`.
//! Networked play: `Idle → AwaitingPeer → {LocalPlayerTurn | OpponentTurn}
//! → … → GameOver`, with `Disconnected` as the link-failure terminal.
//!
//! Only the faction whose turn is active may create or retract bridges;
//! anything else is rejected at the boundary, not queued. The coordinator is
//! IO-free: it emits [`TurnEvent`]s and the runtime maps them to protocol
//! sends.
//!
//! A timeout on a locally driven turn behaves exactly like a manual
//! end-of-turn. A peer's turn is foreign state: it is synchronized in from
//! `update_turn_time` / `switch_turn` messages and never force-switched here,
//! so the two coordinators cannot diverge on whose turn it is.

use crate::core::{CellId, Faction};
use crate::scene::{Move, Outcome, Scene, TurnRecord};

/// Which phase of the session is active. Exactly one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnState {
    Idle,
    LocalPlayerTurn,
    LocalEnemyTurn,
    AwaitingPeer,
    OpponentTurn,
    GameOver,
    Disconnected,
}

impl TurnState {
    /// Whether this is a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, TurnState::GameOver | TurnState::Disconnected)
    }
}

/// Whether both factions are driven from this machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnMode {
    Local,
    Networked,
}

/// Coordinator output for the runtime to act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    /// The locally driven networked turn ended; peers must be told and sent
    /// a fresh snapshot.
    SwitchedAway,

    /// The local countdown changed; peers tracking our turn want to know.
    Countdown { remaining_seconds: u32 },

    /// The scene reached a terminal outcome.
    Finished { outcome: Outcome },
}

/// Gates every bridge mutation behind whose-turn-is-it.
#[derive(Clone, Debug)]
pub struct TurnCoordinator {
    state: TurnState,
    mode: TurnMode,
    local_faction: Faction,
    remaining_seconds: u32,
    turn_seconds: u32,
    outcome: Option<Outcome>,
}

impl TurnCoordinator {
    /// Coordinator for offline play. Both factions are locally driven.
    #[must_use]
    pub fn new_local(turn_seconds: u32) -> Self {
        Self {
            state: TurnState::Idle,
            mode: TurnMode::Local,
            local_faction: Faction::Player,
            remaining_seconds: turn_seconds,
            turn_seconds,
            outcome: None,
        }
    }

    /// Coordinator for networked play. The local faction is assigned by the
    /// role handshake before play begins.
    #[must_use]
    pub fn new_networked(turn_seconds: u32) -> Self {
        Self {
            mode: TurnMode::Networked,
            ..Self::new_local(turn_seconds)
        }
    }

    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    /// The faction this machine drives in networked mode.
    #[must_use]
    pub fn local_faction(&self) -> Faction {
        self.local_faction
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Final outcome once `GameOver` is reached.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    // === Lifecycle ===

    /// Start offline play. Player moves first.
    pub fn begin_local(&mut self) {
        if self.state == TurnState::Idle {
            self.state = TurnState::LocalPlayerTurn;
            self.remaining_seconds = self.turn_seconds;
        }
    }

    /// Enter the handshake phase of networked play.
    pub fn begin_handshake(&mut self) {
        if self.state == TurnState::Idle {
            self.state = TurnState::AwaitingPeer;
        }
    }

    /// Adopt the faction assigned by the role handshake. Immutable once play
    /// begins.
    pub fn assign_role(&mut self, faction: Faction) {
        if self.state == TurnState::AwaitingPeer && faction.is_playable() {
            self.local_faction = faction;
        }
    }

    /// Leave the handshake; the initiator ("player") takes the first turn.
    pub fn begin_networked_play(&mut self) {
        if self.state != TurnState::AwaitingPeer {
            return;
        }
        self.state = if self.local_faction == Faction::Player {
            TurnState::LocalPlayerTurn
        } else {
            TurnState::OpponentTurn
        };
        self.remaining_seconds = self.turn_seconds;
    }

    // === Queries ===

    /// Faction whose turn is active, if any.
    #[must_use]
    pub fn active_faction(&self) -> Option<Faction> {
        match self.state {
            TurnState::LocalPlayerTurn => Some(match self.mode {
                TurnMode::Local => Faction::Player,
                TurnMode::Networked => self.local_faction,
            }),
            TurnState::LocalEnemyTurn => Some(Faction::Enemy),
            TurnState::OpponentTurn => Some(self.local_faction.opponent()),
            _ => None,
        }
    }

    /// Whether the active turn is driven from this machine.
    #[must_use]
    pub fn is_locally_driven(&self) -> bool {
        matches!(
            self.state,
            TurnState::LocalPlayerTurn | TurnState::LocalEnemyTurn
        )
    }

    /// Whether `faction` may mutate bridges right now.
    #[must_use]
    pub fn may_act(&self, faction: Faction) -> bool {
        self.is_locally_driven() && self.active_faction() == Some(faction)
    }

    // === Moves ===

    /// Quote, pay, record: the only path from player input to a new bridge.
    ///
    /// Rejects silently (returns `None`) when it isn't `faction`'s turn, the
    /// source isn't theirs, or the target isn't reachable.
    pub fn try_create_bridge(
        &mut self,
        scene: &mut Scene,
        faction: Faction,
        source: CellId,
        target: CellId,
    ) -> Option<Move> {
        if !self.may_act(faction) {
            return None;
        }
        if scene.cell(source)?.faction != faction {
            return None;
        }
        let cost = scene.can_reach(source, target)?;
        if !scene.deduct_points(source, cost) {
            return None;
        }
        if scene.create_bridge(source, target, faction, cost).is_none() {
            // Reachability said yes, the engine said no: repay the quote.
            if let Some(cell) = scene.cell_mut(source) {
                cell.points += cost;
            }
            return None;
        }
        Some(Move {
            source,
            target,
            cost,
        })
    }

    /// Retract an own-faction bridge. Rejected out of turn.
    pub fn try_remove_bridge(
        &mut self,
        scene: &mut Scene,
        faction: Faction,
        source: CellId,
        target: CellId,
    ) -> bool {
        if !self.may_act(faction) {
            return false;
        }
        if scene
            .bridge_connecting(source, target)
            .map_or(true, |bridge| bridge.faction != faction)
        {
            return false;
        }
        scene.remove_bridge(source, target)
    }

    // === Turn flow ===

    /// Flip the active side and reset the countdown.
    ///
    /// Emits [`TurnEvent::SwitchedAway`] when a networked local turn ends so
    /// the runtime can notify the peer and stream a snapshot.
    pub fn switch_turn(&mut self) -> Option<TurnEvent> {
        let (next, notify_peer) = match (self.mode, self.state) {
            (TurnMode::Local, TurnState::LocalPlayerTurn) => (TurnState::LocalEnemyTurn, false),
            (TurnMode::Local, TurnState::LocalEnemyTurn) => (TurnState::LocalPlayerTurn, false),
            (TurnMode::Networked, TurnState::LocalPlayerTurn) => (TurnState::OpponentTurn, true),
            (TurnMode::Networked, TurnState::OpponentTurn) => (TurnState::LocalPlayerTurn, false),
            _ => return None,
        };
        self.state = next;
        self.remaining_seconds = self.turn_seconds;
        notify_peer.then_some(TurnEvent::SwitchedAway)
    }

    /// One-second cadence. Decrements a locally driven countdown; zero forces
    /// the same switch a manual end-of-turn performs. Foreign turns are left
    /// alone.
    pub fn tick_second(&mut self) -> Option<TurnEvent> {
        if !self.is_locally_driven() {
            return None;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.switch_turn()
        } else {
            Some(TurnEvent::Countdown {
                remaining_seconds: self.remaining_seconds,
            })
        }
    }

    /// Adopt the peer's countdown for their turn (`update_turn_time`).
    pub fn sync_remaining(&mut self, seconds: u32) {
        if self.state == TurnState::OpponentTurn {
            self.remaining_seconds = seconds;
        }
    }

    /// The peer ended their turn (`switch_turn` message).
    pub fn apply_peer_switch(&mut self) {
        if self.state == TurnState::OpponentTurn {
            self.state = TurnState::LocalPlayerTurn;
            self.remaining_seconds = self.turn_seconds;
        }
    }

    /// Enter `GameOver` on a terminal outcome. Idempotent; the event fires
    /// once.
    pub fn observe_outcome(&mut self, outcome: Outcome) -> Option<TurnEvent> {
        if !outcome.is_terminal() || self.state.is_terminal() || self.state == TurnState::Idle {
            return None;
        }
        self.state = TurnState::GameOver;
        self.outcome = Some(outcome);
        Some(TurnEvent::Finished { outcome })
    }

    /// Enter the disconnect terminal. Returns true only on the first call.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TurnState::Disconnected;
        true
    }

    // === Snapshot integration ===

    /// Project the turn for a snapshot.
    #[must_use]
    pub fn turn_record(&self) -> TurnRecord {
        TurnRecord {
            active: self.active_faction(),
            remaining_seconds: self.remaining_seconds,
        }
    }

    /// Adopt the turn from a peer snapshot.
    ///
    /// Only applicable during active play; a snapshot racing the handshake
    /// must not move the machine out of `AwaitingPeer`.
    pub fn apply_turn_record(&mut self, record: TurnRecord) {
        let Some(active) = record.active else {
            return;
        };
        let applicable = matches!(
            self.state,
            TurnState::LocalPlayerTurn | TurnState::LocalEnemyTurn | TurnState::OpponentTurn
        );
        if !applicable {
            return;
        }
        self.state = match self.mode {
            TurnMode::Local => {
                if active == Faction::Player {
                    TurnState::LocalPlayerTurn
                } else {
                    TurnState::LocalEnemyTurn
                }
            }
            TurnMode::Networked => {
                if active == self.local_faction {
                    TurnState::LocalPlayerTurn
                } else {
                    TurnState::OpponentTurn
                }
            }
        };
        self.remaining_seconds = record.remaining_seconds;
    }
}
