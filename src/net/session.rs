//! The peer session: handshake, replication, liveness.
//!
//! ## Roles
//!
//! The connection initiator is always "player", the acceptor always "enemy".
//! The role crosses the wire exactly once (`set_role` during the handshake)
//! and is immutable afterwards — it is never re-derived from traffic.
//!
//! ## Reliability
//!
//! Priority messages (`switch_turn`, `heartbeat`) carry a sequence number and
//! are retried with linear backoff until acknowledged or the retry budget is
//! exhausted. Everything else is fire-and-forget; a periodic full snapshot
//! makes the pair eventually consistent without per-event ordering.
//!
//! All methods take `now_ms` from the caller, so the whole state machine is
//! exercisable in tests without a clock or a socket.

use tracing::{debug, info, warn};

use super::chunk::{split_snapshot, SnapshotAssembler};
use super::message::Message;
use super::transport::Transport;
use crate::core::{CellId, Faction, NetConfig};
use crate::error::{NetError, ProtocolError};
use crate::scene::{Move, Outcome, Scene, SceneSnapshot};
use crate::turn::TurnCoordinator;

/// Which end of the link this machine is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    /// Dialed the peer; plays "player".
    Initiator,
    /// Accepted the dial; plays "enemy".
    Acceptor,
}

struct PendingAck {
    seq: u32,
    message: Message,
    attempts: u32,
    due_ms: u64,
}

/// State for one two-peer session.
pub struct PeerSession {
    config: NetConfig,
    transport: Box<dyn Transport>,
    role: SessionRole,
    established: bool,
    declared_dead: bool,
    started_ms: u64,
    last_heard_ms: Option<u64>,
    last_ack_ms: u64,
    next_heartbeat_ms: u64,
    next_seq: u32,
    snapshot_seq: u32,
    pending: Vec<PendingAck>,
    assembler: SnapshotAssembler,
}

impl PeerSession {
    /// Dial a peer: send the session request and assign roles. `listen_addr`
    /// is this side's own listener, advertised so the peer knows where to
    /// dial back.
    pub fn initiate(
        transport: Box<dyn Transport>,
        config: NetConfig,
        coordinator: &mut TurnCoordinator,
        listen_addr: std::net::SocketAddr,
        now_ms: u64,
    ) -> Self {
        coordinator.begin_handshake();
        transport.send(&Message::ConnectionRequest {
            reply_to: listen_addr,
        });
        // The acceptor plays "enemy"; tell it so, once.
        transport.send(&Message::SetRole {
            role: Faction::Enemy,
        });
        let session = Self::new(transport, config, SessionRole::Initiator, now_ms);
        info!("session initiated");
        session
    }

    /// Host: wait for an initiator to dial in.
    pub fn accept(
        transport: Box<dyn Transport>,
        config: NetConfig,
        coordinator: &mut TurnCoordinator,
        now_ms: u64,
    ) -> Self {
        coordinator.begin_handshake();
        info!("session hosting, awaiting peer");
        Self::new(transport, config, SessionRole::Acceptor, now_ms)
    }

    fn new(
        transport: Box<dyn Transport>,
        config: NetConfig,
        role: SessionRole,
        now_ms: u64,
    ) -> Self {
        let assembler = SnapshotAssembler::new(config.chunk_retention_ms);
        Self {
            config,
            transport,
            role,
            established: false,
            declared_dead: false,
            started_ms: now_ms,
            last_heard_ms: None,
            last_ack_ms: now_ms,
            next_heartbeat_ms: now_ms,
            next_seq: 0,
            snapshot_seq: 0,
            pending: Vec::new(),
            assembler,
        }
    }

    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    #[must_use]
    pub fn is_established(&self) -> bool {
        self.established
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.declared_dead
    }

    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    // === Inbound ===

    /// Apply one decoded inbound message. The only write path from the
    /// network into the simulation, and it goes through the coordinator's
    /// and scene's public mutators.
    pub fn handle(
        &mut self,
        message: Message,
        scene: &mut Scene,
        coordinator: &mut TurnCoordinator,
        now_ms: u64,
    ) {
        self.last_heard_ms = Some(now_ms);
        match message {
            Message::ConnectionRequest { reply_to } => {
                // Confirmation already went back on the request socket.
                debug!(%reply_to, "peer dialed in");
            }
            Message::ConnectionOk => {
                if self.role == SessionRole::Initiator {
                    self.establish(coordinator, Faction::Player, now_ms);
                }
            }
            Message::SetRole { role } => {
                if self.role == SessionRole::Acceptor {
                    self.establish(coordinator, role, now_ms);
                } else {
                    debug!("ignoring set_role on the initiating side");
                }
            }
            Message::CreateBridge {
                source,
                target,
                faction,
                cost,
            } => self.apply_create_bridge(scene, source, target, faction, cost),
            Message::RemoveBridge { source, target } => {
                if !scene.remove_bridge(source, target) {
                    debug!(%source, %target, "remove_bridge for absent bridge; no-op");
                }
            }
            Message::SwitchTurn { seq } => {
                coordinator.apply_peer_switch();
                self.transport.send(&Message::TurnConfirm { seq });
            }
            Message::TurnConfirm { seq } => self.resolve_pending("switch_turn", seq),
            Message::UpdateTurnTime { seconds } => coordinator.sync_remaining(seconds),
            Message::SyncCell {
                cell,
                faction,
                points,
                frozen_ms,
            } => scene.set_cell_status(cell, faction, points, frozen_ms),
            Message::SnapshotFull { id, payload } => {
                if let Some(json) = self.assembler.accept_full(id, payload) {
                    apply_snapshot(&json, scene, coordinator);
                }
            }
            Message::SnapshotPart {
                id,
                index,
                total,
                payload,
            } => {
                if let Some(json) = self.assembler.accept_part(id, index, total, payload, now_ms) {
                    apply_snapshot(&json, scene, coordinator);
                }
            }
            Message::GameOver { outcome } => {
                coordinator.observe_outcome(outcome);
            }
            Message::Heartbeat { seq } => {
                self.transport.send(&Message::HeartbeatAck { seq });
            }
            Message::HeartbeatAck { seq } => {
                self.last_ack_ms = now_ms;
                self.resolve_pending("heartbeat", seq);
            }
        }
    }

    /// Replicated bridge creation.
    ///
    /// Idempotent under duplicate delivery, and the faction on the wire is
    /// never trusted: it is coerced to the local source cell's owner so a
    /// stale message crossing a capture can't plant a foreign bridge.
    fn apply_create_bridge(
        &mut self,
        scene: &mut Scene,
        source: CellId,
        target: CellId,
        wire_faction: Faction,
        cost: u32,
    ) {
        let Some(cell) = scene.cell(source) else {
            warn!(%source, "create_bridge for unknown cell; dropped");
            return;
        };
        let faction = cell.faction;
        if faction != wire_faction {
            debug!(%source, wire = %wire_faction, local = %faction, "create_bridge faction coerced");
        }
        if scene.bridge_between(source, target, faction).is_some() {
            debug!(%source, %target, "duplicate create_bridge; no-op");
            return;
        }
        // The peer already paid locally; mirror the deduction, clamped.
        if let Some(cell) = scene.cell_mut(source) {
            cell.points = cell.points.saturating_sub(cost);
        }
        scene.create_bridge(source, target, faction, cost);
    }

    fn establish(&mut self, coordinator: &mut TurnCoordinator, local: Faction, now_ms: u64) {
        if self.established {
            return;
        }
        self.established = true;
        coordinator.assign_role(local);
        coordinator.begin_networked_play();
        self.last_ack_ms = now_ms;
        self.next_heartbeat_ms = now_ms + self.config.heartbeat_interval_ms;
        info!(local = %local, "session established");
    }

    // === Outbound ===

    /// Replicate a locally created bridge.
    pub fn send_move(&self, mv: Move, faction: Faction) {
        self.transport.send(&Message::CreateBridge {
            source: mv.source,
            target: mv.target,
            faction,
            cost: mv.cost,
        });
    }

    /// Replicate a local retraction.
    pub fn send_remove(&self, source: CellId, target: CellId) {
        self.transport.send(&Message::RemoveBridge { source, target });
    }

    /// End-of-turn notification. Priority: retried until confirmed.
    pub fn send_switch_turn(&mut self, now_ms: u64) {
        let seq = self.alloc_seq();
        let message = Message::SwitchTurn { seq };
        self.register_pending(seq, message.clone(), now_ms);
        self.transport.send(&message);
    }

    /// Stream the local countdown. Best-effort.
    pub fn send_turn_time(&self, seconds: u32) {
        self.transport.send(&Message::UpdateTurnTime { seconds });
    }

    /// Single-cell resync after a local capture. Best-effort.
    pub fn send_sync_cell(&self, scene: &Scene, id: CellId) {
        let Some(cell) = scene.cell(id) else {
            return;
        };
        let frozen_ms = cell
            .frozen_until
            .map_or(0, |until| until.saturating_sub(scene.now_ms()));
        self.transport.send(&Message::SyncCell {
            cell: id,
            faction: cell.faction,
            points: cell.points,
            frozen_ms,
        });
    }

    /// Serialize the scene once and stream it, chunked if needed.
    pub fn send_snapshot(&mut self, scene: &Scene, coordinator: &TurnCoordinator) {
        let snapshot = SceneSnapshot::capture(scene, coordinator.turn_record());
        match snapshot.to_json() {
            Ok(json) => {
                let id = self.snapshot_seq;
                self.snapshot_seq += 1;
                for message in split_snapshot(id, &json, self.config.chunk_bytes) {
                    self.transport.send(&message);
                }
            }
            Err(err) => warn!(error = %err, "snapshot serialization failed"),
        }
    }

    /// Broadcast the terminal outcome.
    pub fn send_game_over(&self, outcome: Outcome) {
        self.transport.send(&Message::GameOver { outcome });
    }

    // === Timers ===

    /// Drive handshake timers, heartbeats, retries, and chunk expiry.
    /// Call once per simulation tick.
    pub fn poll(&mut self, coordinator: &mut TurnCoordinator, now_ms: u64) {
        if self.declared_dead || coordinator.state().is_terminal() {
            return;
        }

        if !self.established {
            self.poll_handshake(coordinator, now_ms);
        }

        // Total silence since session start: abort rather than hang.
        if self.last_heard_ms.is_none()
            && now_ms.saturating_sub(self.started_ms) >= self.config.handshake_abort_ms
        {
            self.declare_dead(coordinator, "no traffic observed");
            return;
        }

        if self.established {
            if now_ms >= self.next_heartbeat_ms {
                self.next_heartbeat_ms = now_ms + self.config.heartbeat_interval_ms;
                let seq = self.alloc_seq();
                let message = Message::Heartbeat { seq };
                self.register_pending(seq, message.clone(), now_ms);
                self.transport.send(&message);
            }
            if now_ms.saturating_sub(self.last_ack_ms) >= self.config.heartbeat_window_ms {
                self.declare_dead(coordinator, "heartbeat window elapsed");
                return;
            }
        }

        self.poll_retries(coordinator, now_ms);
        self.assembler.expire(now_ms);
    }

    fn poll_handshake(&mut self, coordinator: &mut TurnCoordinator, now_ms: u64) {
        match self.role {
            SessionRole::Initiator => {
                // Finalize locally even if the confirmation was dropped.
                if now_ms.saturating_sub(self.started_ms) >= self.config.handshake_finalize_ms {
                    self.establish(coordinator, Faction::Player, now_ms);
                }
            }
            SessionRole::Acceptor => {
                // Traffic arrived but set_role was lost: adopt "enemy"
                // independently, as the role assignment is static anyway.
                if let Some(heard) = self.last_heard_ms {
                    if now_ms.saturating_sub(heard) >= self.config.handshake_finalize_ms {
                        self.establish(coordinator, Faction::Enemy, now_ms);
                    }
                }
            }
        }
    }

    fn poll_retries(&mut self, coordinator: &mut TurnCoordinator, now_ms: u64) {
        let mut exhausted: Option<&'static str> = None;
        for ack in &mut self.pending {
            if now_ms < ack.due_ms {
                continue;
            }
            ack.attempts += 1;
            if ack.attempts > self.config.max_retries {
                exhausted = Some(ack.message.tag());
                continue;
            }
            // Linear backoff: each attempt waits one base step longer.
            ack.due_ms = now_ms + self.config.retry_backoff_ms * u64::from(ack.attempts);
            self.transport.send(&ack.message);
        }
        let max_retries = self.config.max_retries;
        self.pending.retain(|ack| ack.attempts <= max_retries);

        if let Some(tag) = exhausted {
            warn!(error = %NetError::RetriesExhausted { tag }, "priority message never acknowledged");
            self.declare_dead(coordinator, "retries exhausted");
        }
    }

    fn declare_dead(&mut self, coordinator: &mut TurnCoordinator, reason: &str) {
        if self.declared_dead {
            return;
        }
        self.declared_dead = true;
        if coordinator.mark_disconnected() {
            warn!(reason, "peer link declared dead");
        }
    }

    fn alloc_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn register_pending(&mut self, seq: u32, message: Message, now_ms: u64) {
        self.pending.push(PendingAck {
            seq,
            message,
            attempts: 1,
            due_ms: now_ms + self.config.retry_backoff_ms,
        });
    }

    fn resolve_pending(&mut self, tag: &str, seq: u32) {
        self.pending
            .retain(|ack| !(ack.seq == seq && ack.message.tag() == tag));
    }
}

fn apply_snapshot(json: &str, scene: &mut Scene, coordinator: &mut TurnCoordinator) {
    match SceneSnapshot::from_json(json) {
        Ok(snapshot) => {
            let turn = snapshot.apply(scene);
            coordinator.apply_turn_record(turn);
            debug!("snapshot applied");
        }
        Err(err) => {
            warn!(error = %ProtocolError::Payload(err), "snapshot payload rejected");
        }
    }
}
