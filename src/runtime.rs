//! The owning simulation actor.
//!
//! One runtime owns the scene, the turn coordinator, the peer session, and
//! the replay log. Everything else — renderer, network threads, advisor
//! callers — talks to it through the command channel; nobody holds a live
//! reference into the graph.
//!
//! The tick loop is single-threaded and cooperative: commands and inbound
//! network events drain between fixed-rate ticks. Hint searches run on a
//! clone of the scene in their own thread, so a 500 ms search never stalls
//! a tick.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::advisor::{Advice, AdvisorConfig, MoveAdvisor};
use crate::core::{CellId, NetConfig};
use crate::error::PersistError;
use crate::net::{spawn_listener, CancelToken, Message, PeerSession, TcpTransport};
use crate::replay::{ReplayLog, ReplayRecord};
use crate::scene::{Scene, SceneSnapshot, TickReport};
use crate::turn::{TurnCoordinator, TurnEvent, TurnState};

/// Render-layer annotations. Settable without touching simulation state and
/// excluded from snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewHints {
    pub highlighted_cell: Option<CellId>,
    pub hovered_bridge: Option<(CellId, CellId)>,
}

/// The runtime's control surface.
#[derive(Debug)]
pub enum Command {
    /// Begin offline play (hotseat or vs-advisor).
    StartLocal,

    /// Host a networked session: bind the listener and wait for a dial-in.
    /// Replies with the bound address.
    Host {
        bind: SocketAddr,
        reply: Sender<SocketAddr>,
    },

    /// Dial a hosting peer: bind our own listener, then initiate.
    Connect { bind: SocketAddr, peer: SocketAddr },

    /// Bridge from `source` to `target` for the locally active faction.
    SubmitMove { source: CellId, target: CellId },

    /// Retract the bridge `source → target`.
    RetractBridge { source: CellId, target: CellId },

    /// End the locally active turn early.
    EndTurn,

    /// Ask the move advisor for a recommendation.
    RequestHint { reply: Sender<Advice> },

    /// Project the current scene and turn.
    QuerySnapshot { reply: Sender<SceneSnapshot> },

    /// Update render-layer hints.
    SetHints(ViewHints),

    /// Capture the session to the durable replay format.
    Quicksave {
        reply: Sender<Result<String, PersistError>>,
    },

    /// Restore a quicksave.
    Quickload { json: String },

    /// Tear the runtime down, stopping every timer and thread.
    Stop,
}

/// Cloneable handle for driving a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: Sender<Command>,
    cancel: CancelToken,
}

impl RuntimeHandle {
    /// Send a raw command. False when the runtime is gone.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Request advice and wait for it.
    #[must_use]
    pub fn request_hint(&self) -> Option<Advice> {
        let (reply, rx) = bounded(1);
        if !self.send(Command::RequestHint { reply }) {
            return None;
        }
        rx.recv_timeout(Duration::from_secs(5)).ok()
    }

    /// Fetch a scene snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<SceneSnapshot> {
        let (reply, rx) = bounded(1);
        if !self.send(Command::QuerySnapshot { reply }) {
            return None;
        }
        rx.recv_timeout(Duration::from_secs(5)).ok()
    }

    /// Quicksave and return the serialized record.
    #[must_use]
    pub fn quicksave(&self) -> Option<Result<String, PersistError>> {
        let (reply, rx) = bounded(1);
        if !self.send(Command::Quicksave { reply }) {
            return None;
        }
        rx.recv_timeout(Duration::from_secs(5)).ok()
    }

    /// Stop the runtime and cancel its timers and listener.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
        self.cancel.cancel();
    }
}

/// The simulation actor. Construct, then either call [`Runtime::run`] on a
/// dedicated thread or drive [`Runtime::step`] from an embedding loop.
pub struct Runtime {
    scene: Scene,
    coordinator: TurnCoordinator,
    session: Option<PeerSession>,
    hosting: bool,
    net_tx: Sender<Message>,
    net_rx: Receiver<Message>,
    commands: Receiver<Command>,
    replay: ReplayLog,
    hints: ViewHints,
    advisor_config: AdvisorConfig,
    net_config: NetConfig,
    cancel: CancelToken,
    step_count: u64,
    last_second_ms: u64,
    last_resync_ms: u64,
}

impl Runtime {
    /// Create a runtime owning `scene`.
    #[must_use]
    pub fn new(
        scene: Scene,
        advisor_config: AdvisorConfig,
        net_config: NetConfig,
    ) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = unbounded();
        let (net_tx, net_rx) = unbounded();
        let cancel = CancelToken::new();
        let turn_seconds = scene.config().turn_seconds;

        let handle = RuntimeHandle {
            commands: command_tx,
            cancel: cancel.clone(),
        };
        let runtime = Self {
            scene,
            coordinator: TurnCoordinator::new_local(turn_seconds),
            session: None,
            hosting: false,
            net_tx,
            net_rx,
            commands: command_rx,
            replay: ReplayLog::new(),
            hints: ViewHints::default(),
            advisor_config,
            net_config,
            cancel,
            step_count: 0,
            last_second_ms: 0,
            last_resync_ms: 0,
        };
        (runtime, handle)
    }

    /// Read-only scene access for a render pass.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Read-only coordinator access for a render pass.
    #[must_use]
    pub fn coordinator(&self) -> &TurnCoordinator {
        &self.coordinator
    }

    /// Current render hints.
    #[must_use]
    pub fn hints(&self) -> ViewHints {
        self.hints
    }

    /// The replay log so far.
    #[must_use]
    pub fn replay(&self) -> &ReplayLog {
        &self.replay
    }

    /// Milliseconds of runtime clock, derived from the step count so a
    /// manually-stepped runtime is fully deterministic.
    #[must_use]
    pub fn clock_ms(&self) -> u64 {
        self.step_count * 1000 / u64::from(self.scene.config().tick_hz)
    }

    /// Run the fixed-rate tick loop until stopped.
    pub fn run(mut self) {
        let dt = Duration::from_secs_f64(1.0 / f64::from(self.scene.config().tick_hz));
        let mut next_tick = Instant::now() + dt;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            loop {
                let now = Instant::now();
                if now >= next_tick {
                    break;
                }
                match self.commands.recv_timeout(next_tick - now) {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            self.step();
            next_tick += dt;
        }
    }

    /// One simulation tick: drain inbound traffic, advance the economy,
    /// drive the turn/heartbeat/resync cadences.
    pub fn step(&mut self) {
        self.step_count += 1;
        let now = self.clock_ms();

        self.drain_commands();
        self.drain_network(now);

        if self.coordinator.active_faction().is_some() {
            let report = self.scene.tick();
            self.absorb_report(&report);

            let outcome = self.scene.outcome();
            if outcome.is_terminal() {
                if let Some(event) = self.coordinator.observe_outcome(outcome) {
                    self.apply_turn_event(event, now);
                }
            }
        }

        if now.saturating_sub(self.last_second_ms) >= 1_000 {
            self.last_second_ms = now;
            if let Some(event) = self.coordinator.tick_second() {
                self.apply_turn_event(event, now);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.poll(&mut self.coordinator, now);
            if self.coordinator.state() == TurnState::LocalPlayerTurn
                && now.saturating_sub(self.last_resync_ms) >= self.net_config.resync_interval_ms
            {
                self.last_resync_ms = now;
                session.send_snapshot(&self.scene, &self.coordinator);
            }
        }
    }

    fn drain_commands(&mut self) {
        let pending: Vec<Command> = self.commands.try_iter().collect();
        for command in pending {
            if !self.handle_command(command) {
                return;
            }
        }
    }

    fn drain_network(&mut self, now: u64) {
        let inbound: Vec<Message> = self.net_rx.try_iter().collect();
        for message in inbound {
            // A hosting runtime creates its session on the first dial-in:
            // the request tells us where to send.
            if self.session.is_none() {
                if let (true, Message::ConnectionRequest { reply_to }) = (self.hosting, &message) {
                    let transport = Box::new(TcpTransport::new(
                        *reply_to,
                        self.net_config.send_timeout_ms,
                        self.net_tx.clone(),
                    ));
                    self.session = Some(PeerSession::accept(
                        transport,
                        self.net_config.clone(),
                        &mut self.coordinator,
                        now,
                    ));
                } else {
                    continue;
                }
            }
            if let Some(session) = self.session.as_mut() {
                session.handle(message, &mut self.scene, &mut self.coordinator, now);
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> bool {
        let now = self.clock_ms();
        match command {
            Command::StartLocal => {
                let turn_seconds = self.scene.config().turn_seconds;
                self.coordinator = TurnCoordinator::new_local(turn_seconds);
                self.coordinator.begin_local();
                info!("local session started");
            }
            Command::Host { bind, reply } => {
                match spawn_listener(bind, self.net_tx.clone(), self.cancel.clone()) {
                    Ok(addr) => {
                        let turn_seconds = self.scene.config().turn_seconds;
                        self.coordinator = TurnCoordinator::new_networked(turn_seconds);
                        self.hosting = true;
                        let _ = reply.send(addr);
                    }
                    Err(err) => warn!(error = %err, "hosting failed"),
                }
            }
            Command::Connect { bind, peer } => {
                match spawn_listener(bind, self.net_tx.clone(), self.cancel.clone()) {
                    Ok(listen_addr) => {
                        let turn_seconds = self.scene.config().turn_seconds;
                        self.coordinator = TurnCoordinator::new_networked(turn_seconds);
                        let transport = Box::new(TcpTransport::new(
                            peer,
                            self.net_config.send_timeout_ms,
                            self.net_tx.clone(),
                        ));
                        self.session = Some(PeerSession::initiate(
                            transport,
                            self.net_config.clone(),
                            &mut self.coordinator,
                            listen_addr,
                            now,
                        ));
                    }
                    Err(err) => warn!(error = %err, "connect failed"),
                }
            }
            Command::SubmitMove { source, target } => self.submit_move(source, target),
            Command::RetractBridge { source, target } => self.retract_bridge(source, target),
            Command::EndTurn => {
                if self.coordinator.is_locally_driven() {
                    if let Some(event) = self.coordinator.switch_turn() {
                        self.apply_turn_event(event, now);
                    }
                }
            }
            Command::RequestHint { reply } => self.spawn_hint_search(reply),
            Command::QuerySnapshot { reply } => {
                let snapshot =
                    SceneSnapshot::capture(&self.scene, self.coordinator.turn_record());
                let _ = reply.send(snapshot);
            }
            Command::SetHints(hints) => self.hints = hints,
            Command::Quicksave { reply } => {
                let record = ReplayRecord::capture(
                    &self.scene,
                    self.coordinator.turn_record(),
                    &self.replay,
                );
                let _ = reply.send(record.to_json());
            }
            Command::Quickload { json } => {
                let restored = ReplayRecord::from_json(&json)
                    .and_then(|record| record.restore(&mut self.scene));
                match restored {
                    Ok(turn) => self.coordinator.apply_turn_record(turn),
                    Err(err) => warn!(error = %err, "quickload rejected"),
                }
            }
            Command::Stop => {
                self.cancel.cancel();
                info!("runtime stopped");
                return false;
            }
        }
        true
    }

    fn submit_move(&mut self, source: CellId, target: CellId) {
        let Some(faction) = self
            .coordinator
            .is_locally_driven()
            .then(|| self.coordinator.active_faction())
            .flatten()
        else {
            return;
        };
        if let Some(mv) = self
            .coordinator
            .try_create_bridge(&mut self.scene, faction, source, target)
        {
            self.replay
                .log_bridge_created(self.scene.now_ms(), faction, &mv);
            if let Some(session) = self.session.as_ref() {
                session.send_move(mv, faction);
            }
        }
    }

    fn retract_bridge(&mut self, source: CellId, target: CellId) {
        let Some(faction) = self
            .coordinator
            .is_locally_driven()
            .then(|| self.coordinator.active_faction())
            .flatten()
        else {
            return;
        };
        if self
            .coordinator
            .try_remove_bridge(&mut self.scene, faction, source, target)
        {
            self.replay
                .log_bridge_removed(self.scene.now_ms(), faction, source, target);
            if let Some(session) = self.session.as_ref() {
                session.send_remove(source, target);
            }
        }
    }

    /// Hints search a clone on their own thread; live state stays untouched
    /// and the tick loop never waits on the search budget.
    fn spawn_hint_search(&self, reply: Sender<Advice>) {
        let faction = self
            .coordinator
            .active_faction()
            .unwrap_or_else(|| self.coordinator.local_faction());
        let scene = self.scene.clone();
        let config = self.advisor_config.clone();
        let cancel = self.cancel.clone();
        std::thread::spawn(move || {
            if cancel.is_cancelled() {
                return;
            }
            let advice = MoveAdvisor::new(config).recommend(&scene, faction);
            let _ = reply.send(advice);
        });
    }

    fn absorb_report(&mut self, report: &TickReport) {
        for (source, target, faction) in &report.removed_bridges {
            self.replay
                .log_bridge_removed(self.scene.now_ms(), *faction, *source, *target);
        }
        if !report.captured.is_empty() {
            self.replay.log_point_status(self.scene.now_ms(), &self.scene);
            // Captures are the moments two optimistic simulations diverge
            // fastest; the active side pushes per-cell corrections early.
            if self.coordinator.is_locally_driven() {
                if let Some(session) = self.session.as_ref() {
                    for id in &report.captured {
                        session.send_sync_cell(&self.scene, *id);
                    }
                }
            }
        }
    }

    fn apply_turn_event(&mut self, event: TurnEvent, now: u64) {
        match event {
            TurnEvent::SwitchedAway => {
                self.replay.log_point_status(self.scene.now_ms(), &self.scene);
                if let Some(session) = self.session.as_mut() {
                    session.send_switch_turn(now);
                    session.send_snapshot(&self.scene, &self.coordinator);
                }
            }
            TurnEvent::Countdown { remaining_seconds } => {
                if self.coordinator.state() == TurnState::LocalPlayerTurn {
                    if let Some(session) = self.session.as_ref() {
                        session.send_turn_time(remaining_seconds);
                    }
                }
            }
            TurnEvent::Finished { outcome } => {
                self.replay.log_final(self.scene.now_ms(), outcome);
                if let Some(session) = self.session.as_mut() {
                    session.send_snapshot(&self.scene, &self.coordinator);
                    session.send_game_over(outcome);
                }
                info!(outcome = outcome.wire_token(), "session finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Faction, SimConfig};
    use crate::net::ChannelTransport;
    use crate::replay::ReplayCategory;

    fn scene() -> Scene {
        let mut scene = Scene::new(SimConfig::default().with_turn_seconds(5));
        scene.add_cell(0.0, 0.0, Faction::Player, 30);
        scene.add_cell(80.0, 0.0, Faction::Enemy, 30);
        scene
    }

    fn runtime() -> (Runtime, RuntimeHandle) {
        Runtime::new(scene(), AdvisorConfig::default(), NetConfig::default())
    }

    #[test]
    fn test_local_move_flow() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::StartLocal);
        handle.send(Command::SubmitMove {
            source: CellId::new(0),
            target: CellId::new(1),
        });
        runtime.step();

        assert_eq!(runtime.scene().bridges().len(), 1);
        assert_eq!(runtime.scene().cell(CellId::new(0)).unwrap().points, 28);
        assert_eq!(
            runtime
                .replay()
                .entries()
                .filter(|e| e.category == ReplayCategory::BridgeCreated)
                .count(),
            1
        );
    }

    #[test]
    fn test_moves_ignored_before_start() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::SubmitMove {
            source: CellId::new(0),
            target: CellId::new(1),
        });
        runtime.step();
        assert!(runtime.scene().bridges().is_empty());
    }

    #[test]
    fn test_end_turn_flips_local_sides() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::StartLocal);
        runtime.step();
        assert_eq!(runtime.coordinator().state(), TurnState::LocalPlayerTurn);

        handle.send(Command::EndTurn);
        runtime.step();
        assert_eq!(runtime.coordinator().state(), TurnState::LocalEnemyTurn);
    }

    #[test]
    fn test_turn_countdown_runs_on_runtime_clock() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::StartLocal);
        // 5-second turns; step a full simulated second per countdown tick.
        let hz = runtime.scene().config().tick_hz as usize;
        for _ in 0..hz * 3 {
            runtime.step();
        }
        assert!(runtime.coordinator().remaining_seconds() < 5);
    }

    #[test]
    fn test_quicksave_quickload_round_trip() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::StartLocal);
        handle.send(Command::SubmitMove {
            source: CellId::new(0),
            target: CellId::new(1),
        });
        runtime.step();
        let saved = {
            let record = ReplayRecord::capture(
                runtime.scene(),
                runtime.coordinator().turn_record(),
                runtime.replay(),
            );
            record.to_json().unwrap()
        };

        // Let the sim drift, then restore.
        let hz = runtime.scene().config().tick_hz as usize;
        for _ in 0..hz * 2 {
            runtime.step();
        }
        handle.send(Command::Quickload { json: saved });
        runtime.step();

        assert_eq!(runtime.scene().cell(CellId::new(0)).unwrap().points, 28);
        assert_eq!(runtime.scene().bridges().len(), 1);
    }

    #[test]
    fn test_view_hints_do_not_touch_scene() {
        let (mut runtime, handle) = runtime();
        handle.send(Command::StartLocal);
        runtime.step();
        let before = SceneSnapshot::capture(runtime.scene(), runtime.coordinator().turn_record());

        handle.send(Command::SetHints(ViewHints {
            highlighted_cell: Some(CellId::new(1)),
            hovered_bridge: Some((CellId::new(0), CellId::new(1))),
        }));
        runtime.step();

        assert_eq!(runtime.hints().highlighted_cell, Some(CellId::new(1)));
        let after = SceneSnapshot::capture(runtime.scene(), runtime.coordinator().turn_record());
        assert_eq!(before.cells, after.cells);
    }

    #[test]
    fn test_networked_moves_replicate_out() {
        let (mut runtime, _handle) = runtime();
        let (tx, rx) = crossbeam_channel::unbounded();

        // Wire an in-memory session directly, established as initiator.
        let turn_seconds = runtime.scene.config().turn_seconds;
        runtime.coordinator = TurnCoordinator::new_networked(turn_seconds);
        let mut session = PeerSession::initiate(
            Box::new(ChannelTransport::new(tx)),
            NetConfig::default(),
            &mut runtime.coordinator,
            "127.0.0.1:0".parse().unwrap(),
            0,
        );
        session.handle(
            Message::ConnectionOk,
            &mut runtime.scene,
            &mut runtime.coordinator,
            0,
        );
        runtime.session = Some(session);
        let _ = rx.try_iter().count();

        runtime.submit_move(CellId::new(0), CellId::new(1));
        let sent: Vec<Message> = rx.try_iter().collect();
        assert!(matches!(sent[0], Message::CreateBridge { .. }));
    }
}
