//! Sync protocol scenarios: in-memory peer pairs and a full TCP session.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};

use cellbridge::{
    AdvisorConfig, CellId, ChannelTransport, Command, Faction, Message, NetConfig, PeerSession,
    Runtime, Scene, SimConfig, SnapshotAssembler, TurnCoordinator, TurnState,
};

fn scene() -> Scene {
    let mut scene = Scene::new(SimConfig::default());
    scene.add_cell(0.0, 0.0, Faction::Player, 30);
    scene.add_cell(80.0, 0.0, Faction::Enemy, 30);
    scene
}

/// An in-memory peer: session plus its outbound mailbox.
struct Peer {
    scene: Scene,
    coordinator: TurnCoordinator,
    session: PeerSession,
    outbox: Receiver<Message>,
}

/// Build an established initiator/acceptor pair wired back-to-back.
fn established_pair() -> (Peer, Peer) {
    let (a_tx, a_outbox) = unbounded();
    let (b_tx, b_outbox) = unbounded();

    let mut a_coordinator = TurnCoordinator::new_networked(30);
    let mut b_coordinator = TurnCoordinator::new_networked(30);
    let mut a_scene = scene();
    let mut b_scene = scene();

    let mut a_session = PeerSession::initiate(
        Box::new(ChannelTransport::new(a_tx)),
        NetConfig::default(),
        &mut a_coordinator,
        "127.0.0.1:0".parse().unwrap(),
        0,
    );
    let mut b_session = PeerSession::accept(
        Box::new(ChannelTransport::new(b_tx)),
        NetConfig::default(),
        &mut b_coordinator,
        0,
    );

    // Deliver the handshake; the initiator finalizes on its local timer.
    for message in a_outbox.try_iter() {
        b_session.handle(message, &mut b_scene, &mut b_coordinator, 0);
    }
    a_session.poll(&mut a_coordinator, 500);

    let a = Peer {
        scene: a_scene,
        coordinator: a_coordinator,
        session: a_session,
        outbox: a_outbox,
    };
    let b = Peer {
        scene: b_scene,
        coordinator: b_coordinator,
        session: b_session,
        outbox: b_outbox,
    };
    (a, b)
}

/// Deliver everything `from` has sent into `to`.
fn pump(from: &Peer, to: &mut Peer, now_ms: u64) {
    for message in from.outbox.try_iter() {
        to.session
            .handle(message, &mut to.scene, &mut to.coordinator, now_ms);
    }
}

// =============================================================================
// Handshake & Roles
// =============================================================================

#[test]
fn test_roles_are_static_after_handshake() {
    let (a, b) = established_pair();

    assert!(a.session.is_established());
    assert!(b.session.is_established());
    assert_eq!(a.coordinator.local_faction(), Faction::Player);
    assert_eq!(b.coordinator.local_faction(), Faction::Enemy);
    // The initiator moves first on both machines' views.
    assert_eq!(a.coordinator.state(), TurnState::LocalPlayerTurn);
    assert_eq!(b.coordinator.state(), TurnState::OpponentTurn);
}

// =============================================================================
// Idempotent Replication
// =============================================================================

#[test]
fn test_duplicate_create_bridge_wire_message_applies_once() {
    let (mut a, mut b) = established_pair();

    let mv = a
        .coordinator
        .try_create_bridge(&mut a.scene, Faction::Player, CellId::new(0), CellId::new(1))
        .expect("move is legal");
    // The sender replicates; retries duplicate the frame.
    a.session.send_move(mv, Faction::Player);
    a.session.send_move(mv, Faction::Player);
    pump(&a, &mut b, 100);

    assert_eq!(b.scene.bridges().len(), 1);
    assert_eq!(
        b.scene.cell(CellId::new(0)).unwrap().points,
        a.scene.cell(CellId::new(0)).unwrap().points,
    );
}

#[test]
fn test_moves_and_turns_replicate_end_to_end() {
    let (mut a, mut b) = established_pair();

    let mv = a
        .coordinator
        .try_create_bridge(&mut a.scene, Faction::Player, CellId::new(0), CellId::new(1))
        .expect("move is legal");
    a.session.send_move(mv, Faction::Player);

    // End of turn: switch notification plus a fresh snapshot.
    assert!(a.coordinator.switch_turn().is_some());
    a.session.send_switch_turn(1_000);
    a.session.send_snapshot(&a.scene, &a.coordinator);
    pump(&a, &mut b, 1_000);

    // The acceptor now owns the turn and mirrors the graph.
    assert_eq!(b.coordinator.state(), TurnState::LocalPlayerTurn);
    assert_eq!(b.scene.bridges().len(), 1);
    assert_eq!(
        b.scene.cell(CellId::new(0)).unwrap().points,
        a.scene.cell(CellId::new(0)).unwrap().points,
    );

    // And the confirm settles the initiator's pending retry.
    pump(&b, &mut a, 1_100);
    assert_eq!(a.session.pending_acks(), 0);
}

// =============================================================================
// Snapshot Chunking
// =============================================================================

#[test]
fn test_out_of_order_chunk_sequence_reassembles() {
    let payload: String = ('a'..='z').cycle().take(2_400).collect();
    let mut parts: Vec<(u32, u16, u16, String)> = cellbridge::net::split_snapshot(1, &payload, 900)
        .into_iter()
        .map(|message| match message {
            Message::SnapshotPart {
                id,
                index,
                total,
                payload,
            } => (id, index, total, payload),
            other => panic!("expected parts, got {other:?}"),
        })
        .collect();
    assert_eq!(parts.len(), 3);

    // Deliver 3-of-3 first, then 1-of-3, then 2-of-3.
    parts.rotate_left(2);
    let mut assembler = SnapshotAssembler::new(10_000);
    let mut assembled = None;
    for (id, index, total, chunk) in parts {
        assembled = assembler.accept_part(id, index, total, chunk, 0);
    }
    assert_eq!(assembled.unwrap(), payload);
}

// =============================================================================
// Liveness
// =============================================================================

#[test]
fn test_heartbeat_silence_disconnects_exactly_once() {
    // Generous retry budget so the 6-second ack window is what trips.
    let config = NetConfig {
        max_retries: 1_000,
        ..NetConfig::default()
    };

    let (tx, _outbox) = unbounded();
    let mut coordinator = TurnCoordinator::new_networked(30);
    let mut session = PeerSession::accept(
        Box::new(ChannelTransport::new(tx)),
        config,
        &mut coordinator,
        0,
    );
    let mut scene = scene();
    session.handle(
        Message::SetRole {
            role: Faction::Enemy,
        },
        &mut scene,
        &mut coordinator,
        0,
    );
    assert!(session.is_established());

    let mut transitions = 0;
    let mut previous = coordinator.state();
    for now in (0..=8_000).step_by(100) {
        session.poll(&mut coordinator, now);
        if coordinator.state() != previous {
            previous = coordinator.state();
            transitions += 1;
        }
        if now < 6_000 {
            assert_ne!(coordinator.state(), TurnState::Disconnected);
        }
    }

    assert_eq!(coordinator.state(), TurnState::Disconnected);
    assert_eq!(transitions, 1, "disconnect must fire exactly once");
}

// =============================================================================
// Full TCP Session
// =============================================================================

#[test]
fn test_tcp_runtimes_handshake_and_sync() {
    let (host_runtime, host) = Runtime::new(scene(), AdvisorConfig::default(), NetConfig::default());
    let (dial_runtime, dialer) =
        Runtime::new(scene(), AdvisorConfig::default(), NetConfig::default());

    let host_thread = std::thread::spawn(move || host_runtime.run());
    let dial_thread = std::thread::spawn(move || dial_runtime.run());

    // Host first; learn the bound port.
    let (addr_tx, addr_rx) = crossbeam_channel::bounded(1);
    assert!(host.send(Command::Host {
        bind: "127.0.0.1:0".parse().unwrap(),
        reply: addr_tx,
    }));
    let host_addr = addr_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("host should bind");

    assert!(dialer.send(Command::Connect {
        bind: "127.0.0.1:0".parse().unwrap(),
        peer: host_addr,
    }));

    // Both sides should agree it's the initiator's ("player") turn.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut agreed = false;
    while Instant::now() < deadline {
        let dial_turn = dialer.snapshot().map(|s| s.turn.active);
        let host_turn = host.snapshot().map(|s| s.turn.active);
        if dial_turn == Some(Some(Faction::Player)) && host_turn == Some(Some(Faction::Player)) {
            agreed = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    // A replicated move lands on the host's scene.
    if agreed {
        dialer.send(Command::SubmitMove {
            source: CellId::new(0),
            target: CellId::new(1),
        });
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut replicated = false;
        while Instant::now() < deadline {
            if host
                .snapshot()
                .is_some_and(|snapshot| !snapshot.bridges.is_empty())
            {
                replicated = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(replicated, "the move should replicate to the host");
    }

    host.stop();
    dialer.stop();
    let _ = host_thread.join();
    let _ = dial_thread.join();
    assert!(agreed, "peers should settle on the initiator's turn");
}
