//! Wire messages.
//!
//! Newline-framed, space-delimited text. The frame is decoded exactly once
//! at the transport boundary into this tagged enum and dispatched with an
//! exhaustive match; no string inspection happens past this point.
//!
//! Snapshot payloads are compact JSON carried as the tail of the line, so
//! they may contain spaces but never a raw newline.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::core::{CellId, Faction};
use crate::error::ProtocolError;
use crate::scene::Outcome;

/// Everything that can cross the peer link.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Initiator → acceptor: open a session. Carries the initiator's own
    /// listener address, since every outbound message dials a fresh
    /// connection and the acceptor must know where to dial.
    ConnectionRequest { reply_to: SocketAddr },

    /// Acceptor → initiator: handshake confirmation, sent out-of-band on the
    /// request's own socket.
    ConnectionOk,

    /// Role the *receiver* must adopt. Sent once during the handshake.
    SetRole { role: Faction },

    /// Replicate a bridge creation.
    CreateBridge {
        source: CellId,
        target: CellId,
        faction: Faction,
        cost: u32,
    },

    /// Replicate a bridge retraction.
    RemoveBridge { source: CellId, target: CellId },

    /// The sender ended its turn. Priority; expects `TurnConfirm`.
    SwitchTurn { seq: u32 },

    /// Acknowledges a `SwitchTurn`.
    TurnConfirm { seq: u32 },

    /// Sender's remaining turn seconds. Best-effort.
    UpdateTurnTime { seconds: u32 },

    /// Single-cell resync. Best-effort.
    SyncCell {
        cell: CellId,
        faction: Faction,
        points: u32,
        frozen_ms: u64,
    },

    /// A full snapshot that fit in one frame.
    SnapshotFull { id: u32, payload: String },

    /// One chunk of a split snapshot.
    SnapshotPart {
        id: u32,
        index: u16,
        total: u16,
        payload: String,
    },

    /// Terminal outcome broadcast.
    GameOver { outcome: Outcome },

    /// Liveness probe. Priority; expects `HeartbeatAck`.
    Heartbeat { seq: u32 },

    /// Acknowledges a `Heartbeat`.
    HeartbeatAck { seq: u32 },
}

fn parse_field<T: FromStr>(tag: &'static str, token: &str) -> Result<T, ProtocolError> {
    token.parse().map_err(|_| ProtocolError::BadField { tag })
}

fn parse_faction(tag: &'static str, token: &str) -> Result<Faction, ProtocolError> {
    Faction::from_wire_token(token).ok_or(ProtocolError::BadField { tag })
}

impl Message {
    /// The frame tag.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Message::ConnectionRequest { .. } => "connection_request",
            Message::ConnectionOk => "connection_ok",
            Message::SetRole { .. } => "set_role",
            Message::CreateBridge { .. } => "create_bridge",
            Message::RemoveBridge { .. } => "remove_bridge",
            Message::SwitchTurn { .. } => "switch_turn",
            Message::TurnConfirm { .. } => "turn_confirm",
            Message::UpdateTurnTime { .. } => "update_turn_time",
            Message::SyncCell { .. } => "sync_cell",
            Message::SnapshotFull { .. } => "snapshot_full",
            Message::SnapshotPart { .. } => "snapshot_part",
            Message::GameOver { .. } => "game_over",
            Message::Heartbeat { .. } => "heartbeat",
            Message::HeartbeatAck { .. } => "heartbeat_ack",
        }
    }

    /// Priority messages are acknowledged and retried; the rest are
    /// fire-and-forget.
    #[must_use]
    pub fn is_priority(&self) -> bool {
        matches!(self, Message::SwitchTurn { .. } | Message::Heartbeat { .. })
    }

    /// Encode as one newline-free line.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Message::ConnectionRequest { reply_to } => {
                format!("{} {}", self.tag(), reply_to)
            }
            Message::ConnectionOk => self.tag().to_string(),
            Message::SetRole { role } => format!("{} {}", self.tag(), role.wire_token()),
            Message::CreateBridge {
                source,
                target,
                faction,
                cost,
            } => format!(
                "{} {} {} {} {}",
                self.tag(),
                source.raw(),
                target.raw(),
                faction.wire_token(),
                cost
            ),
            Message::RemoveBridge { source, target } => {
                format!("{} {} {}", self.tag(), source.raw(), target.raw())
            }
            Message::SwitchTurn { seq }
            | Message::TurnConfirm { seq }
            | Message::Heartbeat { seq }
            | Message::HeartbeatAck { seq } => format!("{} {}", self.tag(), seq),
            Message::UpdateTurnTime { seconds } => format!("{} {}", self.tag(), seconds),
            Message::SyncCell {
                cell,
                faction,
                points,
                frozen_ms,
            } => format!(
                "{} {} {} {} {}",
                self.tag(),
                cell.raw(),
                faction.wire_token(),
                points,
                frozen_ms
            ),
            Message::SnapshotFull { id, payload } => {
                format!("{} {} {}", self.tag(), id, payload)
            }
            Message::SnapshotPart {
                id,
                index,
                total,
                payload,
            } => format!("{} {} {} {} {}", self.tag(), id, index, total, payload),
            Message::GameOver { outcome } => {
                format!("{} {}", self.tag(), outcome.wire_token())
            }
        }
    }

    /// Decode one line. Total: every failure is a [`ProtocolError`].
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (tag, rest) = line.split_once(' ').unwrap_or((line, ""));

        match tag {
            "connection_request" => Ok(Message::ConnectionRequest {
                reply_to: parse_field("connection_request", rest.trim())?,
            }),
            "connection_ok" => Ok(Message::ConnectionOk),
            "set_role" => Ok(Message::SetRole {
                role: parse_faction("set_role", rest.trim())?,
            }),
            "create_bridge" => {
                let mut fields = rest.split_whitespace();
                let (Some(source), Some(target), Some(faction), Some(cost), None) = (
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                ) else {
                    return Err(ProtocolError::Malformed {
                        tag: "create_bridge",
                        detail: "expected 4 fields",
                    });
                };
                Ok(Message::CreateBridge {
                    source: CellId::new(parse_field("create_bridge", source)?),
                    target: CellId::new(parse_field("create_bridge", target)?),
                    faction: parse_faction("create_bridge", faction)?,
                    cost: parse_field("create_bridge", cost)?,
                })
            }
            "remove_bridge" => {
                let mut fields = rest.split_whitespace();
                let (Some(source), Some(target), None) =
                    (fields.next(), fields.next(), fields.next())
                else {
                    return Err(ProtocolError::Malformed {
                        tag: "remove_bridge",
                        detail: "expected 2 fields",
                    });
                };
                Ok(Message::RemoveBridge {
                    source: CellId::new(parse_field("remove_bridge", source)?),
                    target: CellId::new(parse_field("remove_bridge", target)?),
                })
            }
            "switch_turn" => Ok(Message::SwitchTurn {
                seq: parse_field("switch_turn", rest.trim())?,
            }),
            "turn_confirm" => Ok(Message::TurnConfirm {
                seq: parse_field("turn_confirm", rest.trim())?,
            }),
            "update_turn_time" => Ok(Message::UpdateTurnTime {
                seconds: parse_field("update_turn_time", rest.trim())?,
            }),
            "sync_cell" => {
                let mut fields = rest.split_whitespace();
                let (Some(cell), Some(faction), Some(points), Some(frozen), None) = (
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                ) else {
                    return Err(ProtocolError::Malformed {
                        tag: "sync_cell",
                        detail: "expected 4 fields",
                    });
                };
                Ok(Message::SyncCell {
                    cell: CellId::new(parse_field("sync_cell", cell)?),
                    faction: parse_faction("sync_cell", faction)?,
                    points: parse_field("sync_cell", points)?,
                    frozen_ms: parse_field("sync_cell", frozen)?,
                })
            }
            "snapshot_full" => {
                let (id, payload) = rest.split_once(' ').ok_or(ProtocolError::Malformed {
                    tag: "snapshot_full",
                    detail: "missing payload",
                })?;
                Ok(Message::SnapshotFull {
                    id: parse_field("snapshot_full", id)?,
                    payload: payload.to_string(),
                })
            }
            "snapshot_part" => {
                let mut fields = rest.splitn(4, ' ');
                let (Some(id), Some(index), Some(total), Some(payload)) = (
                    fields.next(),
                    fields.next(),
                    fields.next(),
                    fields.next(),
                ) else {
                    return Err(ProtocolError::Malformed {
                        tag: "snapshot_part",
                        detail: "expected id, index, total, payload",
                    });
                };
                Ok(Message::SnapshotPart {
                    id: parse_field("snapshot_part", id)?,
                    index: parse_field("snapshot_part", index)?,
                    total: parse_field("snapshot_part", total)?,
                    payload: payload.to_string(),
                })
            }
            "game_over" => Ok(Message::GameOver {
                outcome: Outcome::from_wire_token(rest.trim()).ok_or(ProtocolError::BadField {
                    tag: "game_over",
                })?,
            }),
            "heartbeat" => Ok(Message::Heartbeat {
                seq: parse_field("heartbeat", rest.trim())?,
            }),
            "heartbeat_ack" => Ok(Message::HeartbeatAck {
                seq: parse_field("heartbeat_ack", rest.trim())?,
            }),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }
}
