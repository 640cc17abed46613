//! Boundary error types.
//!
//! Nothing in this crate terminates the process: decode failures are dropped
//! with a diagnostic, link failures degrade to a terminal session state, and
//! engine invariant violations self-heal on the next tick. These types exist
//! for the places where a caller can meaningfully observe the failure.

use thiserror::Error;

/// Failure to decode an inbound wire frame.
///
/// Malformed traffic is logged and dropped at the transport boundary; it
/// never mutates simulation state.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Empty line on the wire.
    #[error("empty frame")]
    Empty,

    /// Frame tag is not part of the protocol.
    #[error("unknown message tag `{0}`")]
    UnknownTag(String),

    /// Tag recognized but the frame body doesn't fit its shape.
    #[error("malformed `{tag}` frame: {detail}")]
    Malformed {
        tag: &'static str,
        detail: &'static str,
    },

    /// A header field failed to parse as its expected type.
    #[error("bad field in `{tag}` frame")]
    BadField { tag: &'static str },

    /// Reassembled snapshot payload is not valid JSON.
    #[error("snapshot payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Link-level failure on the peer transport.
#[derive(Debug, Error)]
pub enum NetError {
    /// Underlying socket error.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound connect or write exceeded its bounded timeout.
    #[error("send timed out")]
    Timeout,

    /// A priority message was never acknowledged within its retry budget.
    #[error("retries exhausted for `{tag}`")]
    RetriesExhausted { tag: &'static str },
}

/// Failure to save or restore the replay record.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("serialize: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Record references a cell index the scene doesn't have.
    #[error("replay record references unknown cell {0}")]
    UnknownCell(u16),
}
