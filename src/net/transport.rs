//! Peer transport: a long-lived inbound listener and short-lived outbound
//! connections, one per message. There is no persistent bidirectional
//! session.
//!
//! Inbound frames are decoded off the simulation thread and handed to the
//! simulation domain over a channel; the listener never touches game state.
//! Outbound sends run on their own short-lived threads with bounded
//! timeouts, so the tick loop never blocks on the network.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use super::message::Message;
use crate::error::NetError;

/// Shared cancellation flag, checked before any callback touches state.
///
/// Timers and listener threads hold a clone; cancelling stops them fully
/// rather than pausing them, so nothing fires against a torn-down session.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an active (non-cancelled) token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the token; permanent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where outbound messages go. Object-safe so the session logic can be
/// exercised against an in-memory double.
pub trait Transport: Send {
    /// Queue one message for delivery. Must not block the caller.
    fn send(&self, message: &Message);
}

/// One short-lived TCP connection per message.
pub struct TcpTransport {
    peer: SocketAddr,
    timeout: Duration,
    /// Inbound queue for replies read back on an outbound socket (the
    /// handshake confirmation arrives this way).
    replies: Sender<Message>,
}

impl TcpTransport {
    /// Create a transport targeting `peer`.
    #[must_use]
    pub fn new(peer: SocketAddr, timeout_ms: u64, replies: Sender<Message>) -> Self {
        Self {
            peer,
            timeout: Duration::from_millis(timeout_ms.max(1)),
            replies,
        }
    }

    fn send_once(
        peer: SocketAddr,
        timeout: Duration,
        line: &str,
        await_reply: bool,
        replies: &Sender<Message>,
    ) -> Result<(), NetError> {
        let mut stream = TcpStream::connect_timeout(&peer, timeout).map_err(|err| {
            if err.kind() == std::io::ErrorKind::TimedOut {
                NetError::Timeout
            } else {
                NetError::Io(err)
            }
        })?;
        stream.set_write_timeout(Some(timeout))?;
        stream.write_all(line.as_bytes())?;

        if await_reply {
            stream.set_read_timeout(Some(timeout))?;
            let mut reader = BufReader::new(stream);
            let mut reply = String::new();
            if reader.read_line(&mut reply).is_ok() && !reply.trim().is_empty() {
                match Message::parse(&reply) {
                    Ok(message) => {
                        let _ = replies.send(message);
                    }
                    Err(err) => warn!(error = %err, "dropping malformed reply frame"),
                }
            }
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn send(&self, message: &Message) {
        let line = format!("{}\n", message.encode());
        let tag = message.tag();
        // The handshake confirmation comes back on the request's own socket.
        let await_reply = matches!(message, Message::ConnectionRequest { .. });
        let peer = self.peer;
        let timeout = self.timeout;
        let replies = self.replies.clone();
        thread::spawn(move || {
            if let Err(err) = Self::send_once(peer, timeout, &line, await_reply, &replies) {
                warn!(%peer, tag, error = %err, "outbound send failed");
            }
        });
    }
}

/// In-memory transport: delivers straight into a channel. Used by tests and
/// same-process loopback sessions.
pub struct ChannelTransport {
    sender: Sender<Message>,
}

impl ChannelTransport {
    /// Create a transport feeding the given channel.
    #[must_use]
    pub fn new(sender: Sender<Message>) -> Self {
        Self { sender }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: &Message) {
        let _ = self.sender.send(message.clone());
    }
}

/// Bind the inbound listener and start its accept loop.
///
/// Decoded messages flow into `inbound`; the thread exits when `cancel`
/// flips. Returns the bound address (useful with port 0).
pub fn spawn_listener(
    bind: SocketAddr,
    inbound: Sender<Message>,
    cancel: CancelToken,
) -> Result<SocketAddr, NetError> {
    let listener = TcpListener::bind(bind)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "peer listener ready");

    thread::spawn(move || accept_loop(&listener, &inbound, &cancel));
    Ok(local_addr)
}

fn accept_loop(listener: &TcpListener, inbound: &Sender<Message>, cancel: &CancelToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!(%addr, "peer connection accepted");
                let inbound = inbound.clone();
                let cancel = cancel.clone();
                thread::spawn(move || handle_peer(stream, &inbound, &cancel));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(error = %err, "listener accept failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

fn handle_peer(stream: TcpStream, inbound: &Sender<Message>, cancel: &CancelToken) {
    if stream.set_nonblocking(false).is_err()
        || stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .is_err()
    {
        return;
    }
    let mut confirm = stream.try_clone().ok();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match Message::parse(trimmed) {
                    Ok(message) => {
                        if matches!(message, Message::ConnectionRequest { .. }) {
                            // Handshake confirmation goes back on this socket.
                            if let Some(socket) = confirm.as_mut() {
                                let ok = format!("{}\n", Message::ConnectionOk.encode());
                                if let Err(err) = socket.write_all(ok.as_bytes()) {
                                    warn!(error = %err, "handshake confirmation failed");
                                }
                            }
                        }
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "dropping malformed frame"),
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Idle socket; loop to re-check the cancel token.
            }
            Err(err) => {
                debug!(error = %err, "peer connection closed");
                break;
            }
        }
    }
}
