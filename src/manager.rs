//! The connection lifecycle: one connection, in either role, at a time.
//!
//! `ChatManager` drives the state machine
//! `Idle -> Starting -> Connected -> Stopping -> Idle`. All transitions and
//! the transport swap happen under a single mutex; a fresh cancellation
//! token per `start` is the one signal that unwinds both the in-flight
//! accept/dial and the receive loop.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::event::{ChatEvent, EventRx, EventTx};
use crate::transport::{line_channel, LineReader, LineWriter};

/// Whether this instance listens or dials out for the single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Where to dial (client) or which local port to bind (server; the host
/// part is unused, the listener binds all interfaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Endpoint, ChatError> {
        if port == 0 {
            return Err(ChatError::InvalidConfiguration(
                "port must be between 1 and 65535".to_owned(),
            ));
        }
        Ok(Endpoint { host: host.into(), port })
    }

    /// Parses string inputs the way a UI port field would supply them.
    pub fn parse(host: &str, port: &str) -> Result<Endpoint, ChatError> {
        let port = port.trim().parse::<u16>().map_err(|_| {
            ChatError::InvalidConfiguration(format!("{:?} is not a valid port", port.trim()))
        })?;
        Endpoint::new(host.trim(), port)
    }
}

/// The single authoritative connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Starting,
    Connected,
    Stopping,
}

/// Non-idle variants carry the id of the `start` call that installed them,
/// so a start that lost a race with `stop` (and possibly with a successor
/// `start`) can tell the current lifecycle is no longer its own to touch.
enum Lifecycle {
    Idle,
    Starting {
        session: u64,
        cancel: CancellationToken,
    },
    Connected {
        session: u64,
        cancel: CancellationToken,
        writer: Arc<AsyncMutex<LineWriter>>,
        receiver: JoinHandle<()>,
    },
    Stopping,
}

impl Lifecycle {
    fn state(&self) -> ConnectionState {
        match self {
            Lifecycle::Idle => ConnectionState::Idle,
            Lifecycle::Starting { .. } => ConnectionState::Starting,
            Lifecycle::Connected { .. } => ConnectionState::Connected,
            Lifecycle::Stopping => ConnectionState::Stopping,
        }
    }
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    sessions: AtomicU64,
    events: EventTx,
}

impl Shared {
    fn emit(&self, event: ChatEvent) {
        // The consumer hanging up is not the session's problem.
        let _ = self.events.send(event);
    }

    fn state(&self) -> ConnectionState {
        self.lifecycle.lock().unwrap().state()
    }

    /// Teardown entered from the receive loop's own unwind path (peer
    /// closed or read error). Fully synchronous and never joins the loop's
    /// task, so it cannot deadlock with an explicit `stop`.
    fn release_from_receiver(&self, session: u64) {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        match mem::replace(&mut *lifecycle, Lifecycle::Idle) {
            Lifecycle::Connected { session: owner, cancel, writer, receiver }
                if owner == session =>
            {
                cancel.cancel();
                drop(writer);
                // Our own join handle; dropping it detaches the task,
                // which is already on its way out.
                drop(receiver);
                debug!("receive loop released the connection");
            }
            // Idle stays Idle; an explicit stop() mid-teardown (Stopping)
            // finishes the job itself; another session's lifecycle is not
            // ours to touch.
            other => *lifecycle = other,
        }
    }
}

/// Owns the one supported connection. Not cloneable: dropping the manager
/// is a scoped release that unwinds whatever is live.
pub struct ChatManager {
    shared: Arc<Shared>,
}

impl ChatManager {
    /// Creates a manager and the event channel its session reports on.
    pub fn new() -> (ChatManager, EventRx) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            lifecycle: Mutex::new(Lifecycle::Idle),
            sessions: AtomicU64::new(0),
            events,
        });
        (ChatManager { shared }, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Establishes the single connection in the given role.
    ///
    /// Suspends on accept (server) or dial (client) until a peer shows up,
    /// the attempt fails, or `stop` cancels it. On success the receive
    /// loop is running and the state is `Connected`.
    pub async fn start(&self, role: Role, endpoint: Endpoint) -> Result<(), ChatError> {
        let cancel = CancellationToken::new();
        let session = self.shared.sessions.fetch_add(1, Ordering::Relaxed);
        {
            let mut lifecycle = self.shared.lifecycle.lock().unwrap();
            if !matches!(*lifecycle, Lifecycle::Idle) {
                return Err(ChatError::AlreadyActive);
            }
            *lifecycle = Lifecycle::Starting { session, cancel: cancel.clone() };
        }
        debug!("starting as {role:?} against {}:{}", endpoint.host, endpoint.port);

        let stream = match establish(&self.shared, role, &endpoint, &cancel).await {
            Ok(stream) => stream,
            Err(err) => {
                // On Cancelled, stop() already restored Idle; on failure
                // it is our job. Only release our own Starting: a stop
                // followed by a newer start may have replaced it.
                let mut lifecycle = self.shared.lifecycle.lock().unwrap();
                if matches!(*lifecycle, Lifecycle::Starting { session: owner, .. } if owner == session)
                {
                    *lifecycle = Lifecycle::Idle;
                }
                return Err(err);
            }
        };

        let (writer, reader) = line_channel(stream);
        let writer = Arc::new(AsyncMutex::new(writer));
        let receiver =
            tokio::spawn(receive_loop(Arc::clone(&self.shared), reader, cancel.clone(), session));

        let mut lifecycle = self.shared.lifecycle.lock().unwrap();
        if matches!(*lifecycle, Lifecycle::Starting { session: owner, .. } if owner == session) {
            *lifecycle = Lifecycle::Connected { session, cancel, writer, receiver };
            Ok(())
        } else {
            // stop() raced the success edge (and a newer start may even
            // own the state by now); unwind the connection we just made
            // instead of leaking it or clobbering someone else's.
            cancel.cancel();
            drop(writer);
            drop(receiver);
            Err(ChatError::Cancelled)
        }
    }

    /// Tears the session down and returns to `Idle`. Idempotent, callable
    /// from any state, never errors; close failures are logged, not
    /// surfaced.
    ///
    /// After `stop` returns, no further `Inbound` events are delivered and
    /// no `send` can succeed.
    pub async fn stop(&self) {
        let live = {
            let mut lifecycle = self.shared.lifecycle.lock().unwrap();
            match mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Idle => {
                    *lifecycle = Lifecycle::Idle;
                    None
                }
                // Another stop owns the teardown already.
                Lifecycle::Stopping => None,
                Lifecycle::Starting { cancel, .. } => {
                    // Unblocks the suspended accept/dial; start() reports
                    // Cancelled to its caller.
                    cancel.cancel();
                    *lifecycle = Lifecycle::Idle;
                    None
                }
                Lifecycle::Connected { cancel, writer, receiver, .. } => {
                    cancel.cancel();
                    Some((writer, receiver))
                }
            }
        };
        let Some((writer, receiver)) = live else { return };

        // Wait out any in-flight send, then shut the write half down so
        // the peer sees EOF promptly.
        writer.lock().await.close().await;
        drop(writer);
        // The loop observes the cancelled token and exits; it skips its
        // own release because the state is Stopping.
        if let Err(err) = receiver.await {
            debug!("receive loop ended abnormally: {err}");
        }
        *self.shared.lifecycle.lock().unwrap() = Lifecycle::Idle;
        self.shared.emit(ChatEvent::Notice("disconnected".to_owned()));
    }

    /// Sends one line to the peer.
    ///
    /// Whitespace is trimmed first; blank input is rejected without
    /// touching the network. Fails with `NotConnected` unless a session is
    /// live at call time. A write failure tears the whole session down.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        let line = text.trim();
        if line.is_empty() {
            return Err(ChatError::Empty);
        }
        let writer = {
            let lifecycle = self.shared.lifecycle.lock().unwrap();
            match &*lifecycle {
                Lifecycle::Connected { writer, .. } => Arc::clone(writer),
                _ => return Err(ChatError::NotConnected),
            }
        };
        let result = {
            let mut writer = writer.lock().await;
            // The connection may have been torn down while we waited for
            // the write lock; a line must not slip out after stop().
            if self.shared.state() != ConnectionState::Connected {
                return Err(ChatError::NotConnected);
            }
            writer.write_line(line).await
        };
        if matches!(result, Err(ChatError::WriteFailed(_))) {
            self.stop().await;
        }
        result
    }
}

impl Drop for ChatManager {
    fn drop(&mut self) {
        // Scoped release: whatever path the process leaves by, a live
        // session gets unwound.
        if let Ok(mut lifecycle) = self.shared.lifecycle.lock() {
            match mem::replace(&mut *lifecycle, Lifecycle::Idle) {
                Lifecycle::Starting { cancel, .. } => cancel.cancel(),
                Lifecycle::Connected { cancel, .. } => cancel.cancel(),
                _ => {}
            }
        }
    }
}

/// Produces the established stream for either role, or the reason there
/// is none. Cancellation wins any race by closing the suspended resource:
/// the listener (or pending dial) is dropped on every exit path.
async fn establish(
    shared: &Shared,
    role: Role,
    endpoint: &Endpoint,
    cancel: &CancellationToken,
) -> Result<TcpStream, ChatError> {
    match role {
        Role::Server => {
            let listener = TcpListener::bind(("0.0.0.0", endpoint.port))
                .await
                .map_err(|err| {
                    ChatError::ConnectFailed(format!("bind on port {} failed: {err}", endpoint.port))
                })?;
            shared.emit(ChatEvent::Notice(format!(
                "listening on port {}, waiting for a peer",
                endpoint.port
            )));
            // One accepted connection is the whole capacity: the listener
            // dies with this scope, so nobody else gets in until the next
            // explicit start().
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.map_err(|err| {
                        ChatError::ConnectFailed(format!("accept failed: {err}"))
                    })?;
                    shared.emit(ChatEvent::Notice(format!("peer connected from {peer}")));
                    Ok(stream)
                }
                _ = cancel.cancelled() => Err(ChatError::Cancelled),
            }
        }
        Role::Client => {
            tokio::select! {
                connected = TcpStream::connect((endpoint.host.as_str(), endpoint.port)) => {
                    let stream = connected.map_err(|err| {
                        ChatError::ConnectFailed(format!(
                            "connecting to {}:{} failed: {err}",
                            endpoint.host, endpoint.port
                        ))
                    })?;
                    shared.emit(ChatEvent::Notice(format!(
                        "connected to {}:{}",
                        endpoint.host, endpoint.port
                    )));
                    Ok(stream)
                }
                _ = cancel.cancelled() => Err(ChatError::Cancelled),
            }
        }
    }
}

/// Drains the peer's lines for the lifetime of one connection.
///
/// Exits on peer close, read error, or cancellation. The first two report
/// to the consumer and release the lifecycle themselves; on cancellation
/// the `stop` that fired the token owns both, so the loop leaves silently
/// rather than double-reporting.
async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: LineReader,
    cancel: CancellationToken,
    session: u64,
) {
    let ending = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            next = reader.read_line() => match next {
                Some(Ok(line)) => shared.emit(ChatEvent::Inbound(line)),
                Some(Err(err)) => break Some(ChatEvent::Error(err.to_string())),
                None => break Some(ChatEvent::Notice("peer closed the connection".to_owned())),
            }
        }
    };
    // The socket closes once both halves are gone.
    drop(reader);
    if let Some(event) = ending {
        shared.emit(event);
        shared.release_from_receiver(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_rejects_port_zero() {
        assert!(matches!(
            Endpoint::new("127.0.0.1", 0),
            Err(ChatError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn endpoint_parses_ui_style_input() {
        let endpoint = Endpoint::parse(" 127.0.0.1 ", " 9000 ").expect("valid input");
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 9000);
    }

    #[test]
    fn endpoint_rejects_junk_ports() {
        for port in ["", "nine thousand", "-1", "65536", "9000.5"] {
            assert!(
                matches!(
                    Endpoint::parse("127.0.0.1", port),
                    Err(ChatError::InvalidConfiguration(_))
                ),
                "port {port:?} should not parse"
            );
        }
    }
}
