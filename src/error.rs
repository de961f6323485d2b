//! Everything that can go wrong while running a chat session.
//!
//! Nothing here is fatal: every failure path puts the manager back in
//! `Idle`, from which `start` may simply be invoked again.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Bad user-supplied address or port; surfaced before any I/O happens.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A session is already starting, connected, or stopping.
    #[error("a session is already active")]
    AlreadyActive,
    /// `stop` was invoked while the connection was still being established.
    /// A normal abort, not something to show the user as an error.
    #[error("cancelled before the connection was established")]
    Cancelled,
    /// Bind, listen, accept, or dial failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The stream died underneath the receive loop.
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// The stream died underneath a send.
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// `send` called without a live connection.
    #[error("not connected")]
    NotConnected,
    /// Blank input produces no network traffic.
    #[error("refusing to send an empty message")]
    Empty,
}
