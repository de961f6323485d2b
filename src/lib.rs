//! # A minimal two-party LAN chat over TCP.
//!
//! One side listens for exactly one inbound connection (server role); the
//! other dials out (client role). Once connected, either side sends lines
//! on demand while a background receive loop drains the peer's lines into
//! an event channel. Stopping (explicitly, on peer disconnect, or on an
//! I/O error) always lands back in `Idle`, from which a new session can
//! be started.
//!
//! Messages are newline-delimited UTF-8 text; there is no framing, no
//! authentication, and no reconnect policy. One connection is the whole
//! capacity.
//!
//! Architecture:
//!
//! ```text
//!    start(role, endpoint)   send(text)   stop()
//!          v                     v          v
//!  +--------------------------------------------+
//!  |                 ChatManager                |
//!  |    Idle -> Starting -> Connected -> Idle   |
//!  +---------+----------------------+-----------+
//!            | receive loop         | Arc<Mutex<_>>
//!            v                      v
//!       LineReader             LineWriter
//!            \                     /
//!         Framed<TcpStream, LineCodec>
//!                      |
//!                  TcpStream
//!
//!  ChatEvent --UnboundedChannel--> terminal (or any other front end)
//! ```

pub mod codec;
pub mod error;
pub mod event;
pub mod manager;
pub mod terminal;
pub mod transport;

pub use error::ChatError;
pub use event::{ChatEvent, EventRx, EventTx};
pub use manager::{ChatManager, ConnectionState, Endpoint, Role};
