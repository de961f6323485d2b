//! Events handed from the session core to whatever front end is listening.

use tokio::sync::mpsc;

/// One event on the session-to-consumer channel.
///
/// The core makes no threading promise about where these are produced;
/// the consumer marshals them onto its own presentation context if it
/// needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A line received from the peer, verbatim, in read order.
    Inbound(String),
    /// Connection progress: listening, peer arrived, peer left.
    Notice(String),
    /// A mid-session failure worth surfacing.
    Error(String),
}

pub type EventTx = mpsc::UnboundedSender<ChatEvent>;
pub type EventRx = mpsc::UnboundedReceiver<ChatEvent>;
