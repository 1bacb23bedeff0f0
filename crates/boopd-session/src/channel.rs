//! Transport-neutral client channel.
//!
//! The upgrade handshake and the socket itself belong to the hosting
//! runtime; a session is handed this pair of endpoints once the
//! bidirectional message channel is established. Inbound traffic
//! arrives as [`ChannelEvent`]s; the session's replies and the final
//! close go out as [`ChannelCommand`]s. Sends are fire-and-forget
//! into the transport's outbound queue — admission decisions never
//! await the network.

use tokio::sync::mpsc;

use boopd_types::CloseCode;

// ---------------------------------------------------------------------------
// Events and commands
// ---------------------------------------------------------------------------

/// Inbound traffic from the transport.
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    /// One text frame.
    Text(String),
    /// One binary frame. The protocol is text-only; these are ignored
    /// with a warning.
    Binary(Vec<u8>),
    /// The peer (or the transport) closed the channel.
    Closed,
}

/// Outbound instructions to the transport.
#[derive(Clone, Debug)]
pub enum ChannelCommand {
    /// Queue one text frame.
    Send(String),
    /// Close the channel with the given code and reason.
    Close {
        /// Close code (1000/1001/1002).
        code: CloseCode,
        /// Human-readable close reason.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ClientChannel
// ---------------------------------------------------------------------------

/// The session's two ends of an established channel.
pub struct ClientChannel {
    /// Inbound transport events.
    pub inbound: mpsc::Receiver<ChannelEvent>,
    /// Outbound command queue.
    pub outbound: mpsc::UnboundedSender<ChannelCommand>,
}

/// The transport's two ends, mirroring [`ClientChannel`].
pub struct TransportEnd {
    /// Feed inbound events to the session.
    pub events: mpsc::Sender<ChannelEvent>,
    /// Drain the session's outbound commands.
    pub commands: mpsc::UnboundedReceiver<ChannelCommand>,
}

impl ClientChannel {
    /// Creates a connected channel pair: the session side and the
    /// transport side. `buffer` bounds the inbound event queue so a
    /// flooding client backpressures its own transport task.
    pub fn pair(buffer: usize) -> (Self, TransportEnd) {
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        (
            Self {
                inbound: event_rx,
                outbound: command_tx,
            },
            TransportEnd {
                events: event_tx,
                commands: command_rx,
            },
        )
    }
}
