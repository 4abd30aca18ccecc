//! Inbound events from the workspace transport, classified into a closed set of categories.

use async_trait::async_trait;

/// Proof that an event still needs acknowledging. Not `Clone`: acknowledging consumes it,
/// so an event can be acknowledged at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct AckHandle {
    session: u64,
    envelope_id: String,
}

impl AckHandle {
    pub fn new(session: u64, envelope_id: impl Into<String>) -> Self {
        Self {
            session,
            envelope_id: envelope_id.into(),
        }
    }

    /// Socket session the event arrived on; acks are only valid on that session.
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn envelope_id(&self) -> &str {
        &self.envelope_id
    }
}

/// Sends acknowledgements back to the transport.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Resolves once the acknowledgement has been written (or failed).
    async fn acknowledge(&self, handle: AckHandle) -> Result<(), String>;
}

/// Connection lifecycle notices. Logged only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    ConnectionError(String),
    Hello,
    /// The server asked us to reconnect (e.g. "refresh_requested").
    Disconnect(String),
}

/// Kind of conversation a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelType {
    /// Public or private channel (mentions).
    Channel,
    /// One-to-one direct message.
    Im,
}

/// A message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub conversation_id: String,
    pub text: String,
    pub channel_type: ChannelType,
}

/// One event from the transport. Consumed exactly once by the dispatcher.
#[derive(Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Connection(ConnectionEvent),
    Mention {
        ack: AckHandle,
        message: ChatMessage,
    },
    DirectMessage {
        ack: AckHandle,
        message: ChatMessage,
    },
    /// Anything else (other event subtypes, interactive payloads, slash commands).
    Unhandled {
        ack: Option<AckHandle>,
        description: String,
    },
}

impl InboundEvent {
    pub fn category(&self) -> &'static str {
        match self {
            InboundEvent::Connection(_) => "connection",
            InboundEvent::Mention { .. } => "mention",
            InboundEvent::DirectMessage { .. } => "direct_message",
            InboundEvent::Unhandled { .. } => "unhandled",
        }
    }
}
