//! Communication channels (Slack).
//!
//! Event types and the acknowledgement/reply traits the dispatcher talks to, plus the Slack
//! implementation of both: Socket Mode for inbound events and the Web API for replies.

mod inbound;
mod reply;
pub mod slack;

pub use inbound::{
    AckHandle, Acknowledger, ChannelType, ChatMessage, ConnectionEvent, InboundEvent,
};
pub use reply::ReplySender;
