//! Slack channel: Socket Mode for inbound events, Web API for identity and replies.

mod api;
mod socket;

pub use api::{escape_text, BotUser, SlackApiClient};
pub use socket::{classify_frame, SocketAcknowledger, SocketModeTransport};
