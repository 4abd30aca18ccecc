//! Poast core library: relays Slack mentions and direct messages to Twitter and replies with
//! the result. Used by the `poast` CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod identity;
pub mod init;
pub mod publish;
pub mod twitter;
