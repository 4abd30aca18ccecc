//! Outbound replies into a workspace conversation.

use async_trait::async_trait;

/// Posts a text reply into a conversation. Fire-and-forget for callers: errors are reported
/// so they can be logged, never retried.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, conversation_id: &str, text: &str) -> Result<(), String>;
}
