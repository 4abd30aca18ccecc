//! Event dispatcher: classifies each inbound event, acknowledges it, turns operator messages
//! into posts and reports the outcome back to the conversation.
//!
//! Events are handled one at a time in delivery order. Every event that carries an
//! acknowledgement handle is acknowledged exactly once, before anything slow (publish, reply)
//! happens for it.

use crate::channels::{
    AckHandle, Acknowledger, ChatMessage, ConnectionEvent, InboundEvent, ReplySender,
};
use crate::identity::Identity;
use crate::publish::{PostGateway, PostResult};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sent when the bot is mentioned without the leading mention prefix.
pub const HELP_TEXT: &str =
    "Hi 👋. If you want me to tweet something, start your message with `@Poast `.";

/// What the dispatcher did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Connection lifecycle notice, logged.
    Lifecycle,
    /// Acknowledged (if needed) and otherwise ignored.
    Ignored,
    /// Sent by the bot itself; dropped.
    SelfAuthored,
    /// The ack could not be written; the transport will redeliver, so nothing else was done.
    AckFailed,
    /// Mention without the prefix; usage instructions sent.
    HelpSent,
    /// Publish attempted; the result was (or was attempted to be) sent as a reply.
    Published(PostResult),
}

pub struct Dispatcher {
    identity: Identity,
    gateway: PostGateway,
    acker: Arc<dyn Acknowledger>,
    replies: Arc<dyn ReplySender>,
}

impl Dispatcher {
    pub fn new(
        identity: Identity,
        gateway: PostGateway,
        acker: Arc<dyn Acknowledger>,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            identity,
            gateway,
            acker,
            replies,
        }
    }

    /// Drain events until the transport side closes the channel.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
        while let Some(event) = events.recv().await {
            let category = event.category();
            let outcome = self.handle(event).await;
            log::debug!("{} event handled: {:?}", category, outcome);
        }
        log::info!("event stream closed, dispatcher stopping");
    }

    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        match event {
            InboundEvent::Connection(notice) => {
                log_lifecycle(&notice);
                Outcome::Lifecycle
            }
            InboundEvent::Mention { ack, message } => {
                if !self.acknowledge(ack).await {
                    return Outcome::AckFailed;
                }
                if self.is_own(&message) {
                    return Outcome::SelfAuthored;
                }
                log::info!("mentioned: {}", message.text);
                let prefix = self.identity.mention_prefix();
                match message.text.strip_prefix(prefix.as_str()) {
                    Some(rest) => self.publish_and_reply(&message.conversation_id, rest).await,
                    None => {
                        self.reply(&message.conversation_id, HELP_TEXT).await;
                        Outcome::HelpSent
                    }
                }
            }
            InboundEvent::DirectMessage { ack, message } => {
                if !self.acknowledge(ack).await {
                    return Outcome::AckFailed;
                }
                if self.is_own(&message) {
                    return Outcome::SelfAuthored;
                }
                log::info!("direct message: {}", message.text);
                let prefix = self.identity.mention_prefix();
                let text = message
                    .text
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(&message.text);
                self.publish_and_reply(&message.conversation_id, text).await
            }
            InboundEvent::Unhandled { ack, description } => {
                if let Some(ack) = ack {
                    if !self.acknowledge(ack).await {
                        return Outcome::AckFailed;
                    }
                }
                log::debug!("ignored {}", description);
                Outcome::Ignored
            }
        }
    }

    fn is_own(&self, message: &ChatMessage) -> bool {
        message.sender == self.identity.workspace_user_id
    }

    async fn acknowledge(&self, ack: AckHandle) -> bool {
        let envelope_id = ack.envelope_id().to_string();
        match self.acker.acknowledge(ack).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("failed to acknowledge envelope {}: {}", envelope_id, e);
                false
            }
        }
    }

    async fn publish_and_reply(&self, conversation_id: &str, text: &str) -> Outcome {
        let result = self.gateway.publish(text).await;
        self.reply(conversation_id, &result.reply_text()).await;
        Outcome::Published(result)
    }

    async fn reply(&self, conversation_id: &str, text: &str) {
        if let Err(e) = self.replies.send_reply(conversation_id, text).await {
            log::warn!("reply to {} failed: {}", conversation_id, e);
        }
    }
}

fn log_lifecycle(notice: &ConnectionEvent) {
    match notice {
        ConnectionEvent::Connecting => log::info!("connecting to Slack with Socket Mode..."),
        ConnectionEvent::Connected => log::info!("connected to Slack with Socket Mode"),
        ConnectionEvent::ConnectionError(e) => {
            log::warn!("connection failed, retrying later: {}", e)
        }
        ConnectionEvent::Hello => log::info!("got hello message"),
        ConnectionEvent::Disconnect(reason) => {
            log::info!("slack requested disconnect ({}), reconnecting", reason)
        }
    }
}
