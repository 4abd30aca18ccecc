//! Slack Socket Mode transport: opens the WebSocket, classifies envelopes into
//! [`InboundEvent`]s and writes acknowledgements back on the same socket.

use super::api::SlackApiClient;
use crate::channels::{
    AckHandle, Acknowledger, ChannelType, ChatMessage, ConnectionEvent, InboundEvent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

const ACK_QUEUE: usize = 16;

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    event: Option<SlackEvent>,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
}

/// Turn one text frame into an event. Never fails: anything unexpected becomes `Unhandled`.
pub fn classify_frame(text: &str, session: u64) -> InboundEvent {
    let envelope = match serde_json::from_str::<SocketEnvelope>(text) {
        Ok(e) => e,
        Err(e) => {
            return InboundEvent::Unhandled {
                ack: None,
                description: format!("unparseable socket frame: {}", e),
            }
        }
    };
    match envelope.envelope_type.as_str() {
        "hello" => return InboundEvent::Connection(ConnectionEvent::Hello),
        "disconnect" => {
            let reason = envelope.reason.unwrap_or_else(|| "unknown".to_string());
            return InboundEvent::Connection(ConnectionEvent::Disconnect(reason));
        }
        _ => {}
    }

    let ack = envelope
        .envelope_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| AckHandle::new(session, id));
    if envelope.envelope_type != "events_api" {
        return InboundEvent::Unhandled {
            ack,
            description: format!("{} envelope", envelope.envelope_type),
        };
    }
    let Some(ack) = ack else {
        return InboundEvent::Unhandled {
            ack: None,
            description: "events_api envelope without envelope_id".to_string(),
        };
    };
    classify_callback(envelope.payload, ack)
}

fn classify_callback(payload: Value, ack: AckHandle) -> InboundEvent {
    let callback = match serde_json::from_value::<EventCallback>(payload) {
        Ok(c) => c,
        Err(e) => {
            return InboundEvent::Unhandled {
                ack: Some(ack),
                description: format!("undecodable events_api payload: {}", e),
            }
        }
    };
    if callback.callback_type != "event_callback" {
        return InboundEvent::Unhandled {
            ack: Some(ack),
            description: format!("unsupported events_api type: {}", callback.callback_type),
        };
    }
    let Some(event) = callback.event else {
        return InboundEvent::Unhandled {
            ack: Some(ack),
            description: "event_callback without event".to_string(),
        };
    };

    let channel_type = match (event.event_type.as_str(), event.channel_type.as_deref()) {
        ("app_mention", _) => ChannelType::Channel,
        ("message", Some("im")) if event.subtype.is_none() => ChannelType::Im,
        (kind, _) => {
            let description = match &event.subtype {
                Some(sub) => format!("{} event ({})", kind, sub),
                None => format!("{} event", kind),
            };
            return InboundEvent::Unhandled {
                ack: Some(ack),
                description,
            };
        }
    };
    let (Some(sender), Some(conversation_id)) = (event.user, event.channel) else {
        return InboundEvent::Unhandled {
            ack: Some(ack),
            description: format!("{} event without user or channel", event.event_type),
        };
    };
    let message = ChatMessage {
        sender,
        conversation_id,
        text: event.text.unwrap_or_default(),
        channel_type: channel_type.clone(),
    };
    match channel_type {
        ChannelType::Channel => InboundEvent::Mention { ack, message },
        ChannelType::Im => InboundEvent::DirectMessage { ack, message },
    }
}

/// Ack request from the dispatcher to the socket writer; `done` fires after the frame is written.
struct AckRequest {
    handle: AckHandle,
    done: oneshot::Sender<Result<(), String>>,
}

/// Handed to the dispatcher; writes acks through the transport's current socket.
#[derive(Clone)]
pub struct SocketAcknowledger {
    tx: mpsc::Sender<AckRequest>,
}

#[async_trait]
impl Acknowledger for SocketAcknowledger {
    async fn acknowledge(&self, handle: AckHandle) -> Result<(), String> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(AckRequest { handle, done })
            .await
            .map_err(|_| "socket mode transport stopped".to_string())?;
        wait.await
            .map_err(|_| "socket closed before the ack was written".to_string())?
    }
}

enum SessionEnd {
    /// Socket closed or the server asked for a reconnect.
    Closed,
    /// Nobody is listening for events any more.
    ReceiverClosed,
}

/// Socket Mode connection loop. Reconnects after a fixed delay when a session ends.
pub struct SocketModeTransport {
    api: SlackApiClient,
    reconnect_delay: Duration,
    ack_rx: mpsc::Receiver<AckRequest>,
}

impl SocketModeTransport {
    pub fn new(api: SlackApiClient, reconnect_delay: Duration) -> (Self, SocketAcknowledger) {
        let (tx, ack_rx) = mpsc::channel(ACK_QUEUE);
        let transport = Self {
            api,
            reconnect_delay,
            ack_rx,
        };
        (transport, SocketAcknowledger { tx })
    }

    /// Forward events until `events` is closed. Connection problems are reported as
    /// [`ConnectionEvent`]s, never returned.
    pub async fn run(mut self, events: mpsc::UnboundedSender<InboundEvent>) {
        let mut session: u64 = 0;
        loop {
            self.reject_pending_acks();
            if events
                .send(InboundEvent::Connection(ConnectionEvent::Connecting))
                .is_err()
            {
                break;
            }
            let url = match self.api.open_socket_url().await {
                Ok(url) => url,
                Err(e) => {
                    let _ = events.send(InboundEvent::Connection(
                        ConnectionEvent::ConnectionError(format!("{:#}", e)),
                    ));
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };
            session += 1;
            match self.run_session(&url, session, &events).await {
                Ok(SessionEnd::ReceiverClosed) => break,
                Ok(SessionEnd::Closed) => {
                    log::debug!("socket mode session {} ended, reconnecting", session);
                }
                Err(e) => {
                    let _ = events.send(InboundEvent::Connection(
                        ConnectionEvent::ConnectionError(format!("{:#}", e)),
                    ));
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
        log::info!("socket mode transport stopped");
    }

    /// Acks queued while no socket is open can never be written.
    fn reject_pending_acks(&mut self) {
        while let Ok(request) = self.ack_rx.try_recv() {
            let _ = request.done.send(Err(format!(
                "no open socket for envelope {}",
                request.handle.envelope_id()
            )));
        }
    }

    async fn run_session(
        &mut self,
        url: &str,
        session: u64,
        events: &mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<SessionEnd> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();
        if events
            .send(InboundEvent::Connection(ConnectionEvent::Connected))
            .is_err()
        {
            return Ok(SessionEnd::ReceiverClosed);
        }

        loop {
            tokio::select! {
                frame = source.next() => {
                    let Some(frame) = frame else {
                        return Ok(SessionEnd::Closed);
                    };
                    let text = match frame.context("failed reading slack websocket message")? {
                        WsMessage::Text(text) => text,
                        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
                            .context("invalid utf-8 slack socket payload")?,
                        WsMessage::Close(_) => return Ok(SessionEnd::Closed),
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                    };
                    let event = classify_frame(&text, session);
                    let disconnect = matches!(
                        event,
                        InboundEvent::Connection(ConnectionEvent::Disconnect(_))
                    );
                    if events.send(event).is_err() {
                        return Ok(SessionEnd::ReceiverClosed);
                    }
                    if disconnect {
                        return Ok(SessionEnd::Closed);
                    }
                }
                Some(request) = self.ack_rx.recv() => {
                    if request.handle.session() != session {
                        let _ = request.done.send(Err(format!(
                            "envelope {} belongs to a closed socket session",
                            request.handle.envelope_id()
                        )));
                        continue;
                    }
                    let frame = serde_json::json!({ "envelope_id": request.handle.envelope_id() });
                    let written = sink
                        .send(WsMessage::Text(frame.to_string()))
                        .await
                        .map_err(|e| format!("failed to send slack socket ack: {}", e));
                    let failed = written.is_err();
                    let _ = request.done.send(written);
                    if failed {
                        anyhow::bail!("socket mode ack write failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_api(event: Value) -> String {
        json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": {
                "type": "event_callback",
                "event_id": "Ev1",
                "event": event
            }
        })
        .to_string()
    }

    #[test]
    fn hello_is_lifecycle() {
        let frame = r#"{"type":"hello","num_connections":1,"debug_info":{"host":"x"}}"#;
        assert_eq!(
            classify_frame(frame, 1),
            InboundEvent::Connection(ConnectionEvent::Hello)
        );
    }

    #[test]
    fn disconnect_carries_reason() {
        let frame = r#"{"type":"disconnect","reason":"refresh_requested"}"#;
        assert_eq!(
            classify_frame(frame, 1),
            InboundEvent::Connection(ConnectionEvent::Disconnect("refresh_requested".into()))
        );
    }

    #[test]
    fn app_mention_becomes_mention() {
        let frame = events_api(json!({
            "type": "app_mention",
            "user": "U2",
            "text": "<@U1> hello world",
            "channel": "C1",
            "ts": "1700000000.000100"
        }));
        assert_eq!(
            classify_frame(&frame, 3),
            InboundEvent::Mention {
                ack: AckHandle::new(3, "env-1"),
                message: ChatMessage {
                    sender: "U2".into(),
                    conversation_id: "C1".into(),
                    text: "<@U1> hello world".into(),
                    channel_type: ChannelType::Channel,
                },
            }
        );
    }

    #[test]
    fn im_message_becomes_direct_message() {
        let frame = events_api(json!({
            "type": "message",
            "channel_type": "im",
            "user": "U2",
            "text": "draft post",
            "channel": "D1"
        }));
        match classify_frame(&frame, 1) {
            InboundEvent::DirectMessage { ack, message } => {
                assert_eq!(ack.envelope_id(), "env-1");
                assert_eq!(message.text, "draft post");
                assert_eq!(message.channel_type, ChannelType::Im);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_message_is_unhandled_but_acked() {
        let frame = events_api(json!({
            "type": "message",
            "channel_type": "channel",
            "user": "U2",
            "text": "chatter",
            "channel": "C1"
        }));
        match classify_frame(&frame, 1) {
            InboundEvent::Unhandled { ack, .. } => assert!(ack.is_some()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn im_message_with_subtype_is_unhandled() {
        let frame = events_api(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel_type": "im",
            "channel": "D1"
        }));
        match classify_frame(&frame, 1) {
            InboundEvent::Unhandled { ack, description } => {
                assert!(ack.is_some());
                assert!(description.contains("message_changed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn member_joined_is_unhandled() {
        let frame = events_api(json!({
            "type": "member_joined_channel",
            "user": "U3",
            "channel": "C1"
        }));
        assert_eq!(classify_frame(&frame, 1).category(), "unhandled");
    }

    #[test]
    fn slash_commands_and_interactive_are_acked_and_ignored() {
        for kind in ["slash_commands", "interactive"] {
            let frame = json!({ "envelope_id": "env-9", "type": kind, "payload": {} }).to_string();
            match classify_frame(&frame, 2) {
                InboundEvent::Unhandled { ack, .. } => {
                    assert_eq!(ack, Some(AckHandle::new(2, "env-9")));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn garbage_frame_has_no_ack() {
        match classify_frame("not json", 1) {
            InboundEvent::Unhandled { ack, description } => {
                assert!(ack.is_none());
                assert!(description.starts_with("unparseable"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn mention_without_text_has_empty_text() {
        let frame = events_api(json!({ "type": "app_mention", "user": "U2", "channel": "C1" }));
        match classify_frame(&frame, 1) {
            InboundEvent::Mention { message, .. } => assert_eq!(message.text, ""),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn acknowledge_fails_once_transport_is_gone() {
        let creds = crate::config::SlackCredentials {
            app_token: "xapp-a".into(),
            bot_token: "xoxb-b".into(),
        };
        let api = SlackApiClient::new("http://127.0.0.1:9".into(), &creds, Duration::from_secs(1))
            .expect("client");
        let (transport, acker) = SocketModeTransport::new(api, Duration::from_millis(10));
        drop(transport);
        let err = acker.acknowledge(AckHandle::new(1, "env-1")).await.unwrap_err();
        assert!(err.contains("stopped"));
    }
}
