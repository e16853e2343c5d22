//! Realtime connection manager: keeps a websocket open and turns frames into inbound events.

use super::api::SlackApi;
use crate::channels::outbound::{ChannelError, Outbound};
use crate::events::{ConnectionInfo, EventSender, HumanMessage, InboundEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_BASE: Duration = Duration::from_secs(2);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reply_to: Option<u64>,
    #[serde(default)]
    error: Option<FrameError>,
}

#[derive(Debug, Deserialize)]
struct FrameError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// How a socket session ended.
enum SessionEnd {
    /// Reconnect and keep going.
    Reconnect,
    /// Inbound queue closed; nobody is listening anymore.
    QueueClosed,
}

/// Translate one realtime frame into an event. `None` for frames that carry nothing to dispatch.
fn frame_to_event(frame: Frame, pings: &mut HashMap<u64, Instant>) -> Option<InboundEvent> {
    let kind = frame.kind.as_deref().unwrap_or("");
    match kind {
        "hello" => {
            log::debug!("rtm: hello");
            None
        }
        "message" => Some(InboundEvent::HumanMessage(HumanMessage {
            sender_id: frame.user.unwrap_or_default(),
            channel_id: frame.channel.unwrap_or_default(),
            text: frame.text.unwrap_or_default(),
            subtype: frame.subtype,
        })),
        "pong" => {
            let sent = frame.reply_to.and_then(|id| pings.remove(&id))?;
            Some(InboundEvent::LatencyReport(sent.elapsed()))
        }
        "error" => {
            let message = frame
                .error
                .map(|e| format!("{} (code {})", e.msg, e.code))
                .unwrap_or_else(|| "unknown realtime error".to_string());
            Some(InboundEvent::ConnectionError {
                fatal: false,
                message,
            })
        }
        // Acks for our own pings/sends without a type.
        "" if frame.reply_to.is_some() => None,
        other => Some(InboundEvent::Unrecognized {
            kind: other.to_string(),
        }),
    }
}

/// Realtime connector for one bot token.
pub struct RtmConnection {
    api: Arc<SlackApi>,
}

impl RtmConnection {
    pub fn new(api: Arc<SlackApi>) -> Self {
        Self { api }
    }

    /// Run the connect/read/reconnect loop in its own task.
    pub fn start(self, events: EventSender) -> JoinHandle<()> {
        log::info!("rtm: starting realtime connection");
        tokio::spawn(async move { self.run(events).await })
    }

    async fn run(self, events: EventSender) {
        let mut backoff = RECONNECT_BASE;
        loop {
            let session = match self.api.rtm_connect().await {
                Ok(s) => s,
                Err(ChannelError::InvalidAuth(e)) => {
                    log::error!("rtm: credentials rejected: {}", e);
                    let _ = events.send(InboundEvent::ConnectionError {
                        fatal: true,
                        message: format!("invalid credentials: {}", e),
                    });
                    return;
                }
                Err(e) => {
                    if events
                        .send(InboundEvent::ConnectionError {
                            fatal: false,
                            message: e.to_string(),
                        })
                        .is_err()
                    {
                        return;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                    continue;
                }
            };

            let info = ConnectionInfo {
                self_id: session.self_id.clone(),
                channels: self.api.list_channels().await.unwrap_or_else(|e| {
                    log::warn!("rtm: listing channels on connect failed: {}", e);
                    Vec::new()
                }),
                groups: self.api.list_groups().await.unwrap_or_else(|e| {
                    log::warn!("rtm: listing groups on connect failed: {}", e);
                    Vec::new()
                }),
            };

            match self.read_socket(&session.url, info, &events).await {
                Ok(SessionEnd::QueueClosed) => {
                    log::debug!("rtm: inbound queue closed, stopping");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    backoff = RECONNECT_BASE;
                }
                Err(e) => {
                    if events
                        .send(InboundEvent::ConnectionError {
                            fatal: false,
                            message: e,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    }

    async fn read_socket(
        &self,
        url: &str,
        info: ConnectionInfo,
        events: &EventSender,
    ) -> Result<SessionEnd, String> {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| format!("websocket connect failed: {}", e))?;
        log::info!(
            "rtm: connected as {} ({} channels, {} groups)",
            info.self_id,
            info.channels.len(),
            info.groups.len()
        );
        if events.send(InboundEvent::ConnectionEstablished(info)).is_err() {
            return Ok(SessionEnd::QueueClosed);
        }

        let mut pings: HashMap<u64, Instant> = HashMap::new();
        let mut next_ping_id: u64 = 1;
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let id = next_ping_id;
                    next_ping_id += 1;
                    pings.insert(id, Instant::now());
                    let ping = serde_json::json!({ "id": id, "type": "ping" });
                    ws.send(Message::Text(ping.to_string()))
                        .await
                        .map_err(|e| format!("websocket ping failed: {}", e))?;
                }
                frame = ws.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("rtm: socket closed, reconnecting");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(format!("websocket read failed: {}", e)),
                    };
                    log::trace!("rtm frame: {}", text);
                    let frame: Frame = match serde_json::from_str(&text) {
                        Ok(f) => f,
                        Err(e) => {
                            log::debug!("rtm: undecodable frame: {}", e);
                            continue;
                        }
                    };
                    if frame.kind.as_deref() == Some("goodbye") {
                        log::info!("rtm: server said goodbye, reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    if let Some(event) = frame_to_event(frame, &mut pings) {
                        if events.send(event).is_err() {
                            return Ok(SessionEnd::QueueClosed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Frame {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn message_frame_becomes_human_message() {
        let mut pings = HashMap::new();
        let ev = frame_to_event(
            frame(r#"{"type":"message","user":"U1","channel":"C1","text":"hi <@U0BOT>"}"#),
            &mut pings,
        );
        match ev {
            Some(InboundEvent::HumanMessage(m)) => {
                assert_eq!(m.sender_id, "U1");
                assert_eq!(m.channel_id, "C1");
                assert_eq!(m.text, "hi <@U0BOT>");
                assert!(m.subtype.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn edited_message_keeps_subtype() {
        let mut pings = HashMap::new();
        let ev = frame_to_event(
            frame(r#"{"type":"message","subtype":"message_changed","channel":"C1"}"#),
            &mut pings,
        );
        assert!(matches!(
            ev,
            Some(InboundEvent::HumanMessage(HumanMessage { subtype: Some(ref s), .. })) if s == "message_changed"
        ));
    }

    #[test]
    fn pong_for_known_ping_reports_latency() {
        let mut pings = HashMap::new();
        pings.insert(4, Instant::now());
        let ev = frame_to_event(frame(r#"{"type":"pong","reply_to":4}"#), &mut pings);
        assert!(matches!(ev, Some(InboundEvent::LatencyReport(_))));
        assert!(pings.is_empty());
        let ev = frame_to_event(frame(r#"{"type":"pong","reply_to":4}"#), &mut pings);
        assert!(ev.is_none());
    }

    #[test]
    fn error_frame_is_not_fatal() {
        let mut pings = HashMap::new();
        let ev = frame_to_event(
            frame(r#"{"type":"error","error":{"code":1,"msg":"Socket URL has expired"}}"#),
            &mut pings,
        );
        assert!(matches!(
            ev,
            Some(InboundEvent::ConnectionError { fatal: false, .. })
        ));
    }

    #[test]
    fn unknown_types_pass_through_as_unrecognized() {
        let mut pings = HashMap::new();
        let ev = frame_to_event(frame(r#"{"type":"presence_change","user":"U1"}"#), &mut pings);
        assert!(matches!(ev, Some(InboundEvent::Unrecognized { ref kind }) if kind == "presence_change"));
        assert!(frame_to_event(frame(r#"{"type":"hello"}"#), &mut pings).is_none());
        assert!(frame_to_event(frame(r#"{"ok":true,"reply_to":9}"#), &mut pings).is_none());
    }
}
