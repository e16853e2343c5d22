//! Inbound events: everything the dispatcher consumes, from the realtime connection and the webhook bridges.
//!
//! Producers push [`InboundEvent`] values onto one unbounded queue; the dispatcher owns each
//! event once it is received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sending half of the inbound queue. Cloned into every producer.
pub type EventSender = mpsc::UnboundedSender<InboundEvent>;

/// Receiving half of the inbound queue. Owned by the dispatcher.
pub type EventReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Create the inbound queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A channel listing entry. Public channels carry a membership flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub is_member: bool,
}

/// A private group. The bot only ever sees groups it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: String,
}

/// Identity and membership reported when the realtime connection comes up.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub self_id: String,
    pub channels: Vec<ChannelInfo>,
    pub groups: Vec<GroupInfo>,
}

/// A message typed by someone in a channel, group or direct conversation.
#[derive(Debug, Clone)]
pub struct HumanMessage {
    pub sender_id: String,
    pub channel_id: String,
    pub text: String,
    /// Platform subtype (e.g. "message_changed"); `None` for plain messages.
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    pub author: CommitAuthor,
}

/// Push payload as posted by the code-hosting webhook. Commits arrive oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub commits: Vec<Commit>,
}

/// Free-form message posted to the relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Alert posted by the monitoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringAlert {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub message: String,
}

/// Every event kind the dispatcher handles. Matching on this is exhaustive.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    ConnectionEstablished(ConnectionInfo),
    HumanMessage(HumanMessage),
    LatencyReport(Duration),
    ConnectionError { fatal: bool, message: String },
    RepositoryPush(PushEvent),
    GenericRelay(RelayMessage),
    MonitoringAlert(MonitoringAlert),
    /// A realtime frame whose type has no typed counterpart here.
    Unrecognized { kind: String },
}

impl InboundEvent {
    /// Short tag used in logs.
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::ConnectionEstablished(_) => "connection_established",
            InboundEvent::HumanMessage(_) => "human_message",
            InboundEvent::LatencyReport(_) => "latency_report",
            InboundEvent::ConnectionError { .. } => "connection_error",
            InboundEvent::RepositoryPush(_) => "repository_push",
            InboundEvent::GenericRelay(_) => "generic_relay",
            InboundEvent::MonitoringAlert(_) => "monitoring_alert",
            InboundEvent::Unrecognized { kind } => kind.as_str(),
        }
    }
}
