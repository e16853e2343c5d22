//! Event dispatcher: the single loop draining the inbound queue.
//!
//! Tracks connection state, filters human messages, runs matched actions and routes webhook
//! events to the fanout. Ends on a fatal connection error or when every producer is gone.

use crate::channels::OutboundHandle;
use crate::events::{
    ChannelInfo, ConnectionInfo, EventReceiver, GroupInfo, HumanMessage, InboundEvent,
};
use crate::executor::Executor;
use crate::fanout;
use crate::matcher;
use crate::status::StatusAggregator;
use std::sync::Arc;

/// Subtype of edits to an earlier message; those are never answered.
const MESSAGE_CHANGED: &str = "message_changed";
/// Direct-message channel ids start with this character.
const DIRECT_MESSAGE_PREFIX: char = 'D';

/// Identity and membership captured from the last connection.
///
/// Only `own_user_id` drives dispatch. The membership lists are a snapshot for
/// inspection; fanout re-lists channels at send time.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub own_user_id: String,
    pub channels: Vec<ChannelInfo>,
    pub groups: Vec<GroupInfo>,
}

impl From<ConnectionInfo> for ConnectionState {
    fn from(info: ConnectionInfo) -> Self {
        Self {
            own_user_id: info.self_id,
            channels: info.channels,
            groups: info.groups,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DispatchState {
    AwaitingConnection,
    Connected(ConnectionState),
    Terminated,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The platform rejected our credentials.
    Fatal(String),
    /// All producers dropped their senders.
    QueueClosed,
}

pub fn is_direct_message(channel_id: &str) -> bool {
    channel_id.starts_with(DIRECT_MESSAGE_PREFIX)
}

/// True if the bot should answer `msg`.
pub fn should_answer(state: &ConnectionState, msg: &HumanMessage) -> bool {
    if msg.sender_id == state.own_user_id {
        return false;
    }
    if msg.subtype.as_deref() == Some(MESSAGE_CHANGED) {
        return false;
    }
    msg.text.contains(&state.own_user_id) || is_direct_message(&msg.channel_id)
}

pub struct Dispatcher {
    state: DispatchState,
    outbound: OutboundHandle,
    executor: Executor,
    status: Arc<StatusAggregator>,
}

impl Dispatcher {
    pub fn new(outbound: OutboundHandle, executor: Executor, status: Arc<StatusAggregator>) -> Self {
        Self {
            state: DispatchState::AwaitingConnection,
            outbound,
            executor,
            status,
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Drain `events` until a fatal error or until the queue closes.
    pub async fn run(&mut self, mut events: EventReceiver) -> DispatchOutcome {
        log::info!("dispatcher: waiting for events");
        while let Some(event) = events.recv().await {
            log::trace!("dispatcher: event {}", event.kind());
            if let Some(outcome) = self.handle(event).await {
                log::info!("dispatcher: stopped ({:?})", outcome);
                return outcome;
            }
        }
        log::info!("dispatcher: inbound queue closed");
        DispatchOutcome::QueueClosed
    }

    /// Handle one event. Returns `Some` when the loop must stop.
    pub async fn handle(&mut self, event: InboundEvent) -> Option<DispatchOutcome> {
        match event {
            InboundEvent::ConnectionEstablished(info) => {
                log::info!(
                    "dispatcher: connected as {} ({} channels, {} groups)",
                    info.self_id,
                    info.channels.len(),
                    info.groups.len()
                );
                self.state = DispatchState::Connected(info.into());
            }
            InboundEvent::HumanMessage(msg) => self.on_message(msg).await,
            InboundEvent::LatencyReport(latency) => {
                log::debug!("dispatcher: current latency {:?}", latency);
            }
            InboundEvent::ConnectionError { fatal: true, message } => {
                log::error!("dispatcher: fatal connection error: {}", message);
                self.state = DispatchState::Terminated;
                return Some(DispatchOutcome::Fatal(message));
            }
            InboundEvent::ConnectionError { fatal: false, message } => {
                log::warn!("dispatcher: connection error: {}", message);
            }
            InboundEvent::RepositoryPush(push) => {
                self.broadcast("repository push", &fanout::render_push(&push))
                    .await;
            }
            InboundEvent::GenericRelay(relay) => {
                self.broadcast("relay", &fanout::render_relay(&relay)).await;
            }
            InboundEvent::MonitoringAlert(alert) => {
                self.status.update(&alert);
                self.broadcast("monitoring alert", &fanout::render_alert(&alert))
                    .await;
            }
            InboundEvent::Unrecognized { kind } => {
                log::debug!("dispatcher: ignoring unrecognized event {:?}", kind);
            }
        }
        None
    }

    async fn on_message(&mut self, mut msg: HumanMessage) {
        let DispatchState::Connected(ref conn) = self.state else {
            log::debug!(
                "dispatcher: message in {} before connection established, ignored",
                msg.channel_id
            );
            return;
        };
        if !should_answer(conn, &msg) {
            return;
        }
        msg.text = msg.text.to_lowercase();
        let actions = matcher::classify(&msg.text);
        log::debug!(
            "dispatcher: {} in {} -> {:?}",
            msg.sender_id,
            msg.channel_id,
            actions
        );
        let reply = self.executor.execute(&actions, &msg).await;
        self.outbound.send(msg.channel_id, reply);
    }

    async fn broadcast(&self, what: &str, text: &str) {
        match fanout::broadcast(&self.outbound, text).await {
            Ok(n) => log::info!("dispatcher: {} delivered to {} destination(s)", what, n),
            Err(e) => log::warn!("dispatcher: {} fanout aborted: {}", what, e),
        }
    }
}
