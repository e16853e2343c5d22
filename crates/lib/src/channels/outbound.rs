//! Outbound capability and the actor that owns it.
//!
//! The dispatcher, the fanout and detached reminder tasks all talk to the chat platform.
//! They never hold the transport directly: one actor task owns it and serves requests in
//! arrival order, so sends from different tasks are never interleaved on the transport.

use crate::events::{ChannelInfo, GroupInfo};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Errors from the chat platform transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    /// The platform rejected the bot's credentials. Not recoverable by retrying.
    #[error("invalid credentials: {0}")]
    InvalidAuth(String),

    #[error("outbound actor shut down")]
    Shutdown,
}

/// What the bot can do on the chat platform.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Post `text` to a channel, group or direct conversation.
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError>;
    /// Public channels visible to the bot, with membership flags.
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChannelError>;
    /// Private groups the bot belongs to.
    async fn list_groups(&self) -> Result<Vec<GroupInfo>, ChannelError>;
}

enum OutboundRequest {
    Send {
        channel_id: String,
        text: String,
    },
    ListChannels(oneshot::Sender<Result<Vec<ChannelInfo>, ChannelError>>),
    ListGroups(oneshot::Sender<Result<Vec<GroupInfo>, ChannelError>>),
}

/// Cloneable handle to the outbound actor.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::UnboundedSender<OutboundRequest>,
}

impl OutboundHandle {
    /// Queue a message for delivery. Best effort: failures are logged by the actor.
    pub fn send(&self, channel_id: impl Into<String>, text: impl Into<String>) {
        let req = OutboundRequest::Send {
            channel_id: channel_id.into(),
            text: text.into(),
        };
        if self.tx.send(req).is_err() {
            log::warn!("outbound: actor gone, message dropped");
        }
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(OutboundRequest::ListChannels(reply_tx))
            .map_err(|_| ChannelError::Shutdown)?;
        reply_rx.await.map_err(|_| ChannelError::Shutdown)?
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupInfo>, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(OutboundRequest::ListGroups(reply_tx))
            .map_err(|_| ChannelError::Shutdown)?;
        reply_rx.await.map_err(|_| ChannelError::Shutdown)?
    }
}

/// Start the actor owning `transport`. It runs until every handle is dropped.
pub fn spawn_outbound(transport: Arc<dyn Outbound>) -> (OutboundHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_outbound(rx, transport));
    (OutboundHandle { tx }, task)
}

async fn run_outbound(
    mut rx: mpsc::UnboundedReceiver<OutboundRequest>,
    transport: Arc<dyn Outbound>,
) {
    while let Some(req) = rx.recv().await {
        match req {
            OutboundRequest::Send { channel_id, text } => {
                if let Err(e) = transport.send(&channel_id, &text).await {
                    log::warn!("outbound: send to {} failed: {}", channel_id, e);
                }
            }
            OutboundRequest::ListChannels(reply) => {
                let _ = reply.send(transport.list_channels().await);
            }
            OutboundRequest::ListGroups(reply) => {
                let _ = reply.send(transport.list_groups().await);
            }
        }
    }
    log::debug!("outbound: all handles dropped, actor stopped");
}
