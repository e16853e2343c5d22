//! Broadcast fanout: render push/relay/alert events and post them everywhere the bot is.

use crate::channels::{ChannelError, OutboundHandle};
use crate::events::{MonitoringAlert, PushEvent, RelayMessage};

/// Push summary: newest commit's author, ref, commit messages oldest first, compare link.
pub fn render_push(push: &PushEvent) -> String {
    let username = push
        .commits
        .last()
        .map(|c| c.author.username.as_str())
        .unwrap_or("");
    let messages = push
        .commits
        .iter()
        .map(|c| c.message.trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "push on GitHub by `{}` on `{}`\n```{}```\ncompare: {}",
        username, push.git_ref, messages, push.compare
    )
}

pub fn render_relay(relay: &RelayMessage) -> String {
    relay.message.clone()
}

pub fn render_alert(alert: &MonitoringAlert) -> String {
    let body = if alert.short_description.is_empty() {
        alert.message.clone()
    } else if alert.message.is_empty() {
        alert.short_description.clone()
    } else {
        format!("{}\n{}", alert.short_description, alert.message)
    };
    format!(
        "monitoring alert `{}` at {}\n```{}```",
        alert.severity,
        alert.created_at.to_rfc3339(),
        body
    )
}

/// Deliver `text` to every member channel and every group. Returns the number of deliveries.
/// A listing failure aborts before anything is sent.
pub async fn broadcast(outbound: &OutboundHandle, text: &str) -> Result<usize, ChannelError> {
    let channels = outbound.list_channels().await?;
    let groups = outbound.list_groups().await?;
    let mut delivered = 0;
    for channel in channels.iter().filter(|c| c.is_member) {
        log::trace!("fanout: channel {}", channel.id);
        outbound.send(channel.id.clone(), text);
        delivered += 1;
    }
    for group in &groups {
        log::trace!("fanout: group {}", group.id);
        outbound.send(group.id.clone(), text);
        delivered += 1;
    }
    Ok(delivered)
}
