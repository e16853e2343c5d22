//! Chat platform plumbing.
//!
//! The outbound actor serializes every call to the platform; the Slack connector provides
//! the transport and feeds realtime events into the inbound queue.

mod outbound;
pub mod slack;

pub use outbound::{spawn_outbound, ChannelError, Outbound, OutboundHandle};

#[cfg(test)]
pub(crate) use outbound::testing;
