//! Beacon core library: relays webhook and monitoring events into a team chat space and
//! answers a few text-triggered commands there.

pub mod channels;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod events;
pub mod executor;
pub mod fanout;
pub mod gateway;
pub mod matcher;
pub mod monitor;
pub mod reminders;
pub mod security;
pub mod status;
