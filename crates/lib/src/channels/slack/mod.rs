//! Slack connector: Web API client (outbound + listings) and the realtime event stream.

mod api;
mod rtm;

pub use api::{slack_api_base, RtmSession, SlackApi};
pub use rtm::RtmConnection;
