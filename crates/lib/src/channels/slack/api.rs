//! Minimal Slack Web API wrapper: realtime handshake, channel listings and chat.postMessage.

use crate::channels::outbound::{ChannelError, Outbound};
use crate::events::{ChannelInfo, GroupInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const SLACK_API_BASE: &str = "https://slack.com/api";
const LIST_PAGE_LIMIT: &str = "200";

/// Error codes meaning the token itself is bad.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RtmConnectBody {
    url: String,
    #[serde(rename = "self")]
    me: RtmSelf,
}

#[derive(Debug, Deserialize)]
struct RtmSelf {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    is_member: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsBody {
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {}

/// Websocket URL and bot identity returned by `rtm.connect`.
#[derive(Debug, Clone)]
pub struct RtmSession {
    pub url: String,
    pub self_id: String,
}

fn into_result<T>(envelope: Envelope<T>) -> Result<T, ChannelError> {
    if !envelope.ok {
        let err = envelope.error.unwrap_or_else(|| "unknown error".into());
        if AUTH_ERRORS.contains(&err.as_str()) {
            return Err(ChannelError::InvalidAuth(err));
        }
        return Err(ChannelError::Api(err));
    }
    envelope
        .body
        .ok_or_else(|| ChannelError::Api("missing response body".into()))
}

pub struct SlackApi {
    client: Client,
    token: String,
    base: String,
}

impl SlackApi {
    pub fn new(token: String) -> Self {
        Self::with_base(token, slack_api_base())
    }

    /// Point the client at a different API root (tests, proxies).
    pub fn with_base(token: String, base: String) -> Self {
        Self {
            client: Client::new(),
            token,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ChannelError> {
        let res = self
            .client
            .post(format!("{}/{}", self.base, method))
            .bearer_auth(&self.token)
            .form(params)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let envelope: Envelope<T> = res.json().await?;
        into_result(envelope)
    }

    /// Open a realtime session.
    pub async fn rtm_connect(&self) -> Result<RtmSession, ChannelError> {
        let body: RtmConnectBody = self.call("rtm.connect", &[]).await?;
        Ok(RtmSession {
            url: body.url,
            self_id: body.me.id,
        })
    }

    /// Page through `conversations.list` for the given conversation types.
    async fn conversations(&self, types: &str) -> Result<Vec<Conversation>, ChannelError> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![
                ("types", types),
                ("exclude_archived", "true"),
                ("limit", LIST_PAGE_LIMIT),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.as_str()));
            }
            let page: ConversationsBody = self.call("conversations.list", &params).await?;
            out.extend(page.channels);
            let next = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if next.is_empty() {
                break;
            }
            cursor = next;
        }
        Ok(out)
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError> {
        let _: PostMessageBody = self
            .call("chat.postMessage", &[("channel", channel), ("text", text)])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Outbound for SlackApi {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        self.post_message(channel_id, text).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChannelError> {
        Ok(self
            .conversations("public_channel")
            .await?
            .into_iter()
            .map(|c| ChannelInfo {
                id: c.id,
                is_member: c.is_member,
            })
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>, ChannelError> {
        Ok(self
            .conversations("private_channel")
            .await?
            .into_iter()
            .map(|c| GroupInfo { id: c.id })
            .collect())
    }
}

/// Resolve the Slack API base URL; `SLACK_API_BASE` overrides the public endpoint.
pub fn slack_api_base() -> String {
    std::env::var("SLACK_API_BASE").unwrap_or_else(|_| SLACK_API_BASE.to_string())
}
