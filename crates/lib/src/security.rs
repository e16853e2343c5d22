//! Internet security status: fetches the public "is the internet on fire" feed.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STATUS_URL: &str = "https://istheinternetonfire.com/status.json";
pub const STATUS_PAGE_URL: &str = "https://istheinternetonfire.com/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed status document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub txt: String,
}

/// The status document. Every field is required; anything else is a decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityReport {
    pub status: String,
    pub date: String,
    pub issues: Vec<Issue>,
}

impl SecurityReport {
    /// Chat rendering: issue texts, status and date, then the status page link.
    pub fn render(&self) -> String {
        let answers: String = self
            .issues
            .iter()
            .map(|i| format!("{},", i.txt))
            .collect();
        format!(
            "{} {} ({})\n{}",
            answers, self.status, self.date, STATUS_PAGE_URL
        )
    }
}

/// Source of the current security status.
#[async_trait]
pub trait SecurityStatus: Send + Sync {
    async fn fetch(&self) -> Result<SecurityReport, SecurityError>;
}

/// HTTP implementation. The client carries the timeout, so callers never wait unbounded.
pub struct HttpSecurityStatus {
    client: reqwest::Client,
    url: String,
}

impl HttpSecurityStatus {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SecurityError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SecurityStatus for HttpSecurityStatus {
    async fn fetch(&self) -> Result<SecurityReport, SecurityError> {
        let res = self.client.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(SecurityError::Status(res.status()));
        }
        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::{http::StatusCode, routing::get, Router};

    /// Serve `/status.json` answering with `code` and `body`; returns the feed URL.
    pub(crate) async fn serve_feed(code: StatusCode, body: &'static str) -> String {
        let app = Router::new().route("/status.json", get(move || async move { (code, body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/status.json", addr)
    }

    /// A URL nothing listens on.
    pub(crate) async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/status.json", addr)
    }
}
