//! Monitoring API poller: periodically fetches application health into the status aggregator.

use crate::status::{AppReport, StatusAggregator};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const NEW_RELIC_APP_URL: &str = "https://api.newrelic.com/v2/applications";
pub const POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Deserialize)]
struct AppEnvelope {
    application: AppData,
}

#[derive(Debug, Deserialize)]
struct AppData {
    last_reported_at: DateTime<Utc>,
    health_status: String,
    #[serde(default)]
    application_summary: AppSummary,
}

#[derive(Debug, Default, Deserialize)]
struct AppSummary {
    #[serde(default)]
    apdex_score: f64,
}

fn parse_report(body: &[u8]) -> Result<AppReport> {
    let envelope: AppEnvelope = serde_json::from_slice(body).context("decoding application data")?;
    let app = envelope.application;
    Ok(AppReport {
        health: app.health_status,
        apdex: app.application_summary.apdex_score,
        last_reported: app.last_reported_at,
    })
}

pub struct MonitorPoller {
    client: reqwest::Client,
    api_key: String,
    url: String,
    status: Arc<StatusAggregator>,
}

impl MonitorPoller {
    pub fn new(api_key: String, app_id: &str, status: Arc<StatusAggregator>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            url: format!("{}/{}.json", NEW_RELIC_APP_URL, app_id),
            status,
        }
    }

    async fn fetch(&self) -> Result<AppReport> {
        let res = self
            .client
            .get(&self.url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .context("requesting application data")?;
        if !res.status().is_success() {
            anyhow::bail!("bad status from monitoring API: {}", res.status());
        }
        let body = res.bytes().await.context("reading application data")?;
        parse_report(&body)
    }

    /// Poll forever in a background task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                log::debug!("monitor: polling {}", self.url);
                match self.fetch().await {
                    Ok(report) => self.status.update_report(&report),
                    Err(e) => log::warn!("monitor: {:#}", e),
                }
            }
        })
    }
}
