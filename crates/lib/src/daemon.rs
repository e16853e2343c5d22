//! Process wiring: outbound actor, dispatcher, realtime connector, poller and gateway.

use crate::channels::slack::{RtmConnection, SlackApi};
use crate::channels::spawn_outbound;
use crate::config::{self, Config};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::events::event_queue;
use crate::executor::Executor;
use crate::gateway::{self, GatewayState};
use crate::monitor::MonitorPoller;
use crate::reminders::ReminderScheduler;
use crate::security::HttpSecurityStatus;
use crate::status::StatusAggregator;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Run the bot until SIGINT/SIGTERM or until the dispatcher stops.
/// A fatal connection error (rejected credentials) is returned as an error.
pub async fn run(config: Config) -> Result<()> {
    let status = Arc::new(StatusAggregator::new());
    let (events_tx, events_rx) = event_queue();

    let slack_token = config::resolve_slack_token(&config);
    if slack_token.is_none() {
        log::warn!("no Slack bot token configured; realtime connection disabled, deliveries will fail");
    }
    let api = Arc::new(SlackApi::new(slack_token.clone().unwrap_or_default()));
    let (outbound, outbound_task) = spawn_outbound(api.clone());

    let security = HttpSecurityStatus::new(
        config.security.status_url.clone(),
        Duration::from_secs(config.security.timeout_secs),
    )
    .context("building security status client")?;
    let reminders = ReminderScheduler::new(outbound.clone());
    let executor = Executor::new(Arc::new(security), reminders.clone(), StdRng::from_entropy());
    let mut dispatcher = Dispatcher::new(outbound, executor, status.clone());

    let dispatcher_done = Arc::new(Notify::new());
    let dispatcher_task = {
        let done = dispatcher_done.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.run(events_rx).await;
            done.notify_one();
            outcome
        })
    };

    let rtm_task = slack_token
        .is_some()
        .then(|| RtmConnection::new(api).start(events_tx.clone()));

    let monitor_task = config::resolve_new_relic(&config).map(|(key, app_id)| {
        log::info!("monitoring poller enabled for application {}", app_id);
        MonitorPoller::new(key, &app_id, status.clone()).start()
    });

    let auth_token = config::resolve_auth_token(&config).unwrap_or_else(|| {
        let token = config::generate_auth_token();
        log::warn!("no relay auth token configured; generated one for this run: {}", token);
        token
    });

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    let state = GatewayState {
        events: events_tx,
        status,
        auth_token: auth_token.into(),
        port: config.gateway.port,
    };
    gateway::serve(listener, state, shutdown_signal(dispatcher_done)).await?;

    // Stop the remaining producers so the dispatcher sees its queue close.
    if let Some(t) = rtm_task {
        t.abort();
    }
    if let Some(t) = monitor_task {
        t.abort();
    }
    let outcome = dispatcher_task.await.context("dispatcher task panicked")?;
    reminders.shutdown();
    drop(reminders);
    if let Err(e) = outbound_task.await {
        log::error!("outbound actor task failed: {}", e);
    }

    match outcome {
        DispatchOutcome::Fatal(reason) => anyhow::bail!("realtime connection failed: {}", reason),
        DispatchOutcome::QueueClosed => Ok(()),
    }
}

/// Future that completes when the process should shut down (SIGINT, SIGTERM, or the dispatcher exiting).
async fn shutdown_signal(dispatcher_done: Arc<Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("shutdown signal received"),
        _ = terminate => log::info!("shutdown signal received"),
        _ = dispatcher_done.notified() => log::info!("dispatcher exited, shutting down gateway"),
    }
}
