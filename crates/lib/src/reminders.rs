//! Reminders: parse "remind me to <thing> in <n>" and deliver the reminder later.
//!
//! Each scheduled reminder is a detached task registered under an id, so pending reminders
//! can be listed and cancelled. Nothing is persisted; aborting the process drops them.

use crate::channels::OutboundHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

pub const REMIND_ME_FORMAT: &str = "`remind me to <thing to do> in <dd> minutes`";

const MINUTE: Duration = Duration::from_secs(60);

/// Why a reminder command could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReminderParseError {
    #[error("no \"to\" before \"in\"")]
    MissingTo,
    #[error("no \"in\" after the description")]
    MissingIn,
    #[error("nothing to remind about")]
    EmptyDescription,
    #[error("no delay after \"in\"")]
    MissingDelay,
    #[error("delay is not a number of minutes")]
    InvalidDelay,
}

/// One pending reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTask {
    pub delay_minutes: u64,
    pub channel_id: String,
    pub sender_id: String,
    /// Words between "to" and "in", joined by single spaces.
    pub description: String,
}

impl ReminderTask {
    /// Parse a (lower-cased) command. The first "to" and the last "in" delimit the description.
    pub fn parse(
        text: &str,
        channel_id: &str,
        sender_id: &str,
    ) -> Result<ReminderTask, ReminderParseError> {
        let terms: Vec<&str> = text.split_whitespace().collect();
        let to_idx = terms
            .iter()
            .position(|t| *t == "to")
            .ok_or(ReminderParseError::MissingTo)?;
        let in_idx = terms
            .iter()
            .rposition(|t| *t == "in")
            .ok_or(ReminderParseError::MissingIn)?;
        if to_idx + 1 >= in_idx {
            return Err(ReminderParseError::EmptyDescription);
        }
        let delay = terms.get(in_idx + 1).ok_or(ReminderParseError::MissingDelay)?;
        let delay_minutes: u64 = delay
            .parse()
            .map_err(|_| ReminderParseError::InvalidDelay)?;
        let description = terms[to_idx + 1..in_idx].join(" ");
        Ok(ReminderTask {
            delay_minutes,
            channel_id: channel_id.to_string(),
            sender_id: sender_id.to_string(),
            description,
        })
    }

    /// Text posted when the reminder fires.
    pub fn delivery_text(&self) -> String {
        format!(
            "@{} remember to {} :robot_face:",
            self.sender_id, self.description
        )
    }

    /// Immediate reply to the requester.
    pub fn ack_text(&self) -> String {
        format!(
            "ok, I'll remind you in {} minutes :robot_face:",
            self.delay_minutes
        )
    }
}

/// Reply for commands that do not parse.
pub fn format_error_text() -> String {
    format!(
        "unable to decode reminder :white_frowning_face:\nplease use the form {}",
        REMIND_ME_FORMAT
    )
}

pub type ReminderId = u64;

/// Registry of pending reminder tasks.
#[derive(Clone)]
pub struct ReminderScheduler {
    outbound: OutboundHandle,
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<HashMap<ReminderId, JoinHandle<()>>>>,
}

impl ReminderScheduler {
    pub fn new(outbound: OutboundHandle) -> Self {
        Self {
            outbound,
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ReminderId, JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the deferred delivery. Returns immediately.
    pub fn schedule(&self, task: ReminderTask) -> ReminderId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let outbound = self.outbound.clone();
        let pending = self.pending.clone();
        let delay = MINUTE.saturating_mul(u32::try_from(task.delay_minutes).unwrap_or(u32::MAX));
        log::debug!(
            "reminder {}: {:?} for {} in {} minutes",
            id,
            task.description,
            task.sender_id,
            task.delay_minutes
        );
        // Hold the lock across spawn so the task cannot remove its entry before it is inserted.
        let mut guard = self.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            outbound.send(task.channel_id.clone(), task.delivery_text());
            log::debug!("reminder {} delivered to {}", id, task.channel_id);
            pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
        });
        guard.insert(id, handle);
        id
    }

    /// Ids of reminders that have not fired yet.
    pub fn pending(&self) -> Vec<ReminderId> {
        let mut ids: Vec<ReminderId> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel one reminder. Returns false if it already fired or never existed.
    pub fn cancel(&self, id: ReminderId) -> bool {
        match self.lock().remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drop every pending reminder. Returns how many were dropped.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<JoinHandle<()>> = self.lock().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.abort();
        }
        if !drained.is_empty() {
            log::info!("dropped {} pending reminder(s) on shutdown", drained.len());
        }
        drained.len()
    }
}
