//! Action executor: turns classified actions into one reply text.

use crate::events::HumanMessage;
use crate::matcher::{Action, GREETINGS};
use crate::reminders::{self, ReminderScheduler, ReminderTask, REMIND_ME_FORMAT};
use crate::security::{SecurityStatus, STATUS_PAGE_URL};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;

pub const INTERNET_ON_FIRE_FORMAT: &str = "`is internet on fire`";

/// Reply when the security feed cannot be fetched or decoded.
pub fn security_error_text() -> String {
    format!(
        "unable to get security info\n{}",
        STATUS_PAGE_URL.trim_end_matches('/')
    )
}

/// Reply when no action matched.
pub fn help_text(sender_id: &str) -> String {
    format!(
        "I'm not that smart @{} :white_frowning_face:, you can ask me:\n{}\n{}",
        sender_id, INTERNET_ON_FIRE_FORMAT, REMIND_ME_FORMAT
    )
}

pub struct Executor {
    security: Arc<dyn SecurityStatus>,
    reminders: ReminderScheduler,
    rng: StdRng,
}

impl Executor {
    pub fn new(
        security: Arc<dyn SecurityStatus>,
        reminders: ReminderScheduler,
        rng: StdRng,
    ) -> Self {
        Self {
            security,
            reminders,
            rng,
        }
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    /// Render the reply for `msg`. `msg.text` is expected to be lower-cased already.
    pub async fn execute(&mut self, actions: &[Action], msg: &HumanMessage) -> String {
        if actions.is_empty() {
            return help_text(&msg.sender_id);
        }
        let mut text = String::new();
        for action in actions {
            let fragment = match action {
                Action::Greet => self.greet(&msg.sender_id),
                Action::SecurityCheck => self.security_check().await,
                Action::ScheduleReminder => self.schedule_reminder(msg),
            };
            text.push_str(&fragment);
            text.push('\n');
        }
        text.trim_matches('\n').to_string()
    }

    fn greet(&mut self, sender_id: &str) -> String {
        let greeting = GREETINGS.choose(&mut self.rng).copied().unwrap_or("hi");
        format!("{} @{} :smile:", greeting, sender_id)
    }

    async fn security_check(&self) -> String {
        match self.security.fetch().await {
            Ok(report) => report.render(),
            Err(e) => {
                log::warn!("security status unavailable: {}", e);
                security_error_text()
            }
        }
    }

    fn schedule_reminder(&self, msg: &HumanMessage) -> String {
        match ReminderTask::parse(&msg.text, &msg.channel_id, &msg.sender_id) {
            Ok(task) => {
                let ack = task.ack_text();
                self.reminders.schedule(task);
                ack
            }
            Err(e) => {
                log::debug!("reminder from {} not understood: {}", msg.sender_id, e);
                reminders::format_error_text()
            }
        }
    }
}

/// Canned security sources used by tests.
#[cfg(test)]
pub(crate) mod testing {
    use crate::security::{SecurityError, SecurityReport, SecurityStatus};
    use async_trait::async_trait;

    pub(crate) struct FixedSecurity {
        pub report: Option<SecurityReport>,
    }

    impl FixedSecurity {
        pub(crate) fn ok(json: &str) -> Self {
            Self {
                report: Some(serde_json::from_str(json).unwrap()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self { report: None }
        }
    }

    #[async_trait]
    impl SecurityStatus for FixedSecurity {
        async fn fetch(&self) -> Result<SecurityReport, SecurityError> {
            match &self.report {
                Some(r) => Ok(r.clone()),
                None => Err(SecurityError::Decode(
                    serde_json::from_str::<SecurityReport>("{}").unwrap_err(),
                )),
            }
        }
    }
}
