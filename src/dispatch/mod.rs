mod delivery;

use std::{sync::Arc, time::Duration};

use tokio::time;

use crate::appsettings::DispatchSettings;
use crate::reminder::{Reminder, ReminderStatus};

pub use delivery::{DeliveryOutcome, LogDeliveryChannel, ReminderDeliveryChannel, message_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one.
    pub max_attempts: u32,
    pub backoff: Duration,
    pub notify_timeout: Duration,
}

impl From<&DispatchSettings> for RetryPolicy {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.retry_backoff(),
            notify_timeout: settings.notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
}

impl DispatchReport {
    /// Status the reminder ends up in. Transient failures that survive every
    /// retry count as failed.
    pub fn terminal_status(&self) -> ReminderStatus {
        match self.outcome {
            DeliveryOutcome::Delivered => ReminderStatus::Fired,
            DeliveryOutcome::Undeliverable | DeliveryOutcome::TransientFailure => {
                ReminderStatus::Failed
            }
        }
    }
}

pub struct DispatchExecutor {
    delivery_channel: Arc<dyn ReminderDeliveryChannel>,
    policy: RetryPolicy,
}

impl DispatchExecutor {
    pub fn new(delivery_channel: Arc<dyn ReminderDeliveryChannel>, policy: RetryPolicy) -> Self {
        Self {
            delivery_channel,
            policy,
        }
    }

    pub async fn dispatch(&self, reminder: &Reminder) -> DispatchReport {
        let id = reminder.id;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let outcome = self.notify_once(reminder).await;

            match outcome {
                DeliveryOutcome::TransientFailure if attempts < max_attempts => {
                    log::warn!(
                        "[DISPATCH] Transient failure, retrying in {:?}. [reminder_id = {}, attempt = {}/{}]",
                        self.policy.backoff,
                        id,
                        attempts,
                        max_attempts
                    );
                    time::sleep(self.policy.backoff).await;
                }
                DeliveryOutcome::TransientFailure => {
                    log::error!(
                        "[DISPATCH] Giving up after {} attempts. [reminder_id = {}]",
                        attempts,
                        id
                    );
                    return DispatchReport { outcome, attempts };
                }
                DeliveryOutcome::Undeliverable => {
                    log::error!(
                        "[DISPATCH] Recipient unreachable. [reminder_id = {}, recipient = {}]",
                        id,
                        reminder.recipient
                    );
                    return DispatchReport { outcome, attempts };
                }
                DeliveryOutcome::Delivered => {
                    log::info!("[DISPATCH] Delivered. [reminder_id = {}, attempt = {}]", id, attempts);
                    return DispatchReport { outcome, attempts };
                }
            }
        }
    }

    async fn notify_once(&self, reminder: &Reminder) -> DeliveryOutcome {
        let send = self
            .delivery_channel
            .send_reminder_notification(reminder.recipient, reminder);

        match time::timeout(self.policy.notify_timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log::warn!(
                    "[DISPATCH] Notification timed out after {:?}. [reminder_id = {}]",
                    self.policy.notify_timeout,
                    reminder.id
                );
                DeliveryOutcome::TransientFailure
            }
        }
    }
}

#[cfg(test)]
mod tests;
