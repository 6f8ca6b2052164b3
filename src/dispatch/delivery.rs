use async_trait::async_trait;
use chrono::Utc;

use crate::reminder::{RecipientId, Reminder};
use crate::time_parser::{format_fire_at, format_relative};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DeliveryOutcome {
    Delivered,
    /// The recipient can't be reached at all. Not retried.
    Undeliverable,
    /// A send error that may go away on its own.
    TransientFailure,
}

#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn send_reminder_notification(
        &self,
        recipient: RecipientId,
        reminder: &Reminder,
    ) -> DeliveryOutcome;
}

/// Writes reminders to the log instead of a chat. Used by the daemon when no
/// other channel is wired in.
pub struct LogDeliveryChannel;

#[async_trait]
impl ReminderDeliveryChannel for LogDeliveryChannel {
    async fn send_reminder_notification(
        &self,
        recipient: RecipientId,
        reminder: &Reminder,
    ) -> DeliveryOutcome {
        let fire_at = reminder.fire_at.instant();
        log::info!(
            "🔔 Reminder for task {} to user {}: {} [due = {}, {}]",
            reminder.task_id,
            recipient,
            message_text(reminder),
            format_fire_at(fire_at),
            format_relative(fire_at, &Utc::now()),
        );
        DeliveryOutcome::Delivered
    }
}

pub fn message_text(reminder: &Reminder) -> &str {
    if reminder.text.trim().is_empty() {
        "(no message)"
    } else {
        &reminder.text
    }
}
