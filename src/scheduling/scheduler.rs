use std::time::Duration;

use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::reminder::ReminderFireTime;

/// Timer task armed for a single reminder.
pub(super) struct ScheduledJob {
    pub generation: u64,
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ScheduledJob {
    pub fn new(
        generation: u64,
        task_handle: JoinHandle<()>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            generation,
            task_handle,
            cancellation_token,
        }
    }

    /// Stops the timer without waiting for the task to wind down.
    pub fn disarm(&self) {
        self.cancellation_token.cancel();
    }

    pub async fn cancel(self, timeout: Duration) {
        self.cancellation_token.cancel();
        let cancel_with_timeout = time::timeout(timeout, self.task_handle);
        let _ = cancel_with_timeout.await;
    }
}

pub(super) enum JobSlot {
    Armed(ScheduledJob),
    /// The timer went off and delivery is in progress.
    Dispatching,
}

/// Sleeps for `delay` unless cancelled first. Returns whether the timer
/// elapsed.
pub(super) async fn wait_for_fire_time(
    cancellation_token: CancellationToken,
    delay: Duration,
) -> bool {
    tokio::select! {
        _ = cancellation_token.cancelled() => false,
        _ = time::sleep(delay) => true,
    }
}

pub(super) fn delay_until(fire_at: &ReminderFireTime, now: chrono::DateTime<chrono::Utc>) -> Duration {
    (*fire_at.instant() - now).to_std().unwrap_or(Duration::ZERO)
}
