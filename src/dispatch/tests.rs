use std::time::Duration;

use crate::test_utils::{TestDeliveryChannel, reminder_for, utc};

use super::*;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_secs(10),
        notify_timeout: Duration::from_secs(5),
    }
}

fn executor(channel: &TestDeliveryChannel, max_attempts: u32) -> DispatchExecutor {
    DispatchExecutor::new(Arc::new(channel.clone()), policy(max_attempts))
}

#[tokio::test(start_paused = true)]
pub async fn delivered_on_first_try() {
    let channel = TestDeliveryChannel::new();
    let reminder = reminder_for("task-1", utc(2025, 7, 6, 10, 0));

    let report = executor(&channel, 3).dispatch(&reminder).await;

    assert_eq!(report, DispatchReport { outcome: DeliveryOutcome::Delivered, attempts: 1 });
    assert_eq!(report.terminal_status(), ReminderStatus::Fired);
    assert_eq!(*channel.received.lock().unwrap(), vec![(reminder.id, 42)]);
}

#[tokio::test(start_paused = true)]
pub async fn undeliverable_is_not_retried() {
    let channel = TestDeliveryChannel::answering([DeliveryOutcome::Undeliverable]);
    let reminder = reminder_for("task-1", utc(2025, 7, 6, 10, 0));

    let report = executor(&channel, 3).dispatch(&reminder).await;

    assert_eq!(report.attempts, 1);
    assert_eq!(report.terminal_status(), ReminderStatus::Failed);
    assert_eq!(channel.received_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
pub async fn transient_failures_are_retried_with_backoff() {
    let channel = TestDeliveryChannel::answering([
        DeliveryOutcome::TransientFailure,
        DeliveryOutcome::TransientFailure,
    ]);
    let reminder = reminder_for("task-1", utc(2025, 7, 6, 10, 0));
    let started = tokio::time::Instant::now();

    let report = executor(&channel, 3).dispatch(&reminder).await;

    assert_eq!(report, DispatchReport { outcome: DeliveryOutcome::Delivered, attempts: 3 });
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
pub async fn retries_stop_at_max_attempts() {
    let channel = TestDeliveryChannel::answering([DeliveryOutcome::TransientFailure; 5]);
    let reminder = reminder_for("task-1", utc(2025, 7, 6, 10, 0));

    let report = executor(&channel, 2).dispatch(&reminder).await;

    assert_eq!(report.outcome, DeliveryOutcome::TransientFailure);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.terminal_status(), ReminderStatus::Failed);
    assert_eq!(channel.received_ids().len(), 2);
}

#[tokio::test(start_paused = true)]
pub async fn slow_channel_counts_as_transient() {
    let channel = TestDeliveryChannel::new().with_latency(Duration::from_secs(60));
    let reminder = reminder_for("task-1", utc(2025, 7, 6, 10, 0));

    let report = executor(&channel, 2).dispatch(&reminder).await;

    assert_eq!(report.outcome, DeliveryOutcome::TransientFailure);
    assert_eq!(report.attempts, 2);
}

#[test]
pub fn zero_attempts_in_settings_still_tries_once() {
    let settings = crate::appsettings::DispatchSettings {
        max_attempts: 0,
        ..Default::default()
    };

    assert_eq!(RetryPolicy::from(&settings).max_attempts, 1);
}
