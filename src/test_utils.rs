use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::dispatch::{DeliveryOutcome, ReminderDeliveryChannel};
use crate::reminder::{RecipientId, Reminder, ReminderFireTime, ReminderId};

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn reminder_for(task_id: &str, fire_at: DateTime<Utc>) -> Reminder {
    Reminder::new_pending(
        task_id.to_owned(),
        42,
        ReminderFireTime::new(fire_at),
        "Reminder Text".to_owned(),
        fire_at - chrono::Duration::days(1),
    )
}

/// Wall clock that starts at a fixed instant and advances with tokio's
/// (pausable) clock.
pub struct TestClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TestClock {
    pub fn starting_at(base: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            base,
            started: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}

pub type ReceivedNotifications = Arc<Mutex<Vec<(ReminderId, RecipientId)>>>;

/// Records every send and answers with scripted outcomes, then `Delivered`.
#[derive(Clone, Default)]
pub struct TestDeliveryChannel {
    pub received: ReceivedNotifications,
    script: Arc<Mutex<VecDeque<DeliveryOutcome>>>,
    latency: Duration,
}

impl TestDeliveryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
        let channel = Self::default();
        channel.script.lock().unwrap().extend(outcomes);
        channel
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn received_ids(&self) -> Vec<ReminderId> {
        self.received.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl ReminderDeliveryChannel for TestDeliveryChannel {
    async fn send_reminder_notification(
        &self,
        recipient: RecipientId,
        reminder: &Reminder,
    ) -> DeliveryOutcome {
        self.received.lock().unwrap().push((reminder.id, recipient));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}
