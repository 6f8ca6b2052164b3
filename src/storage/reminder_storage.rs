use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::reminder::{Reminder, ReminderFireTime, ReminderId, ReminderStatus};

use super::model::StatusChange;

#[async_trait]
pub trait ReminderStorage: Send + Sync {
    /// Inserts the reminder, replacing any stored record with the same id.
    async fn save(&self, reminder: Reminder) -> anyhow::Result<Reminder>;
    /// Moves a Pending reminder to `status`. Non-Pending records are left as is.
    async fn mark_status(&self, id: ReminderId, status: ReminderStatus) -> anyhow::Result<StatusChange>;
    async fn update_fire_at(&self, id: ReminderId, fire_at: ReminderFireTime) -> anyhow::Result<StatusChange>;
    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>>;
    /// Every Pending reminder. Records that can't be read are logged and skipped.
    async fn load_all_pending(&self) -> anyhow::Result<Vec<Reminder>>;
    async fn pending_for_task(&self, task_id: &str) -> anyhow::Result<Vec<Reminder>>;
    async fn delete_by_task(&self, task_id: &str) -> anyhow::Result<usize>;
}

pub struct InMemoryReminderStorage {
    store: RwLock<HashMap<ReminderId, Reminder>>,
}

impl InMemoryReminderStorage {
    pub fn new() -> Self {
        InMemoryReminderStorage {
            store: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryReminderStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by_fire_at(mut reminders: Vec<Reminder>) -> Vec<Reminder> {
    reminders.sort_by_key(|r| (r.fire_at, r.created_at));
    reminders
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn save(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        let mut store = self.store.write().await;
        store.insert(reminder.id, reminder.clone());
        log::debug!("Saved reminder [reminder_id = {}]", reminder.id);
        Ok(reminder)
    }

    async fn mark_status(&self, id: ReminderId, status: ReminderStatus) -> anyhow::Result<StatusChange> {
        let mut store = self.store.write().await;
        let Some(reminder) = store.get_mut(&id) else {
            anyhow::bail!("Reminder {id} does not exist");
        };

        if reminder.is_pending() {
            reminder.status = status;
            Ok(StatusChange::Applied)
        } else {
            Ok(StatusChange::Unchanged(reminder.status))
        }
    }

    async fn update_fire_at(&self, id: ReminderId, fire_at: ReminderFireTime) -> anyhow::Result<StatusChange> {
        let mut store = self.store.write().await;
        let Some(reminder) = store.get_mut(&id) else {
            anyhow::bail!("Reminder {id} does not exist");
        };

        if reminder.is_pending() {
            reminder.fire_at = fire_at;
            Ok(StatusChange::Applied)
        } else {
            Ok(StatusChange::Unchanged(reminder.status))
        }
    }

    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>> {
        let store = self.store.read().await;
        Ok(store.get(&id).cloned())
    }

    async fn load_all_pending(&self) -> anyhow::Result<Vec<Reminder>> {
        let store = self.store.read().await;
        let pending = store.values().filter(|r| r.is_pending()).cloned().collect();
        Ok(sorted_by_fire_at(pending))
    }

    async fn pending_for_task(&self, task_id: &str) -> anyhow::Result<Vec<Reminder>> {
        let store = self.store.read().await;
        let pending = store
            .values()
            .filter(|r| r.is_pending() && r.task_id == task_id)
            .cloned()
            .collect();
        Ok(sorted_by_fire_at(pending))
    }

    async fn delete_by_task(&self, task_id: &str) -> anyhow::Result<usize> {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, r| r.task_id != task_id);
        Ok(before - store.len())
    }
}
