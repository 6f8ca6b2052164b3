use crate::reminder::{RecipientId, ReminderStatus, TaskId};

pub struct NewReminder {
    pub task_id: TaskId,
    pub recipient: RecipientId,
    pub text: String,
}

/// Outcome of a conditional write. Writes only apply to Pending reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    Unchanged(ReminderStatus),
}

impl StatusChange {
    pub fn applied(&self) -> bool {
        matches!(self, StatusChange::Applied)
    }
}
