use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

pub type ReminderId = Uuid;
pub type TaskId = String;
pub type RecipientId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReminderStatus {
    Pending,
    Fired,
    Failed,
    Cancelled,
}

impl ReminderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "Pending",
            ReminderStatus::Fired => "Fired",
            ReminderStatus::Failed => "Failed",
            ReminderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ReminderStatus::Pending),
            "Fired" => Ok(ReminderStatus::Fired),
            "Failed" => Ok(ReminderStatus::Failed),
            "Cancelled" => Ok(ReminderStatus::Cancelled),
            other => anyhow::bail!("Unknown reminder status {other}"),
        }
    }
}

/// Absolute UTC instant a reminder fires at, truncated to whole seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderFireTime(DateTime<Utc>);

impl ReminderFireTime {
    pub fn new(inner: DateTime<Utc>) -> Self {
        Self(inner.trunc_subsecs(0))
    }

    pub fn instant(&self) -> &DateTime<Utc> {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub id: ReminderId,
    pub task_id: TaskId,
    pub recipient: RecipientId,
    pub fire_at: ReminderFireTime,
    pub text: String,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new_pending(
        task_id: TaskId,
        recipient: RecipientId,
        fire_at: ReminderFireTime,
        text: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            recipient,
            fire_at,
            text,
            status: ReminderStatus::Pending,
            created_at: created_at.trunc_subsecs(0),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReminderStatus::Pending
    }
}
