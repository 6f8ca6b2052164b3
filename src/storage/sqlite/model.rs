use chrono::{DateTime, SecondsFormat, Utc};

use crate::reminder::{Reminder, ReminderFireTime};

#[derive(sqlx::FromRow)]
pub struct ReminderStorageModel {
    pub id: String,
    pub task_id: String,
    pub recipient: i64,
    pub fire_at: String,
    pub text: String,
    pub status: String,
    pub created_at: String,
}

impl From<&Reminder> for ReminderStorageModel {
    fn from(value: &Reminder) -> Self {
        Self {
            id: value.id.to_string(),
            task_id: value.task_id.clone(),
            // Stored bit-for-bit; SQLite integers are signed.
            recipient: value.recipient as i64,
            fire_at: format_timestamp(value.fire_at.instant()),
            text: value.text.clone(),
            status: value.status.as_str().to_owned(),
            created_at: format_timestamp(&value.created_at),
        }
    }
}

impl TryFrom<ReminderStorageModel> for Reminder {
    type Error = anyhow::Error;

    fn try_from(value: ReminderStorageModel) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.parse()?,
            task_id: value.task_id,
            recipient: value.recipient as u64,
            fire_at: ReminderFireTime::new(parse_timestamp(&value.fire_at)?),
            text: value.text,
            status: value.status.parse()?,
            created_at: parse_timestamp(&value.created_at)?,
        })
    }
}

/// RFC 3339 in UTC with a `Z` suffix, so text order matches time order.
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(text: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}
