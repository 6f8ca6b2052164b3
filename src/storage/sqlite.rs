mod model;

use std::str::FromStr;

use async_trait::async_trait;
use model::{ReminderStorageModel, format_timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row};

use crate::reminder::{Reminder, ReminderFireTime, ReminderId, ReminderStatus};

use super::{ReminderStorage, StatusChange};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reminders (
    id TEXT PRIMARY KEY NOT NULL,
    task_id TEXT NOT NULL,
    recipient INTEGER NOT NULL,
    fire_at TEXT NOT NULL,
    text TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS reminders_task_id ON reminders (task_id);
CREATE INDEX IF NOT EXISTS reminders_status ON reminders (status);
";

pub struct SqliteReminderStorage {
    pool: SqlitePool,
}

impl SqliteReminderStorage {
    /// Opens (creating if missing) the database at `database_url` and makes
    /// sure the schema exists.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // One long-lived connection: `sqlite::memory:` databases live and die with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn current_status(&self, id: ReminderId) -> anyhow::Result<ReminderStatus> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM reminders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match status {
            Some(status) => status.parse(),
            None => anyhow::bail!("Reminder {id} does not exist"),
        }
    }

    /// Rows are decoded one at a time, so a record with a bad column only
    /// costs that record.
    async fn fetch_pending(&self, task_id: Option<&str>) -> anyhow::Result<Vec<Reminder>> {
        let rows = match task_id {
            Some(task_id) => {
                sqlx::query(
                    "SELECT * FROM reminders WHERE status = 'Pending' AND task_id = ? ORDER BY fire_at, created_at",
                )
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM reminders WHERE status = 'Pending' ORDER BY fire_at, created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let reminders = rows
            .iter()
            .filter_map(|row| match decode_row(row) {
                Ok(reminder) => Some(reminder),
                Err(error) => {
                    let id = row.try_get::<String, _>("id").unwrap_or_default();
                    log::error!("Skipping malformed reminder record. [reminder_id = {id}, error = {error:#}]");
                    None
                }
            })
            .collect();

        Ok(reminders)
    }
}

fn decode_row(row: &SqliteRow) -> anyhow::Result<Reminder> {
    let model = ReminderStorageModel::from_row(row)?;
    Reminder::try_from(model)
}

#[async_trait]
impl ReminderStorage for SqliteReminderStorage {
    async fn save(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        let ReminderStorageModel {
            id,
            task_id,
            recipient,
            fire_at,
            text,
            status,
            created_at,
        } = ReminderStorageModel::from(&reminder);

        sqlx::query(
            "
INSERT INTO reminders (id, task_id, recipient, fire_at, text, status, created_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (id) DO UPDATE SET
    task_id = excluded.task_id,
    recipient = excluded.recipient,
    fire_at = excluded.fire_at,
    text = excluded.text,
    status = excluded.status,
    created_at = excluded.created_at
",
        )
        .bind(id)
        .bind(task_id)
        .bind(recipient)
        .bind(fire_at)
        .bind(text)
        .bind(status)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(reminder)
    }

    async fn mark_status(&self, id: ReminderId, status: ReminderStatus) -> anyhow::Result<StatusChange> {
        let result = sqlx::query("UPDATE reminders SET status = ? WHERE id = ? AND status = 'Pending'")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(StatusChange::Applied);
        }

        Ok(StatusChange::Unchanged(self.current_status(id).await?))
    }

    async fn update_fire_at(&self, id: ReminderId, fire_at: ReminderFireTime) -> anyhow::Result<StatusChange> {
        let result = sqlx::query("UPDATE reminders SET fire_at = ? WHERE id = ? AND status = 'Pending'")
            .bind(format_timestamp(fire_at.instant()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(StatusChange::Applied);
        }

        Ok(StatusChange::Unchanged(self.current_status(id).await?))
    }

    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>> {
        let row = sqlx::query_as::<_, ReminderStorageModel>("SELECT * FROM reminders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Reminder::try_from).transpose()
    }

    async fn load_all_pending(&self) -> anyhow::Result<Vec<Reminder>> {
        self.fetch_pending(None).await
    }

    async fn pending_for_task(&self, task_id: &str) -> anyhow::Result<Vec<Reminder>> {
        self.fetch_pending(Some(task_id)).await
    }

    async fn delete_by_task(&self, task_id: &str) -> anyhow::Result<usize> {
        let result = sqlx::query("DELETE FROM reminders WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }
}
