mod model;
mod reminder_storage;
mod sqlite;

pub use model::{NewReminder, StatusChange};
pub use reminder_storage::{InMemoryReminderStorage, ReminderStorage};
pub use sqlite::SqliteReminderStorage;
