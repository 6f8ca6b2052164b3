mod error;
mod manager;
mod scheduler;

pub use error::{ScheduleReminderError, SchedulingError};
pub use manager::{ReconcileReport, ReminderScheduler};
