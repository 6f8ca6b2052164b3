use thiserror::Error;

use crate::reminder::ReminderId;
use crate::time_parser::ParseError;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("the fire time is not in the future")]
    PastTime,
    #[error("reminder {0} is already scheduled")]
    AlreadyScheduled(ReminderId),
    #[error("reminder {0} is no longer pending")]
    NotPending(ReminderId),
    #[error("reminder {0} does not exist")]
    UnknownReminder(ReminderId),
    #[error("reminder store is unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ScheduleReminderError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}
