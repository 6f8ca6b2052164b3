pub mod appsettings;
pub mod clock;
pub mod dispatch;
pub mod reminder;
pub mod scheduling;
pub mod storage;
pub mod time_parser;

#[cfg(test)]
mod test_utils;
