use chrono::{DateTime, Utc};

/// `2025-07-06 10:00 AM`
pub fn format_fire_at(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %I:%M %p").to_string()
}

/// Coarse distance from `now` to `instant`, using the largest whole unit.
pub fn format_relative(instant: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let diff = *instant - *now;
    if diff < chrono::Duration::zero() {
        return "past due".to_owned();
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;

    if days > 0 {
        plural("day", days)
    } else if hours > 0 {
        plural("hour", hours)
    } else if minutes > 0 {
        plural("minute", minutes)
    } else {
        "now".to_owned()
    }
}

fn plural(unit: &str, amount: i64) -> String {
    format!("in {} {}{}", amount, unit, if amount == 1 { "" } else { "s" })
}
