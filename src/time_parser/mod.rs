//! Free-text time expressions to absolute instants.
//!
//! Three families are tried in order and the first one that recognizes the
//! input decides the outcome:
//!
//! 1. relative offsets: `in 2 hours`, `in 30 minutes`, `in 1 week`
//! 2. named days: `today`, `tomorrow at 3pm`, `next monday at 10:30 am`, `next week`
//! 3. absolute dates: `2025-07-06 10:00 AM`, `'2025-07-06' '10:00AM'`, `2025-07-06 14:30`
//!
//! Everything is computed against an explicit reference instant; nothing here
//! reads the clock.

pub mod format;

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use regex::Regex;
use thiserror::Error;

pub use format::{format_fire_at, format_relative};

const DEFAULT_HOUR: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("the offset must be a positive whole number")]
    InvalidOffset,
    #[error("hours 1-12 need an am/pm suffix")]
    AmbiguousHour,
    #[error("unrecognized time format")]
    UnrecognizedFormat,
    #[error("the time is not in the future")]
    PastTime,
}

pub type ParsedTime = Result<DateTime<Utc>, ParseError>;

static RELATIVE_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^in (\S+) ([a-z]+)$").expect("valid regex"));

static NAMED_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(today|tomorrow|next ([a-z]+))(?: (?:at )?(.+))?$").expect("valid regex")
});

static ABSOLUTE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?: (?:at )?(.+))?$").expect("valid regex")
});

static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))? ?(am|pm)?$").expect("valid regex"));

/// Resolves `text` against `reference`. The result is always strictly after
/// `reference`, anything else is [`ParseError::PastTime`].
pub fn parse(text: &str, reference: DateTime<Utc>) -> ParsedTime {
    let normalized = normalize(text);

    let resolved = parse_relative_offset(&normalized, reference)
        .or_else(|| parse_named_day(&normalized, reference))
        .or_else(|| parse_absolute(&normalized))
        .unwrap_or(Err(ParseError::UnrecognizedFormat))?;

    if resolved <= reference {
        return Err(ParseError::PastTime);
    }

    Ok(resolved)
}

fn normalize(text: &str) -> String {
    text.replace(['\'', '"'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn parse_relative_offset(text: &str, reference: DateTime<Utc>) -> Option<ParsedTime> {
    let captures = RELATIVE_OFFSET.captures(text)?;
    let unit_minutes: i64 = match &captures[2] {
        "minute" | "minutes" | "min" | "mins" => 1,
        "hour" | "hours" | "hr" | "hrs" => 60,
        "day" | "days" => 60 * 24,
        "week" | "weeks" => 60 * 24 * 7,
        _ => return None,
    };

    let result = captures[1]
        .parse::<i64>()
        .ok()
        .filter(|amount| *amount > 0)
        .and_then(|amount| amount.checked_mul(unit_minutes))
        .and_then(Duration::try_minutes)
        .and_then(|offset| reference.checked_add_signed(offset))
        .ok_or(ParseError::InvalidOffset);

    Some(result)
}

fn parse_named_day(text: &str, reference: DateTime<Utc>) -> Option<ParsedTime> {
    let captures = NAMED_DAY.captures(text)?;
    let today = reference.date_naive();

    let days_ahead = match (&captures[1], captures.get(2).map(|m| m.as_str())) {
        ("today", _) => 0,
        ("tomorrow", _) => 1,
        (_, Some("week")) => 7,
        (_, Some(day)) => days_until_next(today.weekday(), parse_weekday(day)?),
        _ => return None,
    };

    let result = time_or_default(captures.get(3).map(|m| m.as_str())).and_then(|time| {
        today
            .checked_add_days(Days::new(days_ahead))
            .map(|date| date.and_time(time).and_utc())
            .ok_or(ParseError::UnrecognizedFormat)
    });

    Some(result)
}

fn parse_absolute(text: &str) -> Option<ParsedTime> {
    let captures = ABSOLUTE_DATE.captures(text)?;

    let date = captures[1].parse::<i32>().ok().and_then(|year| {
        let month = captures[2].parse::<u32>().ok()?;
        let day = captures[3].parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });

    let result = date.ok_or(ParseError::UnrecognizedFormat).and_then(|date| {
        let time = time_or_default(captures.get(4).map(|m| m.as_str()))?;
        Ok(NaiveDateTime::new(date, time).and_utc())
    });

    Some(result)
}

fn time_or_default(text: Option<&str>) -> Result<NaiveTime, ParseError> {
    match text {
        Some(text) => parse_time_of_day(text),
        None => Ok(NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).expect("Default time is valid.")),
    }
}

/// `H`, `H:MM`, with an optional `am`/`pm` suffix. Without a suffix only
/// unambiguous 24-hour values are accepted: 0 and 13-23.
pub(crate) fn parse_time_of_day(text: &str) -> Result<NaiveTime, ParseError> {
    let captures = TIME_OF_DAY
        .captures(text)
        .ok_or(ParseError::UnrecognizedFormat)?;

    let hour = captures[1]
        .parse::<u32>()
        .map_err(|_| ParseError::UnrecognizedFormat)?;
    let minute = match captures.get(2) {
        Some(m) => m
            .as_str()
            .parse::<u32>()
            .map_err(|_| ParseError::UnrecognizedFormat)?,
        None => 0,
    };

    if minute > 59 {
        return Err(ParseError::UnrecognizedFormat);
    }

    let hour = match captures.get(3).map(|m| m.as_str()) {
        Some(suffix) => {
            if !(1..=12).contains(&hour) {
                return Err(ParseError::UnrecognizedFormat);
            }
            match (suffix, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None => {
            if hour > 23 {
                return Err(ParseError::UnrecognizedFormat);
            }
            if (1..=12).contains(&hour) {
                return Err(ParseError::AmbiguousHour);
            }
            hour
        }
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(ParseError::UnrecognizedFormat)
}

fn parse_weekday(text: &str) -> Option<Weekday> {
    let weekday = match text {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// Days from `from` to the next `target`, never zero.
fn days_until_next(from: Weekday, target: Weekday) -> u64 {
    let ahead = (7 + target.num_days_from_monday() - from.num_days_from_monday()) % 7;
    if ahead == 0 { 7 } else { ahead as u64 }
}
