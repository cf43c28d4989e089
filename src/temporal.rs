//! Clock-field parsing and hour arithmetic.
//!
//! Flight files carry the calendar date and the clock readings in separate
//! columns (`FlightDate`, `CRSDepTime` = `"1305"`). The clock string is turned
//! into an offset from midnight and added to the date; hour keys used by the
//! join are always floored, never rounded to nearest.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_INPUT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub offset: ChronoDuration,
    pub defaulted: bool,
}

// "2400" reads as 23:59 and "0" as 00:01; short readings are left-padded.
pub fn parse_time_of_day(raw: &str) -> TimeOfDay {
    match clock_digits(raw).and_then(|digits| clock_offset(&digits)) {
        Some(offset) => TimeOfDay {
            offset,
            defaulted: false,
        },
        None => TimeOfDay {
            offset: ChronoDuration::zero(),
            defaulted: true,
        },
    }
}

fn clock_digits(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let whole = match trimmed.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            let value = trimmed.parse::<f64>().ok()?;
            if !value.is_finite() {
                return None;
            }
            value.trunc() as i64
        }
    };

    let digits = match whole {
        2400 => "2359".to_string(),
        0 => "0001".to_string(),
        _ => whole.to_string(),
    };
    Some(digits)
}

fn clock_offset(digits: &str) -> Option<ChronoDuration> {
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let padded = format!("{digits:0>4}");
    let hours: i64 = padded[..2].parse().ok()?;
    let minutes: i64 = padded[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    Some(ChronoDuration::hours(hours) + ChronoDuration::minutes(minutes))
}

pub fn combine(date: NaiveDate, offset: ChronoDuration) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN) + offset
}

pub fn round_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(ts)
}

pub fn shift_back(ts: NaiveDateTime, hours: i64) -> NaiveDateTime {
    ts - ChronoDuration::hours(hours)
}

pub fn shift_forward(ts: NaiveDateTime, hours: i64) -> NaiveDateTime {
    ts + ChronoDuration::hours(hours)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    TIMESTAMP_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}
