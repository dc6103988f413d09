//! Parsing and formatting of the time labels shown on reservation pages.
//
// Slot buttons render times as "7:30 pm". Everything the selector compares goes through
// `TimeOfDay`, which orders by minutes since midnight.

use chrono::{NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(1[0-2]|[1-9]):([0-5][0-9]) (am|pm)$").unwrap());

/// Errors produced while building a `TimeOfDay`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("Unrecognized time label: '{0}'")]
    Parse(String),
    #[error("Invalid time {hour}:{minute:02}. Hour must be 0-23 and minute 0-59")]
    Range { hour: u32, minute: u32 },
}

/// A time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTime")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

/// Unchecked wire form; deserialized times go through `from_24h`
#[derive(Deserialize)]
struct RawTime {
    hour: u32,
    minute: u32,
}

impl TryFrom<RawTime> for TimeOfDay {
    type Error = TimeError;

    fn try_from(raw: RawTime) -> Result<Self, Self::Error> {
        from_24h(raw.hour, raw.minute)
    }
}

impl TimeOfDay {
    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }

    /// Compact 24-hour form used in reservation URLs, e.g. "1915"
    pub fn to_hhmm(&self) -> String {
        format!("{:02}{:02}", self.hour, self.minute)
    }

    /// Short upper-case form used when listing alternatives: "10 PM", "10:30 PM"
    pub fn to_short_label(&self) -> String {
        to_label(*self).to_uppercase().replace(":00", "")
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_label(*self))
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl From<TimeOfDay> for NaiveTime {
    fn from(t: TimeOfDay) -> Self {
        // hour and minute are range-checked on construction
        NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        TimeOfDay { hour: t.hour() as u8, minute: t.minute() as u8 }
    }
}

/// Parse a label of the form `H:MM am` / `H:MM pm`
pub fn parse(label: &str) -> Result<TimeOfDay, TimeError> {
    let caps = LABEL_RE.captures(label).ok_or_else(|| TimeError::Parse(label.to_string()))?;

    let hour_12: u32 = caps[1].parse().map_err(|_| TimeError::Parse(label.to_string()))?;
    let minute: u32 = caps[2].parse().map_err(|_| TimeError::Parse(label.to_string()))?;
    let hour = match (&caps[3], hour_12) {
        ("am", 12) => 0,
        ("am", h) => h,
        ("pm", 12) => 12,
        (_, h) => h + 12,
    };

    from_24h(hour, minute)
}

/// Render a time the way the reservation pages do
pub fn to_label(t: TimeOfDay) -> String {
    let (hour, meridiem) = match t.hour {
        0 => (12, "am"),
        h @ 1..=11 => (h, "am"),
        12 => (12, "pm"),
        h => (h - 12, "pm"),
    };
    format!("{}:{:02} {}", hour, t.minute, meridiem)
}

/// Absolute distance between two times in minutes
pub fn difference_minutes(a: TimeOfDay, b: TimeOfDay) -> u32 {
    a.minutes_since_midnight().abs_diff(b.minutes_since_midnight())
}

/// Build a `TimeOfDay` from 24-hour components
pub fn from_24h(hour: u32, minute: u32) -> Result<TimeOfDay, TimeError> {
    if hour > 23 || minute > 59 {
        return Err(TimeError::Range { hour, minute });
    }
    Ok(TimeOfDay { hour: hour as u8, minute: minute as u8 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10:30 pm", 22, 30)]
    #[test_case("12:00 am", 0, 0)]
    #[test_case("12:15 pm", 12, 15)]
    #[test_case("1:05 am", 1, 5)]
    #[test_case("11:59 pm", 23, 59)]
    fn test_parse_valid_labels(label: &str, hour: u32, minute: u32) {
        let t = parse(label).unwrap();
        assert_eq!((t.hour(), t.minute()), (hour, minute));
    }

    #[test_case(""; "empty")]
    #[test_case("10:30"; "no meridiem")]
    #[test_case("10:30 PM"; "upper case")]
    #[test_case("09:30 pm"; "leading zero")]
    #[test_case("13:00 pm"; "hour out of range")]
    #[test_case("1:5 pm"; "single digit minute")]
    #[test_case(" 1:05 pm"; "leading space")]
    fn test_parse_rejects(label: &str) {
        assert!(matches!(parse(label), Err(TimeError::Parse(_))));
    }

    #[test]
    fn test_label_round_trip_whole_day() {
        for hour in 0..24 {
            for minute in 0..60 {
                let t = from_24h(hour, minute).unwrap();
                assert_eq!(parse(&to_label(t)).unwrap(), t, "round trip of {}", to_label(t));
            }
        }
    }

    #[test]
    fn test_to_label_noon_and_midnight() {
        assert_eq!(to_label(from_24h(0, 5).unwrap()), "12:05 am");
        assert_eq!(to_label(from_24h(12, 0).unwrap()), "12:00 pm");
        assert_eq!(to_label(from_24h(15, 15).unwrap()), "3:15 pm");
    }

    #[test]
    fn test_difference_minutes() {
        let a = parse("9:00 pm").unwrap();
        let b = parse("10:30 pm").unwrap();
        assert_eq!(difference_minutes(a, b), 90);
        assert_eq!(difference_minutes(b, a), 90);
        assert_eq!(difference_minutes(a, a), 0);
    }

    #[test]
    fn test_from_24h_bounds() {
        assert!(from_24h(23, 59).is_ok());
        assert_eq!(from_24h(24, 0), Err(TimeError::Range { hour: 24, minute: 0 }));
        assert!(from_24h(10, 60).is_err());
    }

    #[test]
    fn test_deserialize_checks_range() {
        let t: TimeOfDay = serde_json::from_str(r#"{"hour":23,"minute":59}"#).unwrap();
        assert_eq!(t, from_24h(23, 59).unwrap());

        let err = serde_json::from_str::<TimeOfDay>(r#"{"hour":24,"minute":0}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid time 24:00"));
        assert!(serde_json::from_str::<TimeOfDay>(r#"{"hour":30,"minute":99}"#).is_err());
    }

    #[test]
    fn test_ordering_and_short_label() {
        assert!(parse("11:00 pm").unwrap() > parse("10:30 pm").unwrap());
        assert!(parse("12:00 am").unwrap() < parse("1:00 am").unwrap());
        assert_eq!(parse("10:00 pm").unwrap().to_short_label(), "10 PM");
        assert_eq!(parse("10:30 pm").unwrap().to_short_label(), "10:30 PM");
        assert_eq!(parse("7:15 pm").unwrap().to_hhmm(), "1915");
    }
}
