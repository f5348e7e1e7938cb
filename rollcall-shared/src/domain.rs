use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Learner reference number, the identifier printed on a student's QR card.
/// Surrounding whitespace is dropped on the way in, so a roster entry always
/// matches the trimmed payload of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Lrn(pub String);

impl Lrn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Lrn {
    fn from(value: &str) -> Self {
        Lrn(value.trim().to_string())
    }
}

impl From<String> for Lrn {
    fn from(value: String) -> Self {
        if value.trim().len() == value.len() {
            Lrn(value)
        } else {
            Lrn(value.trim().to_string())
        }
    }
}

impl From<Lrn> for String {
    fn from(value: Lrn) -> Self {
        value.0
    }
}

impl FromStr for Lrn {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Lrn(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeacherHandle(pub String);

impl TeacherHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeacherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TeacherHandle {
    fn from(value: &str) -> Self {
        TeacherHandle(value.to_string())
    }
}

// Philippine mobile numbers carrying the 63 country code; the leading plus is optional.
static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?63?[0-9]{10}$").expect("phone pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a valid Philippine phone number: {0:?}")]
pub struct PhoneNumberError(pub String);

/// A contact number that passed regional validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(value: &str) -> Result<Self, PhoneNumberError> {
        let trimmed = value.trim();
        if PHONE_PATTERN.is_match(trimmed) {
            Ok(PhoneNumber(trimmed.to_string()))
        } else {
            Err(PhoneNumberError(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PhoneNumber {
    type Err = PhoneNumberError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhoneNumber::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneNumberError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

/// Stored day number: 1 = Monday ... 7 = Sunday.
pub fn day_number(day: Weekday) -> i32 {
    day.number_from_monday() as i32
}

pub fn weekday_from_number(n: i32) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Closed-interval intersection: sessions that merely touch still conflict.
pub fn intervals_intersect(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// Long date used in outgoing messages, e.g. "September 18, 2023".
pub fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn short_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentEntry {
    pub lrn: Lrn,
    pub first_name: String,
    pub last_name: String,
    pub guardian_phone: PhoneNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherEntry {
    pub handle: TeacherHandle,
    pub first_name: String,
    pub last_name: String,
    pub phone: PhoneNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub subject: String,
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub teacher: TeacherHandle,
}

impl SessionEntry {
    pub fn conflicts_with(&self, other: &SessionEntry) -> bool {
        self.day == other.day && intervals_intersect(self.start, self.end, other.start, other.end)
    }
}

impl fmt::Display for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {} - {})",
            self.subject,
            day_name(self.day),
            short_time(self.start),
            short_time(self.end)
        )
    }
}
