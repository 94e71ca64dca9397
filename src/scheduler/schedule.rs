use std::fmt;
use std::str::FromStr;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A wall-clock `hh:mm` at which a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn matches(&self, time: &impl Timelike) -> bool {
        self.hour == time.hour() && self.minute == time.minute()
    }
}

impl FromStr for ClockTime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::config(format!("invalid clock time '{s}', expected hh:mm"));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The set of clock times a job fires at, checked once per minute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    times: Vec<ClockTime>,
}

impl Schedule {
    pub fn new(times: Vec<ClockTime>) -> Self {
        Self { times }
    }

    /// Shorthand for "at `minute` past each of `hours`".
    pub fn at_minute_past(minute: u32, hours: &[u32]) -> Self {
        Self::new(
            hours
                .iter()
                .filter_map(|&hour| ClockTime::new(hour, minute))
                .collect(),
        )
    }

    pub fn is_due(&self, time: &impl Timelike) -> bool {
        self.times.iter().any(|t| t.matches(time))
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[ClockTime] {
        &self.times
    }
}
