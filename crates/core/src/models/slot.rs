use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::BookingError;

/// A wall-clock time with minute precision, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    /// Builds a time from minutes past midnight. Returns `None` past 23:59.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::from_hm(minutes / 60, minutes % 60)
    }

    pub fn minutes(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for TimeOfDay {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| BookingError::Validation(format!("Invalid time '{}', expected HH:MM", s)))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Answer to an availability query for one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub date: NaiveDate,
    pub allowed: bool,
    pub available: Vec<TimeOfDay>,
    pub booked: Vec<TimeOfDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakWindowResponse {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

/// The booking policy as presented to calendar clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPolicyResponse {
    pub dates: Vec<NaiveDate>,
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,
    pub granularity_minutes: u32,
    pub break_window: Option<BreakWindowResponse>,
}
