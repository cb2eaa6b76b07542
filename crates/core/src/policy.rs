//! # Slot Policy
//!
//! The fixed booking policy: which dates accept appointments, the daily
//! window, the slot step and the lunch break. The policy is built once at
//! start-up and never changes while the service runs.
//!
//! The time grid is computed on minutes past midnight so a window ending
//! late in the day can never wrap around to the next morning.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::errors::{BookingError, BookingResult};
use crate::models::slot::{BreakWindowResponse, SlotPolicyResponse, TimeOfDay};

/// A `[start, end)` interval excluded from the time grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl BreakWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> BookingResult<Self> {
        if start >= end {
            return Err(BookingError::Validation(format!(
                "Break window start {} must be before its end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPolicy {
    allowed_dates: BTreeSet<NaiveDate>,
    day_start: TimeOfDay,
    day_end: TimeOfDay,
    granularity_minutes: u32,
    break_window: Option<BreakWindow>,
}

impl SlotPolicy {
    /// Builds a policy, rejecting empty windows and a zero step.
    pub fn new(
        allowed_dates: impl IntoIterator<Item = NaiveDate>,
        day_start: TimeOfDay,
        day_end: TimeOfDay,
        granularity_minutes: u32,
        break_window: Option<BreakWindow>,
    ) -> BookingResult<Self> {
        if day_start >= day_end {
            return Err(BookingError::Validation(format!(
                "Day start {} must be before day end {}",
                day_start, day_end
            )));
        }
        if granularity_minutes == 0 {
            return Err(BookingError::Validation(
                "Slot granularity must be at least one minute".to_string(),
            ));
        }

        Ok(Self {
            allowed_dates: allowed_dates.into_iter().collect(),
            day_start,
            day_end,
            granularity_minutes,
            break_window,
        })
    }

    /// The August 2025 open-house days: 10:00 to 16:00 in five minute steps,
    /// closed from 12:00 to 12:20.
    pub fn open_house() -> Self {
        let dates = [18, 19, 20, 21, 22, 25, 26]
            .into_iter()
            .filter_map(|day| NaiveDate::from_ymd_opt(2025, 8, day));

        Self {
            allowed_dates: dates.collect(),
            day_start: hm(10, 0),
            day_end: hm(16, 0),
            granularity_minutes: 5,
            break_window: Some(BreakWindow {
                start: hm(12, 0),
                end: hm(12, 20),
            }),
        }
    }

    pub fn allowed_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.allowed_dates.iter().copied()
    }

    pub fn day_start(&self) -> TimeOfDay {
        self.day_start
    }

    pub fn day_end(&self) -> TimeOfDay {
        self.day_end
    }

    pub fn granularity_minutes(&self) -> u32 {
        self.granularity_minutes
    }

    pub fn break_window(&self) -> Option<BreakWindow> {
        self.break_window
    }

    pub fn is_allowed_date(&self, date: NaiveDate) -> bool {
        self.allowed_dates.contains(&date)
    }

    fn in_break(&self, time: TimeOfDay) -> bool {
        self.break_window.is_some_and(|window| window.contains(time))
    }

    /// Every bookable time of a day, ascending.
    pub fn time_grid(&self) -> Vec<TimeOfDay> {
        (self.day_start.minutes()..self.day_end.minutes())
            .step_by(self.granularity_minutes as usize)
            .filter_map(TimeOfDay::from_minutes)
            .filter(|time| !self.in_break(*time))
            .collect()
    }

    pub fn is_on_grid(&self, time: TimeOfDay) -> bool {
        time >= self.day_start
            && time < self.day_end
            && (time.minutes() - self.day_start.minutes()) % self.granularity_minutes == 0
            && !self.in_break(time)
    }

    pub fn is_bookable(&self, date: NaiveDate, time: TimeOfDay) -> bool {
        self.is_allowed_date(date) && self.is_on_grid(time)
    }

    /// Fails with a validation error naming the reason a slot cannot be booked.
    pub fn ensure_bookable(&self, date: NaiveDate, time: TimeOfDay) -> BookingResult<()> {
        if !self.is_allowed_date(date) {
            return Err(BookingError::Validation(format!(
                "Appointments are not offered on {}",
                date
            )));
        }
        if !self.is_on_grid(time) {
            return Err(BookingError::Validation(format!(
                "{} is not an appointment time on {}",
                time, date
            )));
        }
        Ok(())
    }

    pub fn to_response(&self) -> SlotPolicyResponse {
        SlotPolicyResponse {
            dates: self.allowed_dates().collect(),
            day_start: self.day_start,
            day_end: self.day_end,
            granularity_minutes: self.granularity_minutes,
            break_window: self.break_window.map(|window| BreakWindowResponse {
                start: window.start,
                end: window.end,
            }),
        }
    }
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self::open_house()
    }
}

fn hm(hour: u32, minute: u32) -> TimeOfDay {
    TimeOfDay::from_minutes(hour * 60 + minute).unwrap_or_else(|| unreachable!("constant time"))
}
