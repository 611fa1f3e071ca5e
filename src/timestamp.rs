//! Timestamp
//!
//! Wall-clock date/time as stored in AFS metadata records: six little-endian
//! `u16` fields, no time zone.

use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};

/// Encoded size of a timestamp: six u16 fields
pub const TIMESTAMP_SIZE: usize = 12;

/// Last-modified date of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hours: u16,
    pub minutes: u16,
    pub seconds: u16,
}

impl Timestamp {
    pub fn new(year: u16, month: u16, day: u16, hours: u16, minutes: u16, seconds: u16) -> Self {
        Self {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        Self::from(Local::now().naive_local())
    }

    /// Convert a filesystem mtime to local time
    pub fn from_system_time(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        Self::from(local.naive_local())
    }

    /// Interpret as a calendar date/time, if the fields form a valid one
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        chrono::NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(
            u32::from(self.hours),
            u32::from(self.minutes),
            u32::from(self.seconds),
        )
    }

    /// An all-zero timestamp, as found in archives without metadata
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self {
            year: u16::try_from(dt.year()).unwrap_or(0),
            month: dt.month() as u16,
            day: dt.day() as u16,
            hours: dt.hour() as u16,
            minutes: dt.minute() as u16,
            seconds: dt.second() as u16,
        }
    }
}

/// Renders as `DD.MM.YYYY HH:MM:SS`
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}.{:02}.{:04} {:02}:{:02}:{:02}",
            self.day, self.month, self.year, self.hours, self.minutes, self.seconds
        )
    }
}
