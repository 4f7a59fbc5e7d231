use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::DateError;

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Canonical `YYYY-MM-DD` key used for completions and per-day checklists.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

pub fn parse_date_key(raw: &str) -> Result<NaiveDate, DateError> {
    let trimmed = raw.trim();
    // chrono accepts unpadded fields; keys are always zero padded.
    if trimmed.len() != 10 {
        return Err(DateError::MalformedKey(raw.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, DATE_KEY_FORMAT)
        .map_err(|_| DateError::MalformedKey(raw.to_string()))
}

/// Inclusive walk from `start` to `end`. Empty when `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// Weekday token as stored in a habit's `frequency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleDay {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl ScheduleDay {
    pub const ALL: [ScheduleDay; 7] = [
        ScheduleDay::Mon,
        ScheduleDay::Tue,
        ScheduleDay::Wed,
        ScheduleDay::Thu,
        ScheduleDay::Fri,
        ScheduleDay::Sat,
        ScheduleDay::Sun,
    ];

    pub fn of(date: NaiveDate) -> Self {
        Self::from(date.weekday())
    }

    pub fn token(self) -> &'static str {
        match self {
            ScheduleDay::Mon => "mon",
            ScheduleDay::Tue => "tue",
            ScheduleDay::Wed => "wed",
            ScheduleDay::Thu => "thu",
            ScheduleDay::Fri => "fri",
            ScheduleDay::Sat => "sat",
            ScheduleDay::Sun => "sun",
        }
    }
}

impl From<Weekday> for ScheduleDay {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => ScheduleDay::Mon,
            Weekday::Tue => ScheduleDay::Tue,
            Weekday::Wed => ScheduleDay::Wed,
            Weekday::Thu => ScheduleDay::Thu,
            Weekday::Fri => ScheduleDay::Fri,
            Weekday::Sat => ScheduleDay::Sat,
            Weekday::Sun => ScheduleDay::Sun,
        }
    }
}

impl From<ScheduleDay> for Weekday {
    fn from(day: ScheduleDay) -> Self {
        match day {
            ScheduleDay::Mon => Weekday::Mon,
            ScheduleDay::Tue => Weekday::Tue,
            ScheduleDay::Wed => Weekday::Wed,
            ScheduleDay::Thu => Weekday::Thu,
            ScheduleDay::Fri => Weekday::Fri,
            ScheduleDay::Sat => Weekday::Sat,
            ScheduleDay::Sun => Weekday::Sun,
        }
    }
}

impl FromStr for ScheduleDay {
    type Err = DateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let day = match raw.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => ScheduleDay::Mon,
            "tue" | "tuesday" => ScheduleDay::Tue,
            "wed" | "wednesday" => ScheduleDay::Wed,
            "thu" | "thursday" => ScheduleDay::Thu,
            "fri" | "friday" => ScheduleDay::Fri,
            "sat" | "saturday" => ScheduleDay::Sat,
            "sun" | "sunday" => ScheduleDay::Sun,
            _ => return Err(DateError::UnknownWeekday(raw.to_string())),
        };
        Ok(day)
    }
}

impl fmt::Display for ScheduleDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Source of "now" and "today" for every date-relative computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, today: NaiveDate) -> Self {
        Self { now, today }
    }

    /// Noon UTC on `today`.
    pub fn on(today: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        Self {
            now: Utc.from_utc_datetime(&today.and_time(noon)),
            today,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
