use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::date::days_inclusive;
use crate::habit::Habit;

/// Status of a habit on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DayState {
    /// Before the start date, or a weekday the habit is not scheduled on.
    NotApplicable,
    /// Scheduled today or later with nothing recorded yet.
    Pending,
    Completed,
    Skipped,
    /// Scheduled in the past with nothing recorded.
    Missed,
}

impl DayState {
    /// Chart score: 1 completed, -1 missed, 0 otherwise.
    pub fn score(self) -> i8 {
        match self {
            DayState::Completed => 1,
            DayState::Missed => -1,
            DayState::NotApplicable | DayState::Pending | DayState::Skipped => 0,
        }
    }
}

pub fn day_state(habit: &Habit, day: NaiveDate, today: NaiveDate) -> DayState {
    if !habit.is_scheduled_on(day) {
        return DayState::NotApplicable;
    }
    match habit.completions.get(day) {
        Some(true) => DayState::Completed,
        Some(false) => DayState::Skipped,
        None if day < today => DayState::Missed,
        None => DayState::Pending,
    }
}

/// The trailing `days` ending today, oldest first. The window never
/// reaches back past [`NaiveDate::MIN`].
pub fn completion_history(
    habit: &Habit,
    days: usize,
    today: NaiveDate,
) -> impl Iterator<Item = DayState> + '_ {
    let reachable = today.signed_duration_since(NaiveDate::MIN).num_days() as u64 + 1;
    let span = u64::try_from(days).unwrap_or(u64::MAX).min(reachable);
    (0..span)
        .rev()
        .filter_map(move |offset| today.checked_sub_days(Days::new(offset)))
        .map(move |day| day_state(habit, day, today))
}

pub fn generate_completion_history(habit: &Habit, days: usize, today: NaiveDate) -> Vec<i8> {
    completion_history(habit, days, today)
        .map(DayState::score)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub status: i8,
}

/// Per-day status over an inclusive range. Empty when `start > end`.
pub fn calendar_data(
    habit: &Habit,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Vec<CalendarDay> {
    days_inclusive(start, end)
        .map(|date| CalendarDay {
            date,
            status: day_state(habit, date, today).score(),
        })
        .collect()
}
