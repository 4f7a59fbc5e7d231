use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::date::{parse_date_key, ScheduleDay};
use crate::error::HabitInputError;
use crate::milestone::Milestone;
use crate::tasks::habit_task_label;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub frequency: Vec<ScheduleDay>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(deserialize_with = "stored_date")]
    pub start_date: NaiveDate,
    #[serde(
        default,
        deserialize_with = "stored_optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub completions: Completions,
    #[serde(default)]
    pub stats: HabitStats,
    #[serde(default)]
    pub streak_history: Vec<StreakSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Habit {
    /// Scheduled when the weekday is in `frequency` and the habit has started.
    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        day >= self.start_date && self.frequency.contains(&ScheduleDay::of(day))
    }

    /// Checklist labels generated from this habit's steps.
    pub fn task_labels(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| habit_task_label(&self.name, step))
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), HabitInputError> {
        if self.name.trim().is_empty() {
            return Err(HabitInputError::EmptyName);
        }
        if self.frequency.is_empty() {
            return Err(HabitInputError::NoScheduledDays);
        }
        Ok(())
    }
}

/// Derived statistics, recomputed from `completions` on every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitStats {
    pub streak_current: u32,
    pub streak_longest: u32,
    pub completion_rate: f64,
    pub total_completions: u32,
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    pub date: NaiveDate,
    pub streak: u32,
}

/// Ids are opaque strings; older documents stored numeric timestamps.
pub(crate) fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or numeric id, found {other}"
        ))),
    }
}

/// A date key, or an ISO timestamp whose date part is taken.
fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = parse_date_key(trimmed) {
        return Some(date);
    }
    let time = trimmed.get(10..)?;
    if !time.starts_with('T') {
        return None;
    }
    parse_date_key(trimmed.get(..10)?).ok()
}

fn stored_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_stored_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`")))
}

fn stored_optional_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_stored_date(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`"))),
    }
}

/// Sparse per-day record: `true` completed, `false` skipped, absent unknown.
///
/// Ordered by date, so iteration is chronological. Deserialization is
/// lenient: entries with malformed keys or non-boolean values are dropped
/// and anything other than an object loads as an empty map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Completions(BTreeMap<NaiveDate, bool>);

impl Completions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            if !value.is_null() {
                tracing::warn!("completions is not an object; treating as empty");
            }
            return Self::default();
        };
        let mut entries = BTreeMap::new();
        for (key, flag) in object {
            match (parse_date_key(key), flag.as_bool()) {
                (Ok(date), Some(done)) => {
                    entries.insert(date, done);
                }
                _ => tracing::warn!(%key, %flag, "dropping malformed completion entry"),
            }
        }
        Self(entries)
    }

    pub fn get(&self, day: NaiveDate) -> Option<bool> {
        self.0.get(&day).copied()
    }

    pub fn set(&mut self, day: NaiveDate, completed: bool) -> Option<bool> {
        self.0.insert(day, completed)
    }

    pub fn remove(&mut self, day: NaiveDate) -> Option<bool> {
        self.0.remove(&day)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Chronological iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, bool)> + '_ {
        self.0.iter().map(|(day, done)| (*day, *done))
    }

    pub fn latest(&self) -> Option<(NaiveDate, bool)> {
        self.iter().next_back()
    }

    pub fn completed_count(&self) -> usize {
        self.0.values().filter(|done| **done).count()
    }
}

impl FromIterator<(NaiveDate, bool)> for Completions {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Completions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

/// Caller-supplied fields for a new habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub frequency: Vec<ScheduleDay>,
    #[serde(default)]
    pub steps: Vec<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl HabitDraft {
    pub fn new(name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            frequency: ScheduleDay::ALL.to_vec(),
            steps: Vec::new(),
            start_date,
            target_date: None,
            milestones: Vec::new(),
        }
    }

    pub fn frequency(mut self, days: impl IntoIterator<Item = ScheduleDay>) -> Self {
        self.frequency = days.into_iter().collect();
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn target_date(mut self, target: NaiveDate) -> Self {
        self.target_date = Some(target);
        self
    }

    pub fn milestone(mut self, milestone: Milestone) -> Self {
        self.milestones.push(milestone);
        self
    }

    pub(crate) fn into_habit(self, id: String, created_at: DateTime<Utc>) -> Habit {
        let mut frequency = self.frequency;
        frequency.sort();
        frequency.dedup();
        Habit {
            id,
            name: self.name.trim().to_string(),
            description: self.description,
            frequency,
            steps: self.steps,
            start_date: self.start_date,
            target_date: self.target_date,
            milestones: self.milestones,
            completions: Completions::new(),
            stats: HabitStats::default(),
            streak_history: Vec::new(),
            created_at: Some(created_at),
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<Vec<ScheduleDay>>,
    pub steps: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    /// `Some(None)` clears the target date.
    pub target_date: Option<Option<NaiveDate>>,
    pub milestones: Option<Vec<Milestone>>,
}

impl HabitPatch {
    pub(crate) fn apply(self, habit: &mut Habit) {
        if let Some(name) = self.name {
            habit.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            habit.description = description;
        }
        if let Some(mut frequency) = self.frequency {
            frequency.sort();
            frequency.dedup();
            habit.frequency = frequency;
        }
        if let Some(steps) = self.steps {
            habit.steps = steps;
        }
        if let Some(start_date) = self.start_date {
            habit.start_date = start_date;
        }
        if let Some(target_date) = self.target_date {
            habit.target_date = target_date;
        }
        if let Some(milestones) = self.milestones {
            habit.milestones = milestones;
        }
    }
}
