use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::date::ScheduleDay;
use crate::habit::{opaque_id, Habit};
use crate::store::{record_list, split_records, RecordList};

/// One weekly reminder for a habit. Delivery belongs to an external dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitReminder {
    pub id: String,
    /// Id of the habit this reminder belongs to.
    #[serde(deserialize_with = "opaque_id")]
    pub habit: String,
    pub day: ScheduleDay,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub label: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub created: DateTime<Utc>,
}

fn enabled_by_default() -> bool {
    true
}

impl HabitReminder {
    /// First matching weekday/time strictly after `after`.
    pub fn next_occurrence(&self, after: NaiveDateTime) -> NaiveDateTime {
        let mut day = after.date();
        loop {
            if ScheduleDay::of(day) == self.day {
                let candidate = day.and_time(self.time);
                if candidate > after {
                    return candidate;
                }
            }
            day += Duration::days(1);
        }
    }
}

const HABIT_REMINDERS_KEY: &str = "habitReminders";

/// Reminder section of the store. Reminders that fail to parse are kept
/// verbatim and written back after the readable ones.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct ReminderSettings {
    pub habit_reminders: Vec<HabitReminder>,
    pub unreadable_reminders: Vec<Value>,
    pub extra: Map<String, Value>,
}

impl ReminderSettings {
    pub fn for_habit<'a>(&'a self, habit_id: &'a str) -> impl Iterator<Item = &'a HabitReminder> {
        self.habit_reminders
            .iter()
            .filter(move |reminder| reminder.habit == habit_id)
    }

    /// Removes every reminder of `habit_id`, readable or not, returning how many were dropped.
    pub fn remove_for_habit(&mut self, habit_id: &str) -> usize {
        let before = self.habit_reminders.len() + self.unreadable_reminders.len();
        self.habit_reminders
            .retain(|reminder| reminder.habit != habit_id);
        self.unreadable_reminders
            .retain(|raw| !raw_belongs_to(raw, habit_id));
        before - self.habit_reminders.len() - self.unreadable_reminders.len()
    }

    pub fn replace_for_habit(&mut self, habit_id: &str, reminders: Vec<HabitReminder>) {
        self.remove_for_habit(habit_id);
        self.habit_reminders.extend(reminders);
    }
}

fn raw_belongs_to(raw: &Value, habit_id: &str) -> bool {
    match raw.get("habit") {
        Some(Value::String(id)) => id == habit_id,
        Some(Value::Number(id)) => id.to_string() == habit_id,
        _ => false,
    }
}

impl From<Value> for ReminderSettings {
    fn from(raw: Value) -> Self {
        let mut extra = match raw {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::warn!(%other, "reminder settings are not an object; starting empty");
                Map::new()
            }
        };
        let records = record_list(extra.remove(HABIT_REMINDERS_KEY));
        let (habit_reminders, unreadable_reminders) = split_records(records, "reminder");
        Self {
            habit_reminders,
            unreadable_reminders,
            extra,
        }
    }
}

impl Serialize for ReminderSettings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.extra.len() + 1))?;
        map.serialize_entry(
            HABIT_REMINDERS_KEY,
            &RecordList {
                parsed: &self.habit_reminders,
                raw: &self.unreadable_reminders,
            },
        )?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One enabled reminder per scheduled weekday of `habit`.
pub fn build_reminders(
    habit: &Habit,
    time: NaiveTime,
    label: Option<&str>,
    created: DateTime<Utc>,
) -> Vec<HabitReminder> {
    let label = label
        .map(str::to_string)
        .unwrap_or_else(|| format!("Time for {}", habit.name));
    habit
        .frequency
        .iter()
        .map(|day| HabitReminder {
            id: uuid::Uuid::new_v4().to_string(),
            habit: habit.id.clone(),
            day: *day,
            time,
            label: label.clone(),
            enabled: true,
            created,
        })
        .collect()
}

/// `HH:MM` on the wire; `HH:MM:SS` is accepted when reading.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|_| de::Error::custom(format!("invalid reminder time `{raw}`")))
    }
}
