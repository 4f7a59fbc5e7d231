use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::habit::Habit;

/// Title of the synthetic category that carries habit steps.
pub const HABITS_CATEGORY: &str = "Habits";

pub fn habit_task_label(habit_name: &str, step: &str) -> String {
    format!("[{habit_name}] {step}")
}

/// `"<category>|<task>"` key used by newer checklists.
pub fn composite_key(category: &str, label: &str) -> String {
    format!("{category}|{label}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCategory {
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// The checklist persisted under a date key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChecklist {
    #[serde(default)]
    pub custom_tasks: Vec<TaskCategory>,
    #[serde(default)]
    pub ai_tasks: Vec<TaskCategory>,
    #[serde(default)]
    pub default_tasks: Vec<TaskCategory>,
    #[serde(default)]
    pub checked: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskSyncOutcome {
    Injected { items: usize, seeded: usize },
    /// The date is in the past; its checklist is left as recorded.
    Frozen,
    NoChecklist,
}

/// Builds the `Habits` category for `date` from every habit scheduled that day.
pub fn project_habit_tasks<'a>(
    habits: impl IntoIterator<Item = &'a Habit>,
    date: NaiveDate,
) -> TaskCategory {
    let items = habits
        .into_iter()
        .filter(|habit| habit.is_scheduled_on(date))
        .flat_map(|habit| habit.task_labels())
        .collect();
    TaskCategory {
        title: HABITS_CATEGORY.to_string(),
        items,
    }
}

/// Replaces the `Habits` category of a today-or-future checklist.
pub fn inject_habit_tasks(
    checklist: &mut DailyChecklist,
    category: TaskCategory,
    date: NaiveDate,
    today: NaiveDate,
) -> TaskSyncOutcome {
    if date < today {
        return TaskSyncOutcome::Frozen;
    }
    let items = category.items.len();
    let seeded = checklist.replace_habit_category(category);
    TaskSyncOutcome::Injected { items, seeded }
}

impl DailyChecklist {
    pub fn categories(&self) -> impl Iterator<Item = &TaskCategory> {
        self.custom_tasks
            .iter()
            .chain(self.ai_tasks.iter())
            .chain(self.default_tasks.iter())
    }

    pub fn is_checked(&self, category: &str, label: &str) -> Option<bool> {
        self.checked
            .get(&composite_key(category, label))
            .or_else(|| self.checked.get(label))
            .copied()
    }

    /// Drops every prior `Habits` category and appends `category` to the
    /// custom tasks. New items are seeded unchecked; existing checked state is
    /// kept. Returns the number of seeded items.
    fn replace_habit_category(&mut self, category: TaskCategory) -> usize {
        for list in [
            &mut self.custom_tasks,
            &mut self.ai_tasks,
            &mut self.default_tasks,
        ] {
            list.retain(|existing| existing.title != HABITS_CATEGORY);
        }

        let mut seeded = 0;
        for label in &category.items {
            let key = composite_key(HABITS_CATEGORY, label);
            if self.checked.contains_key(label) || self.checked.contains_key(&key) {
                continue;
            }
            self.checked.insert(key, false);
            seeded += 1;
        }

        if !category.items.is_empty() {
            self.custom_tasks.push(category);
        }
        seeded
    }

    /// Sets every existing checked entry for `labels`, in both the flat and the
    /// composite key formats, to `completed`. Missing keys are not created.
    /// Returns the number of entries written.
    pub fn sync_labels(&mut self, labels: &[String], completed: bool) -> usize {
        let mut titles: Vec<String> = self.categories().map(|c| c.title.clone()).collect();
        if !titles.iter().any(|title| title == HABITS_CATEGORY) {
            titles.push(HABITS_CATEGORY.to_string());
        }

        let mut updated = 0;
        for label in labels {
            let keys = std::iter::once(label.clone())
                .chain(titles.iter().map(|title| composite_key(title, label)));
            for key in keys {
                if let Some(flag) = self.checked.get_mut(&key) {
                    *flag = completed;
                    updated += 1;
                }
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::ScheduleDay;
    use crate::habit::HabitDraft;
    use chrono::Utc;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn habits() -> Vec<Habit> {
        vec![
            HabitDraft::new("Yoga", day(2025, 10, 1))
                .frequency([ScheduleDay::Thu])
                .step("Sun salutation")
                .step("Breathing")
                .into_habit("yoga".into(), Utc::now()),
            HabitDraft::new("Run", day(2025, 10, 1))
                .frequency([ScheduleDay::Fri])
                .step("5k")
                .into_habit("run".into(), Utc::now()),
            HabitDraft::new("Read", day(2025, 10, 20))
                .step("Ten pages")
                .into_habit("read".into(), Utc::now()),
        ]
    }

    #[test]
    fn projects_only_habits_scheduled_that_day() {
        // Thursday: Yoga only (Run is Friday, Read has not started).
        let category = project_habit_tasks(&habits(), day(2025, 10, 16));
        assert_eq!(category.title, "Habits");
        assert_eq!(
            category.items,
            vec!["[Yoga] Sun salutation", "[Yoga] Breathing"]
        );
    }

    #[test]
    fn past_checklists_are_frozen() {
        let mut checklist = DailyChecklist::default();
        let category = project_habit_tasks(&habits(), day(2025, 10, 16));
        let outcome = inject_habit_tasks(&mut checklist, category, day(2025, 10, 16), day(2025, 10, 17));
        assert_eq!(outcome, TaskSyncOutcome::Frozen);
        assert_eq!(checklist, DailyChecklist::default());
    }

    #[test]
    fn injection_replaces_prior_category_and_keeps_checked_state() {
        let mut checklist: DailyChecklist = serde_json::from_value(json!({
            "customTasks": [
                {"title": "Habits", "items": ["[Yoga] Sun salutation", "[Old] Gone"]},
                {"title": "Errands", "items": ["Groceries"]}
            ],
            "defaultTasks": [{"title": "Habits", "items": ["[Legacy] Item"]}],
            "checked": {"Habits|[Yoga] Sun salutation": true, "Groceries": true},
            "notes": "keep me"
        }))
        .unwrap();
        let today = day(2025, 10, 16);
        let category = project_habit_tasks(&habits(), today);
        let outcome = inject_habit_tasks(&mut checklist, category, today, today);
        assert_eq!(outcome, TaskSyncOutcome::Injected { items: 2, seeded: 1 });

        let titles: Vec<&str> = checklist.categories().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Errands", "Habits"]);
        assert_eq!(checklist.is_checked("Habits", "[Yoga] Sun salutation"), Some(true));
        assert_eq!(checklist.is_checked("Habits", "[Yoga] Breathing"), Some(false));
        assert_eq!(checklist.checked.get("Groceries"), Some(&true));
        assert_eq!(checklist.extra.get("notes"), Some(&json!("keep me")));
    }

    #[test]
    fn empty_projection_removes_the_category() {
        let mut checklist = DailyChecklist {
            custom_tasks: vec![TaskCategory {
                title: HABITS_CATEGORY.into(),
                items: vec!["[Yoga] Breathing".into()],
            }],
            ..DailyChecklist::default()
        };
        // Saturday: nothing scheduled.
        let saturday = day(2025, 10, 18);
        let category = project_habit_tasks(&habits(), saturday);
        let outcome = inject_habit_tasks(&mut checklist, category, saturday, day(2025, 10, 16));
        assert_eq!(outcome, TaskSyncOutcome::Injected { items: 0, seeded: 0 });
        assert!(checklist.custom_tasks.is_empty());
    }

    #[test]
    fn sync_updates_flat_and_composite_keys_only() {
        let mut checklist: DailyChecklist = serde_json::from_value(json!({
            "customTasks": [{"title": "Morning", "items": ["[Yoga] Breathing"]}],
            "checked": {
                "[Yoga] Sun salutation": false,
                "Habits|[Yoga] Breathing": false,
                "Morning|[Yoga] Breathing": false,
                "Groceries": false
            }
        }))
        .unwrap();
        let labels = vec![
            "[Yoga] Sun salutation".to_string(),
            "[Yoga] Breathing".to_string(),
        ];
        assert_eq!(checklist.sync_labels(&labels, true), 3);
        assert_eq!(checklist.checked.get("[Yoga] Sun salutation"), Some(&true));
        assert_eq!(checklist.checked.get("Habits|[Yoga] Breathing"), Some(&true));
        assert_eq!(checklist.checked.get("Morning|[Yoga] Breathing"), Some(&true));
        assert_eq!(checklist.checked.get("Groceries"), Some(&false));
        assert_eq!(checklist.checked.len(), 4);
    }
}
