use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::store::WellnessState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HabitEvent {
    CompletionTracked {
        habit_id: String,
        date: NaiveDate,
        completed: bool,
        /// Checklist labels derived from the habit's steps at the time of the change.
        task_labels: Vec<String>,
    },
    MilestoneAchieved {
        habit_id: String,
        milestone: String,
    },
    HabitDeleted {
        habit_id: String,
    },
}

/// Reacts to habit changes inside the same load/mutate/save cycle that
/// produced them, with write access to the rest of the document.
pub trait HabitSubscriber: Send + Sync {
    fn handle(&self, event: &HabitEvent, state: &mut WellnessState) -> Result<()>;
}

/// Keeps the per-date checklist in step with habit completions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecklistSync;

impl HabitSubscriber for ChecklistSync {
    fn handle(&self, event: &HabitEvent, state: &mut WellnessState) -> Result<()> {
        let HabitEvent::CompletionTracked {
            habit_id,
            date,
            completed,
            task_labels,
        } = event
        else {
            return Ok(());
        };
        let Some(mut checklist) = state.checklist(*date) else {
            return Ok(());
        };
        let updated = checklist.sync_labels(task_labels, *completed);
        if updated > 0 {
            state.put_checklist(*date, &checklist)?;
            debug!(%habit_id, %date, updated, "synchronised checklist entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 16).unwrap()
    }

    #[test]
    fn checklist_sync_updates_matching_labels() {
        let mut state = WellnessState::default();
        state.entries.insert(
            "2025-10-16".into(),
            json!({"checked": {"Habits|[Run] 5k": false, "Laundry": false}}),
        );
        let event = HabitEvent::CompletionTracked {
            habit_id: "run".into(),
            date: day(),
            completed: true,
            task_labels: vec!["[Run] 5k".into()],
        };
        ChecklistSync.handle(&event, &mut state).unwrap();
        let checklist = state.checklist(day()).unwrap();
        assert_eq!(checklist.checked.get("Habits|[Run] 5k"), Some(&true));
        assert_eq!(checklist.checked.get("Laundry"), Some(&false));
    }

    #[test]
    fn checklist_sync_leaves_missing_days_alone() {
        let mut state = WellnessState::default();
        let event = HabitEvent::CompletionTracked {
            habit_id: "run".into(),
            date: day(),
            completed: true,
            task_labels: vec!["[Run] 5k".into()],
        };
        ChecklistSync.handle(&event, &mut state).unwrap();
        assert!(state.entries.is_empty());

        let deleted = HabitEvent::HabitDeleted {
            habit_id: "run".into(),
        };
        ChecklistSync.handle(&deleted, &mut state).unwrap();
        assert!(state.entries.is_empty());
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = HabitEvent::MilestoneAchieved {
            habit_id: "h".into(),
            milestone: "7 day streak".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "milestone_achieved", "habit_id": "h", "milestone": "7 day streak"})
        );
    }
}
