use anyhow::{Context, Result};
use chrono::NaiveTime;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    date::{parse_date_key, Clock, SystemClock},
    error::HabitInputError,
    events::{ChecklistSync, HabitEvent, HabitSubscriber},
    habit::{Habit, HabitDraft, HabitPatch},
    history::{self, CalendarDay},
    reminders::{self, HabitReminder},
    stats::recompute_stats,
    store::{MemoryStore, StateStore, WellnessState},
    tasks::{self, TaskCategory, TaskSyncOutcome},
};

/// Habit CRUD and tracking over a [`StateStore`].
///
/// Habit-scoped operations return `Ok(None)` for an unknown habit id.
pub struct HabitService {
    store: Box<dyn StateStore>,
    clock: Box<dyn Clock>,
    subscribers: Vec<Box<dyn HabitSubscriber>>,
    write_lock: Mutex<()>,
}

pub struct HabitServiceBuilder {
    store: Option<Box<dyn StateStore>>,
    clock: Option<Box<dyn Clock>>,
    subscribers: Vec<Box<dyn HabitSubscriber>>,
    checklist_sync: bool,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: None,
            subscribers: Vec::new(),
            checklist_sync: true,
        }
    }

    pub fn with_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_subscriber(mut self, subscriber: Box<dyn HabitSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Skip registering the built-in [`ChecklistSync`] subscriber.
    pub fn without_checklist_sync(mut self) -> Self {
        self.checklist_sync = false;
        self
    }

    pub fn build(self) -> Result<HabitService> {
        let mut subscribers = self.subscribers;
        if self.checklist_sync {
            subscribers.insert(0, Box::new(ChecklistSync));
        }
        let service = HabitService {
            store: self.store.unwrap_or_else(|| Box::new(MemoryStore::new())),
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
            subscribers,
            write_lock: Mutex::new(()),
        };
        service.migrate_store()?;
        Ok(service)
    }
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One load/mutate/save cycle. Publishing an event marks it dirty.
struct Transaction {
    state: WellnessState,
    events: Vec<HabitEvent>,
    dirty: bool,
}

impl Transaction {
    fn publish(&mut self, event: HabitEvent) {
        self.events.push(event);
        self.dirty = true;
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn habits(&self) -> Result<Vec<Habit>> {
        self.read(|state| state.habits.clone())
    }

    pub fn habit(&self, habit_id: &str) -> Result<Option<Habit>> {
        self.read(|state| state.habit(habit_id).cloned())
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub fn create_habit(&self, draft: HabitDraft) -> Result<Habit> {
        let clock = self.clock();
        let mut habit = draft.into_habit(uuid::Uuid::new_v4().to_string(), clock.now());
        habit.validate()?;
        recompute_stats(&mut habit, clock);
        self.transact(|tx| {
            tx.state.habits.push(habit.clone());
            tx.mark_dirty();
            info!(habit_id = %habit.id, "created habit");
            Ok(habit)
        })
    }

    #[instrument(skip(self, patch))]
    pub fn update_habit(&self, habit_id: &str, patch: HabitPatch) -> Result<Option<Habit>> {
        let clock = self.clock();
        self.transact(|tx| {
            let Some(habit) = tx.state.habit_mut(habit_id) else {
                return Ok(None);
            };
            let mut updated = habit.clone();
            patch.apply(&mut updated);
            updated.validate()?;
            let achieved = recompute_stats(&mut updated, clock);
            *habit = updated.clone();
            tx.mark_dirty();
            publish_achievements(tx, habit_id, achieved);
            info!("updated habit");
            Ok(Some(updated))
        })
    }

    /// Removes the habit together with its reminders and adherence records.
    #[instrument(skip(self))]
    pub fn delete_habit(&self, habit_id: &str) -> Result<Option<Habit>> {
        self.transact(|tx| {
            let Some(index) = tx.state.habits.iter().position(|h| h.id == habit_id) else {
                return Ok(None);
            };
            let removed = tx.state.habits.remove(index);
            let reminders = tx.state.reminder_settings.remove_for_habit(habit_id);
            let adherence = tx.state.habit_adherence.remove(habit_id).is_some();
            tx.publish(HabitEvent::HabitDeleted {
                habit_id: habit_id.to_string(),
            });
            info!(reminders, adherence, "deleted habit");
            Ok(Some(removed))
        })
    }

    /// Records a completion (or an explicit skip) for one day and recomputes.
    #[instrument(skip(self))]
    pub fn track_completion(
        &self,
        habit_id: &str,
        date_key: &str,
        completed: bool,
    ) -> Result<Option<Habit>> {
        let date = parse_date_key(date_key)?;
        let clock = self.clock();
        self.transact(|tx| {
            let Some(habit) = tx.state.habit_mut(habit_id) else {
                debug!("unknown habit");
                return Ok(None);
            };
            habit.completions.set(date, completed);
            let achieved = recompute_stats(habit, clock);
            let snapshot = habit.clone();
            tx.publish(HabitEvent::CompletionTracked {
                habit_id: habit_id.to_string(),
                date,
                completed,
                task_labels: snapshot.task_labels(),
            });
            publish_achievements(tx, habit_id, achieved);
            Ok(Some(snapshot))
        })
    }

    /// Forgets the record for one day, returning it to "unknown".
    #[instrument(skip(self))]
    pub fn clear_completion(&self, habit_id: &str, date_key: &str) -> Result<Option<Habit>> {
        let date = parse_date_key(date_key)?;
        let clock = self.clock();
        self.transact(|tx| {
            let Some(habit) = tx.state.habit_mut(habit_id) else {
                return Ok(None);
            };
            if habit.completions.remove(date).is_none() {
                return Ok(Some(habit.clone()));
            }
            let achieved = recompute_stats(habit, clock);
            let snapshot = habit.clone();
            tx.mark_dirty();
            publish_achievements(tx, habit_id, achieved);
            Ok(Some(snapshot))
        })
    }

    /// Manual milestone toggle; the only way an achieved milestone is reverted.
    #[instrument(skip(self))]
    pub fn set_milestone_achieved(
        &self,
        habit_id: &str,
        index: usize,
        achieved: bool,
    ) -> Result<Option<Habit>> {
        let now = self.clock().now();
        self.transact(|tx| {
            let Some(habit) = tx.state.habit_mut(habit_id) else {
                return Ok(None);
            };
            let milestone =
                habit
                    .milestones
                    .get_mut(index)
                    .ok_or_else(|| HabitInputError::UnknownMilestone {
                        habit_id: habit_id.to_string(),
                        index,
                    })?;
            let newly_achieved = achieved && !milestone.achieved;
            milestone.achieved = achieved;
            milestone.achieved_date = achieved.then_some(milestone.achieved_date.unwrap_or(now));
            let name = milestone.name.clone();
            let snapshot = habit.clone();
            tx.mark_dirty();
            if newly_achieved {
                publish_achievements(tx, habit_id, vec![name]);
            }
            Ok(Some(snapshot))
        })
    }

    /// Trailing `days` of scores (1, 0, -1) ending today, oldest first.
    pub fn completion_history(&self, habit_id: &str, days: usize) -> Result<Option<Vec<i8>>> {
        let today = self.clock().today();
        self.read(|state| {
            state
                .habit(habit_id)
                .map(|habit| history::generate_completion_history(habit, days, today))
        })
    }

    pub fn calendar_data(
        &self,
        habit_id: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<Option<Vec<CalendarDay>>> {
        let start = parse_date_key(start_key)?;
        let end = parse_date_key(end_key)?;
        let today = self.clock().today();
        self.read(|state| {
            state
                .habit(habit_id)
                .map(|habit| history::calendar_data(habit, start, end, today))
        })
    }

    pub fn project_habit_tasks(&self, date_key: &str) -> Result<TaskCategory> {
        let date = parse_date_key(date_key)?;
        self.read(|state| tasks::project_habit_tasks(&state.habits, date))
    }

    /// Injects the `Habits` category into the checklist stored for `date_key`.
    #[instrument(skip(self))]
    pub fn sync_habit_tasks(&self, date_key: &str) -> Result<TaskSyncOutcome> {
        let date = parse_date_key(date_key)?;
        let today = self.clock().today();
        self.transact(|tx| {
            let Some(mut checklist) = tx.state.checklist(date) else {
                return Ok(TaskSyncOutcome::NoChecklist);
            };
            let category = tasks::project_habit_tasks(&tx.state.habits, date);
            let outcome = tasks::inject_habit_tasks(&mut checklist, category, date, today);
            if let TaskSyncOutcome::Injected { items, seeded } = outcome {
                tx.state.put_checklist(date, &checklist)?;
                tx.mark_dirty();
                debug!(items, seeded, "injected habit tasks");
            }
            Ok(outcome)
        })
    }

    /// Replaces the habit's reminders with one per scheduled weekday.
    #[instrument(skip(self))]
    pub fn schedule_reminders(
        &self,
        habit_id: &str,
        time: NaiveTime,
        label: Option<&str>,
    ) -> Result<Option<Vec<HabitReminder>>> {
        let now = self.clock().now();
        self.transact(|tx| {
            let Some(habit) = tx.state.habit(habit_id) else {
                return Ok(None);
            };
            let reminders = reminders::build_reminders(habit, time, label, now);
            tx.state
                .reminder_settings
                .replace_for_habit(habit_id, reminders.clone());
            tx.mark_dirty();
            info!(count = reminders.len(), "scheduled habit reminders");
            Ok(Some(reminders))
        })
    }

    pub fn reminders_for(&self, habit_id: &str) -> Result<Vec<HabitReminder>> {
        self.read(|state| {
            state
                .reminder_settings
                .for_habit(habit_id)
                .cloned()
                .collect()
        })
    }
}

impl HabitService {
    fn read<T>(&self, op: impl FnOnce(&WellnessState) -> T) -> Result<T> {
        let state = self.store.load().context("loading wellness store")?;
        Ok(op(&state))
    }

    fn transact<T>(&self, op: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock();
        let state = self.store.load().context("loading wellness store")?;
        let mut tx = Transaction {
            state,
            events: Vec::new(),
            dirty: false,
        };
        let output = op(&mut tx)?;
        if !tx.dirty {
            return Ok(output);
        }
        for event in &tx.events {
            for subscriber in &self.subscribers {
                subscriber.handle(event, &mut tx.state)?;
            }
        }
        self.store
            .save(&tx.state)
            .context("saving wellness store")?;
        Ok(output)
    }

    fn migrate_store(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut state = self.store.load().context("loading wellness store")?;
        if state.migrate() {
            self.store
                .save(&state)
                .context("saving migrated wellness store")?;
        }
        Ok(())
    }
}

fn publish_achievements(tx: &mut Transaction, habit_id: &str, achieved: Vec<String>) {
    for milestone in achieved {
        info!(%habit_id, %milestone, "milestone achieved");
        tx.publish(HabitEvent::MilestoneAchieved {
            habit_id: habit_id.to_string(),
            milestone,
        });
    }
}
