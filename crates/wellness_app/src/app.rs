use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};
use wellness_domain::{
    date::date_key, habit::Habit, store::JsonFileStore, tasks::TaskSyncOutcome, HabitService,
};

const DEFAULT_STORE_PATH: &str = "wellness.json";
const DEFAULT_HISTORY_DAYS: usize = 7;
const MAX_HISTORY_DAYS: usize = 3660;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) store_path: PathBuf,
    pub(crate) history_days: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup("WELLNESS_STORE") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                config.store_path = PathBuf::from(trimmed);
            }
        }
        if let Some(days) = lookup("WELLNESS_HISTORY_DAYS") {
            match days.trim().parse::<usize>() {
                Ok(value) if value > MAX_HISTORY_DAYS => {
                    warn!(%days, max = MAX_HISTORY_DAYS, "capping WELLNESS_HISTORY_DAYS");
                    config.history_days = MAX_HISTORY_DAYS;
                }
                Ok(value) if value > 0 => config.history_days = value,
                _ => warn!(%days, "ignoring invalid WELLNESS_HISTORY_DAYS"),
            }
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            history_days: DEFAULT_HISTORY_DAYS,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub task_sync: TaskSyncOutcome,
    pub habits: Vec<HabitLine>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HabitLine {
    pub name: String,
    pub scheduled_today: bool,
    pub streak_current: u32,
    pub streak_longest: u32,
    pub progress: u8,
    pub graph: String,
    pub next_reminder: Option<NaiveDateTime>,
}

pub fn run(config: AppConfig) -> Result<DailySummary> {
    info!(path = %config.store_path.display(), "opening wellness store");
    let service = HabitService::builder()
        .with_store(Box::new(JsonFileStore::new(&config.store_path)))
        .build()
        .with_context(|| format!("opening {}", config.store_path.display()))?;
    daily_summary(&service, config.history_days)
}

/// Injects today's habit tasks and summarises every habit.
pub fn daily_summary(service: &HabitService, history_days: usize) -> Result<DailySummary> {
    let today = service.clock().today();
    let task_sync = service.sync_habit_tasks(&date_key(today))?;
    info!(?task_sync, "synchronised today's habit tasks");

    let mut lines = Vec::new();
    for habit in service.habits()? {
        let line = habit_line(service, &habit, today, history_days)?;
        info!(
            habit = %line.name,
            streak = line.streak_current,
            longest = line.streak_longest,
            progress = line.progress,
            graph = %line.graph,
            scheduled = line.scheduled_today,
            "habit summary"
        );
        lines.push(line);
    }

    Ok(DailySummary {
        date: today,
        task_sync,
        habits: lines,
    })
}

fn habit_line(
    service: &HabitService,
    habit: &Habit,
    today: NaiveDate,
    history_days: usize,
) -> Result<HabitLine> {
    let scores = service
        .completion_history(&habit.id, history_days)?
        .unwrap_or_default();
    let start_of_day = today.and_time(NaiveTime::default());
    let next_reminder = service
        .reminders_for(&habit.id)?
        .iter()
        .filter(|reminder| reminder.enabled)
        .map(|reminder| reminder.next_occurrence(start_of_day))
        .min();

    Ok(HabitLine {
        name: habit.name.clone(),
        scheduled_today: habit.is_scheduled_on(today),
        streak_current: habit.stats.streak_current,
        streak_longest: habit.stats.streak_longest,
        progress: habit.stats.progress,
        graph: render_history(&scores),
        next_reminder,
    })
}

/// One cell per day: `X` completed, `.` missed, `_` nothing due.
fn render_history(scores: &[i8]) -> String {
    scores
        .iter()
        .map(|score| match score {
            1 => 'X',
            -1 => '.',
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use wellness_domain::{
        date::{FixedClock, ScheduleDay},
        habit::HabitDraft,
        store::MemoryStore,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 16).unwrap()
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_reads_environment_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("WELLNESS_STORE", "/tmp/me/wellness.json"),
            ("WELLNESS_HISTORY_DAYS", "14"),
        ]))
        .unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/me/wellness.json"));
        assert_eq!(config.history_days, 14);
    }

    #[test]
    fn config_falls_back_on_invalid_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("WELLNESS_STORE", "  "),
            ("WELLNESS_HISTORY_DAYS", "0"),
        ]))
        .unwrap();
        assert_eq!(config, AppConfig::default());
        let config = AppConfig::from_lookup(lookup(&[("WELLNESS_HISTORY_DAYS", "week")])).unwrap();
        assert_eq!(config.history_days, DEFAULT_HISTORY_DAYS);
        let config =
            AppConfig::from_lookup(lookup(&[("WELLNESS_HISTORY_DAYS", "200000000")])).unwrap();
        assert_eq!(config.history_days, MAX_HISTORY_DAYS);
    }

    #[test]
    fn renders_history_cells() {
        assert_eq!(render_history(&[1, 0, -1, 1]), "X_.X");
        assert_eq!(render_history(&[]), "");
    }

    #[test]
    fn run_opens_and_migrates_the_configured_store() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("wellness.json");
        std::fs::write(
            &path,
            r#"{"habits": [{"id": "h1", "name": "Walk", "startDate": "2025-01-01",
                "milestones": [{"name": "Month streak", "value": 30}]}]}"#,
        )
        .unwrap();
        let config = AppConfig {
            store_path: path.clone(),
            history_days: 5,
        };

        let summary = run(config).expect("daily run");
        assert_eq!(summary.habits.len(), 1);
        assert_eq!(summary.habits[0].graph.chars().count(), 5);

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"schemaVersion\": 2"));
        assert!(saved.contains("\"type\": \"streak\""));
    }

    #[test]
    fn summary_lists_each_habit_with_its_graph() {
        let service = HabitService::builder()
            .with_store(Box::new(MemoryStore::new()))
            .with_clock(Box::new(FixedClock::on(today())))
            .build()
            .unwrap();
        let habit = service
            .create_habit(
                HabitDraft::new("Meditate", today() - Duration::days(7))
                    .frequency([ScheduleDay::Thu, ScheduleDay::Fri]),
            )
            .unwrap();
        service
            .track_completion(&habit.id, &date_key(today()), true)
            .unwrap();
        service
            .schedule_reminders(&habit.id, NaiveTime::from_hms_opt(7, 30, 0).unwrap(), None)
            .unwrap();

        let summary = daily_summary(&service, 7).unwrap();
        assert_eq!(summary.date, today());
        assert_eq!(summary.task_sync, TaskSyncOutcome::NoChecklist);
        assert_eq!(summary.habits.len(), 1);
        let line = &summary.habits[0];
        assert!(line.scheduled_today);
        assert_eq!(line.streak_current, 1);
        // Fri 10-10 .. Thu 10-16, started Thu 10-09.
        assert_eq!(line.graph, "._____X");
        assert_eq!(
            line.next_reminder,
            Some(today().and_time(NaiveTime::from_hms_opt(7, 30, 0).unwrap()))
        );
    }
}
