//! Streak, rate and progress computation over a habit's completion map.
//!
//! Everything here is a full recomputation from `completions`; nothing is
//! updated incrementally.

use chrono::NaiveDate;
use tracing::debug;

use crate::date::Clock;
use crate::habit::{Completions, Habit, HabitStats, StreakSnapshot};
use crate::milestone::{evaluate_milestones, migrate_milestones};

/// Longest streak that counts as full streak progress.
pub const STREAK_PROGRESS_DAYS: f64 = 30.0;

const TIME_WEIGHT: f64 = 0.4;
const TARGET_RATE_WEIGHT: f64 = 0.6;
const RATE_WEIGHT: f64 = 0.7;
const STREAK_WEIGHT: f64 = 0.3;

pub fn compute_stats(
    completions: &Completions,
    start_date: NaiveDate,
    target_date: Option<NaiveDate>,
    today: NaiveDate,
) -> HabitStats {
    if completions.is_empty() {
        return HabitStats::default();
    }

    let total = completions.completed_count();
    let completion_rate = total as f64 / completions.len() as f64;
    let streak_current = current_streak(completions, today);
    let streak_longest = longest_streak(completions).max(streak_current);
    let progress = progress(
        completion_rate,
        streak_longest,
        start_date,
        target_date,
        today,
    );

    HabitStats {
        streak_current,
        streak_longest,
        completion_rate,
        total_completions: u32::try_from(total).unwrap_or(u32::MAX),
        progress,
    }
}

/// Run of consecutive completed days ending at the latest recorded date,
/// which must be today or yesterday.
pub fn current_streak(completions: &Completions, today: NaiveDate) -> u32 {
    let Some((latest, true)) = completions.latest() else {
        return 0;
    };
    if latest != today && Some(latest) != today.pred_opt() {
        return 0;
    }

    let mut streak = 1;
    let mut cursor = latest;
    for (day, done) in completions.iter().rev().skip(1) {
        if !done || cursor.pred_opt() != Some(day) {
            break;
        }
        streak += 1;
        cursor = day;
    }
    streak
}

/// Longest run of consecutive completed days anywhere in the record.
pub fn longest_streak(completions: &Completions) -> u32 {
    let mut longest = 0;
    let mut running = 0;
    let mut previous: Option<(NaiveDate, bool)> = None;

    for (day, done) in completions.iter() {
        running = match (done, previous) {
            (false, _) => 0,
            (true, Some((prev, true))) if prev.succ_opt() == Some(day) => running + 1,
            (true, _) => 1,
        };
        longest = longest.max(running);
        previous = Some((day, done));
    }
    longest
}

fn progress(
    completion_rate: f64,
    streak_longest: u32,
    start_date: NaiveDate,
    target_date: Option<NaiveDate>,
    today: NaiveDate,
) -> u8 {
    let weighted = match target_date {
        Some(target) => {
            let span = target.signed_duration_since(start_date).num_days();
            let time_progress = if span <= 0 {
                1.0
            } else {
                let elapsed = today.signed_duration_since(start_date).num_days();
                (elapsed as f64 / span as f64).clamp(0.0, 1.0)
            };
            time_progress * TIME_WEIGHT + completion_rate * TARGET_RATE_WEIGHT
        }
        None => {
            let streak_progress = (f64::from(streak_longest) / STREAK_PROGRESS_DAYS).min(1.0);
            completion_rate * RATE_WEIGHT + streak_progress * STREAK_WEIGHT
        }
    };
    (weighted * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Recomputes `stats`, appends to `streak_history` and evaluates milestones.
/// Returns the names of milestones achieved by this recomputation.
pub fn recompute_stats(habit: &mut Habit, clock: &dyn Clock) -> Vec<String> {
    migrate_milestones(&mut habit.milestones);

    if habit.completions.is_empty() {
        habit.stats = HabitStats::default();
        debug!(habit_id = %habit.id, "no completions recorded; stats reset");
        return Vec::new();
    }

    let today = clock.today();
    let stats = compute_stats(
        &habit.completions,
        habit.start_date,
        habit.target_date,
        today,
    );
    habit.stats = stats;
    record_streak(&mut habit.streak_history, stats.streak_current, today);

    let elapsed_days = today.signed_duration_since(habit.start_date).num_days();
    let achieved = evaluate_milestones(&mut habit.milestones, &stats, elapsed_days, clock.now());

    debug!(
        habit_id = %habit.id,
        streak_current = stats.streak_current,
        streak_longest = stats.streak_longest,
        completion_rate = stats.completion_rate,
        progress = stats.progress,
        "recomputed habit stats"
    );
    achieved
}

fn record_streak(history: &mut Vec<StreakSnapshot>, streak: u32, today: NaiveDate) {
    if history.last().map(|last| last.streak) != Some(streak) {
        history.push(StreakSnapshot { date: today, streak });
    }
}
