use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::habit::HabitStats;

/// Consistency milestones need at least this many completions.
pub const CONSISTENCY_MIN_COMPLETIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MilestoneKind {
    Streak,
    Completion,
    Time,
    Consistency,
    Manual,
    /// A type string this build does not recognise, kept verbatim. Evaluated as a streak.
    Unknown(String),
}

impl MilestoneKind {
    pub fn as_str(&self) -> &str {
        match self {
            MilestoneKind::Streak => "streak",
            MilestoneKind::Completion => "completion",
            MilestoneKind::Time => "time",
            MilestoneKind::Consistency => "consistency",
            MilestoneKind::Manual => "manual",
            MilestoneKind::Unknown(raw) => raw,
        }
    }
}

impl Serialize for MilestoneKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MilestoneKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "streak" => MilestoneKind::Streak,
            "completion" => MilestoneKind::Completion,
            "time" => MilestoneKind::Time,
            "consistency" => MilestoneKind::Consistency,
            "manual" => MilestoneKind::Manual,
            _ => MilestoneKind::Unknown(raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MilestoneKind>,
    #[serde(default)]
    pub achieved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achieved_date: Option<DateTime<Utc>>,
}

impl Milestone {
    pub fn new(name: impl Into<String>, kind: MilestoneKind, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            kind: Some(kind),
            achieved: false,
            achieved_date: None,
        }
    }

    /// Kind used for evaluation; untyped and unknown records count as streaks.
    pub fn effective_kind(&self) -> MilestoneKind {
        match &self.kind {
            None | Some(MilestoneKind::Unknown(_)) => MilestoneKind::Streak,
            Some(kind) => kind.clone(),
        }
    }

    fn is_met(&self, stats: &HabitStats, elapsed_days: i64) -> bool {
        match self.effective_kind() {
            MilestoneKind::Streak | MilestoneKind::Unknown(_) => {
                f64::from(stats.streak_current) >= self.value
                    || f64::from(stats.streak_longest) >= self.value
            }
            MilestoneKind::Completion => f64::from(stats.total_completions) >= self.value,
            MilestoneKind::Time => elapsed_days as f64 >= self.value,
            MilestoneKind::Consistency => {
                stats.completion_rate * 100.0 >= self.value
                    && stats.total_completions >= CONSISTENCY_MIN_COMPLETIONS
            }
            MilestoneKind::Manual => false,
        }
    }
}

/// Guess a type for a legacy milestone from its name.
pub fn infer_kind(name: &str) -> MilestoneKind {
    let lowered = name.to_lowercase();
    if lowered.contains("streak") {
        MilestoneKind::Streak
    } else if lowered.contains("total") || lowered.contains("complet") {
        MilestoneKind::Completion
    } else if lowered.contains("week") || lowered.contains("month") {
        MilestoneKind::Time
    } else if lowered.contains("consist") || lowered.contains("percent") {
        MilestoneKind::Consistency
    } else {
        MilestoneKind::Streak
    }
}

/// Assigns an inferred type to every untyped milestone. Returns how many changed.
pub fn migrate_milestones(milestones: &mut [Milestone]) -> usize {
    let mut migrated = 0;
    for milestone in milestones.iter_mut().filter(|m| m.kind.is_none()) {
        let kind = infer_kind(&milestone.name);
        tracing::debug!(name = %milestone.name, ?kind, "inferred legacy milestone type");
        milestone.kind = Some(kind);
        migrated += 1;
    }
    migrated
}

/// Marks newly reached milestones as achieved and returns their names.
/// Already-achieved milestones are never touched.
pub fn evaluate_milestones(
    milestones: &mut [Milestone],
    stats: &HabitStats,
    elapsed_days: i64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut achieved = Vec::new();
    for milestone in milestones.iter_mut().filter(|m| !m.achieved) {
        if milestone.is_met(stats, elapsed_days) {
            milestone.achieved = true;
            milestone.achieved_date = Some(now);
            achieved.push(milestone.name.clone());
        }
    }
    achieved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn untyped(name: &str) -> Milestone {
        Milestone {
            name: name.into(),
            value: 7.0,
            kind: None,
            achieved: false,
            achieved_date: None,
        }
    }

    #[test]
    fn infers_kind_from_name() {
        assert_eq!(infer_kind("7 Day Streak"), MilestoneKind::Streak);
        assert_eq!(infer_kind("50 total sessions"), MilestoneKind::Completion);
        assert_eq!(infer_kind("First Completion"), MilestoneKind::Completion);
        assert_eq!(infer_kind("One Month In"), MilestoneKind::Time);
        assert_eq!(infer_kind("Two WEEKS"), MilestoneKind::Time);
        assert_eq!(infer_kind("Consistent Performer"), MilestoneKind::Consistency);
        assert_eq!(infer_kind("90 percent club"), MilestoneKind::Consistency);
        assert_eq!(infer_kind("Gold badge"), MilestoneKind::Streak);
    }

    #[test]
    fn migration_is_idempotent_and_keeps_typed_records() {
        let mut milestones = vec![
            untyped("Monthly habit"),
            Milestone::new("Streak of completions", MilestoneKind::Manual, 3.0),
        ];
        assert_eq!(migrate_milestones(&mut milestones), 1);
        let once = milestones.clone();
        assert_eq!(migrate_milestones(&mut milestones), 0);
        assert_eq!(milestones, once);
        assert_eq!(milestones[0].kind, Some(MilestoneKind::Time));
        assert_eq!(milestones[1].kind, Some(MilestoneKind::Manual));
    }

    #[test]
    fn unknown_type_strings_are_evaluated_as_streaks() {
        let milestone: Milestone =
            serde_json::from_value(json!({"name": "Mystery", "value": 3, "type": "lunar"}))
                .unwrap();
        assert_eq!(milestone.kind, Some(MilestoneKind::Unknown("lunar".into())));
        assert_eq!(milestone.effective_kind(), MilestoneKind::Streak);
        let back = serde_json::to_value(&milestone).unwrap();
        assert_eq!(back["type"], json!("lunar"));

        let legacy: Milestone = serde_json::from_value(json!({"name": "Old", "value": 3})).unwrap();
        assert_eq!(legacy.kind, None);
        assert!(!legacy.achieved);
    }

    #[test]
    fn evaluates_each_kind() {
        let stats = HabitStats {
            streak_current: 2,
            streak_longest: 6,
            completion_rate: 0.95,
            total_completions: 12,
            progress: 0,
        };
        let now = Utc::now();
        let mut milestones = vec![
            Milestone::new("streak", MilestoneKind::Streak, 5.0),
            Milestone::new("completion", MilestoneKind::Completion, 12.0),
            Milestone::new("time", MilestoneKind::Time, 31.0),
            Milestone::new("consistency", MilestoneKind::Consistency, 90.0),
            Milestone::new("manual", MilestoneKind::Manual, 0.0),
        ];
        let achieved = evaluate_milestones(&mut milestones, &stats, 30, now);
        assert_eq!(achieved, vec!["streak", "completion", "consistency"]);
        assert_eq!(milestones[0].achieved_date, Some(now));
        assert!(!milestones[2].achieved);
        assert!(!milestones[4].achieved);
    }

    #[test]
    fn consistency_requires_a_minimum_sample() {
        let stats = HabitStats {
            completion_rate: 1.0,
            total_completions: 9,
            ..HabitStats::default()
        };
        let mut milestones = vec![Milestone::new("perfect", MilestoneKind::Consistency, 80.0)];
        assert!(evaluate_milestones(&mut milestones, &stats, 0, Utc::now()).is_empty());
    }

    #[test]
    fn achieved_milestones_are_left_alone() {
        let earlier = Utc::now() - chrono::Duration::days(3);
        let mut milestones = vec![Milestone {
            achieved: true,
            achieved_date: Some(earlier),
            ..Milestone::new("streak", MilestoneKind::Streak, 100.0)
        }];
        let achieved = evaluate_milestones(&mut milestones, &HabitStats::default(), 0, Utc::now());
        assert!(achieved.is_empty());
        assert!(milestones[0].achieved);
        assert_eq!(milestones[0].achieved_date, Some(earlier));
    }
}
