use std::io;

/// Rejected date keys and weekday tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("malformed date key `{0}`, expected YYYY-MM-DD")]
    MalformedKey(String),

    #[error("unknown weekday token `{0}`")]
    UnknownWeekday(String),
}

/// Invalid habit input supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HabitInputError {
    #[error("habit name must not be empty")]
    EmptyName,

    #[error("habit must be scheduled on at least one weekday")]
    NoScheduledDays,

    #[error("habit `{habit_id}` has no milestone at index {index}")]
    UnknownMilestone { habit_id: String, index: usize },
}

/// Errors raised while loading or saving the persisted document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
