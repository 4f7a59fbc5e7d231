pub mod date;
pub mod error;
pub mod events;
pub mod habit;
pub mod history;
pub mod milestone;
pub mod reminders;
pub mod service;
pub mod stats;
pub mod store;
pub mod tasks;

pub use crate::service::{HabitService, HabitServiceBuilder};
