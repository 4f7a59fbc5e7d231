//! The persisted wellness document and the stores that load and save it.
//!
//! The whole document is read, mutated and written back per operation, so
//! two processes sharing one store are last-writer-wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::date::date_key;
use crate::error::StoreError;
use crate::habit::Habit;
use crate::milestone::migrate_milestones;
use crate::reminders::ReminderSettings;
use crate::tasks::DailyChecklist;

/// Version 2 guarantees every milestone carries a type.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const HABIT_ADHERENCE_KEY: &str = "habitAdherence";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "StoredState")]
pub struct WellnessState {
    pub schema_version: u32,
    pub habits: Vec<Habit>,
    /// Habit records that failed to parse. Written back untouched after `habits`.
    pub unreadable_habits: Vec<Value>,
    pub reminder_settings: ReminderSettings,
    /// Adherence records keyed by habit id.
    pub habit_adherence: BTreeMap<String, Value>,
    /// Per-date checklists and any keys owned by other features.
    pub entries: Map<String, Value>,
}

impl WellnessState {
    pub fn habit(&self, habit_id: &str) -> Option<&Habit> {
        self.habits.iter().find(|habit| habit.id == habit_id)
    }

    pub fn habit_mut(&mut self, habit_id: &str) -> Option<&mut Habit> {
        self.habits.iter_mut().find(|habit| habit.id == habit_id)
    }

    /// The checklist stored for `date`, if one exists and parses.
    pub fn checklist(&self, date: NaiveDate) -> Option<DailyChecklist> {
        let key = date_key(date);
        let raw = self.entries.get(&key)?;
        match serde_json::from_value(raw.clone()) {
            Ok(checklist) => Some(checklist),
            Err(err) => {
                tracing::warn!(%key, %err, "ignoring malformed daily checklist");
                None
            }
        }
    }

    pub fn put_checklist(
        &mut self,
        date: NaiveDate,
        checklist: &DailyChecklist,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(checklist)?;
        self.entries.insert(date_key(date), value);
        Ok(())
    }

    /// Brings an older document up to [`CURRENT_SCHEMA_VERSION`].
    /// Returns `true` when anything changed.
    pub fn migrate(&mut self) -> bool {
        if self.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }
        let migrated: usize = self
            .habits
            .iter_mut()
            .map(|habit| migrate_milestones(&mut habit.milestones))
            .sum();
        tracing::info!(
            from = self.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            milestones = migrated,
            "migrated wellness document"
        );
        self.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}

/// On-disk shape. Only the top-level object itself is strict.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    habits: Option<Value>,
    #[serde(default)]
    reminder_settings: ReminderSettings,
    #[serde(default)]
    habit_adherence: Option<Value>,
    #[serde(flatten)]
    entries: Map<String, Value>,
}

impl From<StoredState> for WellnessState {
    fn from(stored: StoredState) -> Self {
        let mut entries = stored.entries;
        let (habits, unreadable_habits) = split_records(record_list(stored.habits), "habit");
        let habit_adherence = match stored.habit_adherence {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(records)) => records.into_iter().collect(),
            Some(other) => {
                tracing::warn!("habit adherence is not an object; keeping it as is");
                entries.insert(HABIT_ADHERENCE_KEY.to_string(), other);
                BTreeMap::new()
            }
        };
        Self {
            schema_version: stored.schema_version,
            habits,
            unreadable_habits,
            reminder_settings: stored.reminder_settings,
            habit_adherence,
            entries,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredStateRef<'a> {
    schema_version: u32,
    habits: RecordList<'a, Habit>,
    reminder_settings: &'a ReminderSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    habit_adherence: Option<&'a BTreeMap<String, Value>>,
    #[serde(flatten)]
    entries: &'a Map<String, Value>,
}

impl Serialize for WellnessState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // A malformed adherence value loaded earlier lives in `entries`.
        let adherence_in_entries = self.entries.contains_key(HABIT_ADHERENCE_KEY);
        StoredStateRef {
            schema_version: self.schema_version,
            habits: RecordList {
                parsed: &self.habits,
                raw: &self.unreadable_habits,
            },
            reminder_settings: &self.reminder_settings,
            habit_adherence: (!adherence_in_entries).then_some(&self.habit_adherence),
            entries: &self.entries,
        }
        .serialize(serializer)
    }
}

/// Parsed records followed by the raw ones that could not be parsed.
pub(crate) struct RecordList<'a, T> {
    pub(crate) parsed: &'a [T],
    pub(crate) raw: &'a [Value],
}

impl<T: Serialize> Serialize for RecordList<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.parsed.len() + self.raw.len()))?;
        for record in self.parsed {
            seq.serialize_element(record)?;
        }
        for record in self.raw {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

/// Elements of a stored array. A lone non-array value counts as one record.
pub(crate) fn record_list(raw: Option<Value>) -> Vec<Value> {
    match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(records)) => records,
        Some(other) => {
            tracing::warn!("expected an array of records; keeping the value as one record");
            vec![other]
        }
    }
}

/// Separates records that parse as `T` from those that do not.
pub(crate) fn split_records<T: DeserializeOwned>(
    records: Vec<Value>,
    what: &str,
) -> (Vec<T>, Vec<Value>) {
    let mut parsed = Vec::with_capacity(records.len());
    let mut raw = Vec::new();
    for record in records {
        match T::deserialize(&record) {
            Ok(value) => parsed.push(value),
            Err(err) => {
                tracing::warn!(%err, record = what, "keeping unreadable record as is");
                raw.push(record);
            }
        }
    }
    (parsed, raw)
}

/// Load/save contract for the whole wellness document.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<WellnessState, StoreError>;
    fn save(&self, state: &WellnessState) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<WellnessState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WellnessState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<WellnessState, StoreError> {
        Ok(self.state.read().clone())
    }

    fn save(&self, state: &WellnessState) -> Result<(), StoreError> {
        *self.state.write() = state.clone();
        Ok(())
    }
}

/// Single pretty-printed JSON file. A missing or empty file is an empty document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<WellnessState, StoreError> {
        if !self.path.exists() {
            return Ok(WellnessState::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(WellnessState::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, state: &WellnessState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(state)?;
        let staging = self.staging_path();
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
