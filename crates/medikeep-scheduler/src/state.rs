use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};
use crate::types::ScheduleState;

/// Storage seam for [`ScheduleState`]. Single-writer, last-write-wins, no
/// transactional guarantees.
pub trait StateStore: Send + Sync {
    /// Load persisted state. `None` means absent or unusable; the caller
    /// falls back to defaults.
    fn load(&self) -> Option<ScheduleState>;

    /// Persist the full state. Best-effort durability only.
    fn save(&self, state: &ScheduleState) -> Result<()>;
}

/// JSON file store, the production backing.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Option<ScheduleState> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no schedule state file, starting fresh");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), "schedule state unreadable, using defaults: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), "corrupt schedule state, using defaults: {e}");
                None
            }
        }
    }

    fn save(&self, state: &ScheduleState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::Store(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(state).map_err(|e| SchedulerError::Store(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| SchedulerError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_state() -> ScheduleState {
        ScheduleState {
            enabled: true,
            fire_time: "23:00".parse().unwrap(),
            timezone: "+05:30".parse().unwrap(),
            last_run_at: Some(Utc.with_ymd_and_hms(2026, 8, 22, 17, 30, 0).unwrap()),
            next_run_at: Utc.with_ymd_and_hms(2026, 8, 23, 17, 30, 0).unwrap(),
        }
    }

    #[test]
    fn round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("schedule.json"));
        let state = sample_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn absent_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("schedule.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "{ this is not json").unwrap();
        let store = FileStateStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn wrong_shape_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, r#"{"enabled": "yes", "time": 2300}"#).unwrap();
        let store = FileStateStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn save_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("schedule.json");
        let store = FileStateStore::new(&path);
        store.save(&sample_state()).unwrap();
        assert!(path.exists());
    }
}
