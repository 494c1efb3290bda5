//! Persistent client markers.
//!
//! Three small facts survive restarts: whether a first update ever
//! succeeded, the date a forced cycle last ran (the suppression record),
//! and the last artifact applied successfully. The orchestrator loads them
//! into a [`CycleState`] and writes back only what changed.

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::error::Result;
use crate::io;
use crate::paths;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleState {
    pub first_run_done: bool,
    pub last_forced_on: Option<NaiveDate>,
    pub last_applied: Option<String>,
}

/// Read/write port for [`CycleState`].
pub trait MarkerStore {
    fn load(&self) -> Result<CycleState>;
    fn mark_first_run_done(&self) -> Result<()>;
    fn record_forced_on(&self, day: NaiveDate) -> Result<()>;
    fn record_applied(&self, artifact: &str) -> Result<()>;
}

/// Marker files in the agent's state directory.
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MarkerStore for FileMarkerStore {
    fn load(&self) -> Result<CycleState> {
        let first_run_done = paths::first_run_flag(&self.dir).exists();
        // An unparseable date is treated as "never", which at worst allows
        // one extra forced cycle.
        let last_forced_on = io::read_trimmed(&paths::last_force_flag(&self.dir))?
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok());
        let last_applied =
            io::read_trimmed(&paths::applied_flag(&self.dir))?.filter(|s| !s.is_empty());
        Ok(CycleState {
            first_run_done,
            last_forced_on,
            last_applied,
        })
    }

    fn mark_first_run_done(&self) -> Result<()> {
        io::atomic_write(&paths::first_run_flag(&self.dir), b"done")
    }

    fn record_forced_on(&self, day: NaiveDate) -> Result<()> {
        let text = day.format(DATE_FORMAT).to_string();
        io::atomic_write(&paths::last_force_flag(&self.dir), text.as_bytes())
    }

    fn record_applied(&self, artifact: &str) -> Result<()> {
        io::atomic_write(&paths::applied_flag(&self.dir), artifact.as_bytes())
    }
}
