//! File-backed [`LapStore`].
//!
//! The whole store is one JSON document rewritten on every change with the
//! write-to-temp-then-rename pattern, so a crash mid-write leaves the
//! previous document intact.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use openracing_lap_registry::{BestLapTable, DriverUpsert, LapStore, LapUpsert, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LapDocument {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    drivers: Vec<DriverUpsert>,
    #[serde(default)]
    laps: Vec<LapUpsert>,
}

#[derive(Debug, Default)]
struct StoreState {
    drivers: BTreeMap<String, DriverUpsert>,
    laps: BestLapTable,
    /// Memory holds changes the last flush failed to write.
    dirty: bool,
}

impl StoreState {
    fn document(&self) -> LapDocument {
        LapDocument {
            updated_at: Some(Utc::now()),
            drivers: self.drivers.values().cloned().collect(),
            laps: self.laps.rows(),
        }
    }
}

impl From<LapDocument> for StoreState {
    fn from(document: LapDocument) -> Self {
        Self {
            drivers: document
                .drivers
                .into_iter()
                .map(|driver| (driver.persistent_id.clone(), driver))
                .collect(),
            laps: document.laps.into_iter().collect(),
            dirty: false,
        }
    }
}

#[derive(Debug)]
pub struct JsonLapStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonLapStore {
    /// Opens the document at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let state = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let document: LapDocument = serde_json::from_str(&content)?;
                StoreState::from(document)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            drivers = state.drivers.len(),
            best_laps = state.laps.len(),
            "Opened lap store"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn driver(&self, persistent_id: &str) -> Option<DriverUpsert> {
        self.state.lock().drivers.get(persistent_id).cloned()
    }

    /// Every stored best lap, sorted by driver, car and track.
    pub fn best_laps(&self) -> Vec<LapUpsert> {
        self.state.lock().laps.rows()
    }

    fn flush(&self, state: &mut StoreState) -> Result<(), StoreError> {
        let written = serde_json::to_string_pretty(&state.document())
            .map_err(StoreError::from)
            .and_then(|content| write_atomic(&self.path, &content));
        state.dirty = written.is_err();
        written
    }
}

impl LapStore for JsonLapStore {
    fn upsert_driver(&self, driver: &DriverUpsert) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.dirty && state.drivers.get(&driver.persistent_id) == Some(driver) {
            return Ok(());
        }

        state
            .drivers
            .insert(driver.persistent_id.clone(), driver.clone());
        self.flush(&mut state)
    }

    fn upsert_best_lap(&self, lap: &LapUpsert) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let before = state
            .laps
            .get(&lap.persistent_id, &lap.car_model, &lap.track)
            .cloned();

        let new_best = state.laps.upsert(lap);
        let after = state.laps.get(&lap.persistent_id, &lap.car_model, &lap.track);
        if !state.dirty && after == before.as_ref() {
            return Ok(());
        }

        if new_best {
            debug!(
                driver = %lap.persistent_id,
                car = %lap.car_model,
                track = %lap.track,
                lap_ms = lap.lap_time_ms,
                "New stored best lap"
            );
        }
        self.flush(&mut state)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    debug!(path = ?path, "Writing lap store atomically");

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
