//! Persistence collaborator contract.
//!
//! The registry hands finished results to a [`LapStore`]. Calls are
//! synchronous and happen on the packet loop; a failing store is logged by
//! the caller and never retried, and in-memory state is never rolled back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Driver identity write. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverUpsert {
    pub persistent_id: String,
    pub name: String,
    pub car_model: String,
}

/// Lap result write, kept only if it is the fastest for its
/// `(persistent_id, car_model, track)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapUpsert {
    pub persistent_id: String,
    pub car_model: String,
    pub track: String,
    pub server_name: String,
    pub lap_time_ms: u32,
    pub valid: bool,
    pub timestamp_ms: i64,
}

impl LapUpsert {
    fn key(&self) -> LapKey {
        (
            self.persistent_id.clone(),
            self.car_model.clone(),
            self.track.clone(),
        )
    }
}

type LapKey = (String, String, String);

pub trait LapStore: Send + Sync {
    /// Idempotent, last-write-wins driver upsert.
    fn upsert_driver(&self, driver: &DriverUpsert) -> Result<(), StoreError>;

    /// Keeps the minimum lap time per driver, car and track.
    fn upsert_best_lap(&self, lap: &LapUpsert) -> Result<(), StoreError>;
}

/// Best lap per `(persistent_id, car_model, track)` with the store's merge
/// rule: lap time, validity, timestamp and server name all come from the
/// write that set the current minimum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestLapTable {
    rows: HashMap<LapKey, LapUpsert>,
}

impl BestLapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one write. Returns `true` when it set a new minimum.
    pub fn upsert(&mut self, lap: &LapUpsert) -> bool {
        match self.rows.get_mut(&lap.key()) {
            Some(existing) => {
                if lap.lap_time_ms < existing.lap_time_ms {
                    existing.server_name.clone_from(&lap.server_name);
                    existing.lap_time_ms = lap.lap_time_ms;
                    existing.valid = lap.valid;
                    existing.timestamp_ms = lap.timestamp_ms;
                    true
                } else {
                    false
                }
            }
            None => {
                self.rows.insert(lap.key(), lap.clone());
                true
            }
        }
    }

    pub fn get(&self, persistent_id: &str, car_model: &str, track: &str) -> Option<&LapUpsert> {
        self.rows.get(&(
            persistent_id.to_owned(),
            car_model.to_owned(),
            track.to_owned(),
        ))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by driver, car and track.
    pub fn rows(&self) -> Vec<LapUpsert> {
        let mut rows: Vec<LapUpsert> = self.rows.values().cloned().collect();
        rows.sort_by(|a, b| a.key().cmp(&b.key()));
        rows
    }
}

impl FromIterator<LapUpsert> for BestLapTable {
    fn from_iter<I: IntoIterator<Item = LapUpsert>>(iter: I) -> Self {
        let mut table = Self::new();
        for lap in iter {
            table.upsert(&lap);
        }
        table
    }
}

/// A call received by [`MemoryLapStore`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Driver(DriverUpsert),
    Lap(LapUpsert),
}

#[derive(Debug, Default)]
struct MemoryState {
    drivers: HashMap<String, DriverUpsert>,
    laps: BestLapTable,
    journal: Vec<StoreCall>,
}

/// In-process store that also journals every call.
#[derive(Debug, Default)]
pub struct MemoryLapStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryLapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`].
    /// Failed writes are still journaled.
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().journal.clone()
    }

    pub fn lap_calls(&self) -> Vec<LapUpsert> {
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|call| match call {
                StoreCall::Lap(lap) => Some(lap.clone()),
                StoreCall::Driver(_) => None,
            })
            .collect()
    }

    pub fn driver(&self, persistent_id: &str) -> Option<DriverUpsert> {
        self.state.lock().drivers.get(persistent_id).cloned()
    }

    pub fn best_lap(&self, persistent_id: &str, car_model: &str, track: &str) -> Option<LapUpsert> {
        self.state
            .lock()
            .laps
            .get(persistent_id, car_model, track)
            .cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }
}

impl LapStore for MemoryLapStore {
    fn upsert_driver(&self, driver: &DriverUpsert) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.journal.push(StoreCall::Driver(driver.clone()));
        self.check_available()?;
        state
            .drivers
            .insert(driver.persistent_id.clone(), driver.clone());
        Ok(())
    }

    fn upsert_best_lap(&self, lap: &LapUpsert) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.journal.push(StoreCall::Lap(lap.clone()));
        self.check_available()?;
        state.laps.upsert(lap);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn lap(lap_time_ms: u32, server_name: &str, timestamp_ms: i64) -> LapUpsert {
        LapUpsert {
            persistent_id: "S1".to_string(),
            car_model: "car_a".to_string(),
            track: "imola".to_string(),
            server_name: server_name.to_string(),
            lap_time_ms,
            valid: true,
            timestamp_ms,
        }
    }

    #[test]
    fn table_keeps_minimum_with_its_timestamp() -> TestResult {
        let mut table = BestLapTable::new();
        assert!(table.upsert(&lap(92_000, "A", 1)));
        assert!(table.upsert(&lap(90_000, "A", 2)));
        assert!(!table.upsert(&lap(91_000, "B", 3)));
        assert!(!table.upsert(&lap(90_000, "C", 4)));

        let row = table.get("S1", "car_a", "imola").ok_or("missing row")?;
        assert_eq!(row.lap_time_ms, 90_000);
        assert_eq!(row.timestamp_ms, 2);
        assert_eq!(row.server_name, "A");
        assert_eq!(table.len(), 1);
        Ok(())
    }

    #[test]
    fn table_separates_cars_and_tracks() {
        let mut other_car = lap(95_000, "A", 1);
        other_car.car_model = "car_b".to_string();
        let mut other_track = lap(99_000, "A", 1);
        other_track.track = "monza".to_string();

        let table: BestLapTable = [lap(90_000, "A", 1), other_car, other_track]
            .into_iter()
            .collect();
        assert_eq!(table.len(), 3);
        let tracks: Vec<String> = table.rows().into_iter().map(|row| row.track).collect();
        assert_eq!(tracks, vec!["imola", "monza", "imola"]);
    }

    #[test]
    fn memory_store_journals_failed_writes() -> TestResult {
        let store = MemoryLapStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.upsert_best_lap(&lap(90_000, "A", 1)),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.lap_calls().len(), 1);
        assert_eq!(store.best_lap("S1", "car_a", "imola"), None);

        store.set_failing(false);
        store.upsert_best_lap(&lap(90_000, "A", 1))?;
        assert!(store.best_lap("S1", "car_a", "imola").is_some());
        Ok(())
    }

    #[test]
    fn memory_store_driver_last_write_wins() -> TestResult {
        let store = MemoryLapStore::new();
        let mut driver = DriverUpsert {
            persistent_id: "S1".to_string(),
            name: "Ana".to_string(),
            car_model: "car_a".to_string(),
        };
        store.upsert_driver(&driver)?;
        driver.name = "Ana B".to_string();
        store.upsert_driver(&driver)?;
        assert_eq!(store.driver("S1").map(|d| d.name), Some("Ana B".to_string()));
        assert_eq!(store.calls().len(), 2);
        Ok(())
    }
}
