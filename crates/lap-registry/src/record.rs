//! Driver records and synthetic identities.

use serde::Serialize;

/// Prefix marking a placeholder identity created before the real one is
/// known. Such ids never reach the identity index or the store.
pub const SYNTHETIC_ID_PREFIX: &str = "unknown_";

/// Placeholder identity for a slot.
pub fn synthetic_id(slot: u8) -> String {
    format!("{SYNTHETIC_ID_PREFIX}{slot}")
}

pub fn is_synthetic_id(persistent_id: &str) -> bool {
    persistent_id.starts_with(SYNTHETIC_ID_PREFIX)
}

/// Opaque handle to a record owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u64);

/// Identity and in-memory stats for one tracked driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverRecord {
    pub persistent_id: String,
    pub display_name: String,
    pub car_model: String,
    /// Best valid lap in milliseconds; 0 when unset.
    pub best_lap_ms: u32,
    pub last_lap_ms: u32,
    pub lap_count: u32,
    /// Start of the lap being timed by line crossings, if any.
    pub open_lap_start_ms: Option<i64>,
    /// Slot this record was last bound to.
    pub slot: u8,
}

impl DriverRecord {
    pub fn new(
        slot: u8,
        persistent_id: impl Into<String>,
        display_name: impl Into<String>,
        car_model: impl Into<String>,
    ) -> Self {
        Self {
            persistent_id: persistent_id.into(),
            display_name: display_name.into(),
            car_model: car_model.into(),
            best_lap_ms: 0,
            last_lap_ms: 0,
            lap_count: 0,
            open_lap_start_ms: None,
            slot,
        }
    }

    /// Record for a slot that completed a lap before its identity arrived.
    pub fn placeholder(slot: u8) -> Self {
        Self::new(slot, synthetic_id(slot), format!("Driver_CarID_{slot}"), "")
    }

    pub fn is_synthetic(&self) -> bool {
        is_synthetic_id(&self.persistent_id)
    }

    fn reset_lap_stats(&mut self) {
        self.best_lap_ms = 0;
        self.lap_count = 0;
    }

    /// Applies a reported car model. An empty model means "not reported"
    /// and keeps the current one. A different model starts a fresh best-time
    /// basis; the previous model is returned in that case.
    pub(crate) fn change_car(&mut self, car_model: &str) -> Option<String> {
        if car_model.is_empty() || self.car_model == car_model {
            return None;
        }

        let previous = std::mem::replace(&mut self.car_model, car_model.to_owned());
        self.reset_lap_stats();
        Some(previous)
    }
}
