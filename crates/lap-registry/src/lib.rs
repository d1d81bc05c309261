//! Driver roster and lap tracking for dedicated server plugin events.
//!
//! [`Registry`] keeps the authoritative "who is in which slot" view and
//! turns completed laps into best-lap writes on a [`LapStore`].
//! [`PacketDispatcher`] feeds it from raw datagrams.
//!
//! ```rust
//! use std::sync::Arc;
//! use openracing_lap_registry::{
//!     LapStore, MemoryLapStore, PacketDispatcher, Registry, TimingMode,
//! };
//!
//! let store = Arc::new(MemoryLapStore::new());
//! let registry = Registry::new(Arc::clone(&store) as Arc<dyn LapStore>);
//! let mut dispatcher = PacketDispatcher::new(registry, TimingMode::ServerLaps);
//!
//! let dispatch = dispatcher.handle(&[73, 4, 0x60, 0xEA, 0x00, 0x00, 0], 0);
//! assert_eq!(dispatch.outbound.len(), 1);
//! assert_eq!(
//!     dispatcher.registry().slot(4).map(|driver| driver.best_lap_ms),
//!     Some(60_000)
//! );
//! assert!(store.calls().is_empty());
//! ```

#![deny(static_mut_refs)]

pub mod dispatch;
pub mod lap;
pub mod record;
pub mod registry;
pub mod session;
pub mod store;

pub use dispatch::{Dispatch, DispatchStats, PacketDispatcher};
pub use lap::{LapVerdict, MAX_LAP_TIME_MS, MIN_MANUAL_LAP_MS, TimingMode};
pub use record::{DriverRecord, RecordId, is_synthetic_id, synthetic_id};
pub use registry::{
    CrossingOutcome, JoinOutcome, LapOutcome, LapRecorded, LeaveOutcome, Registry,
};
pub use session::SessionContext;
pub use store::{
    BestLapTable, DriverUpsert, LapStore, LapUpsert, MemoryLapStore, StoreCall, StoreError,
};
