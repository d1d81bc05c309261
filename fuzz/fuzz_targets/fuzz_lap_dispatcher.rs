//! Fuzzes the dispatcher with a stream of datagrams.
//!
//! The input is split on `0xA5` into separate datagrams so one run can walk
//! the registry through joins, laps, leaves and slot reuse.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_lap_dispatcher
#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use openracing_lap_registry::{LapStore, MemoryLapStore, PacketDispatcher, Registry, TimingMode};

fuzz_target!(|data: &[u8]| {
    let mode = if data.first().is_some_and(|b| b & 1 == 1) {
        TimingMode::LineCrossing
    } else {
        TimingMode::ServerLaps
    };
    let store = Arc::new(MemoryLapStore::new());
    let registry = Registry::new(Arc::clone(&store) as Arc<dyn LapStore>);
    let mut dispatcher = PacketDispatcher::new(registry, mode);

    let mut now_ms = 0i64;
    for datagram in data.split(|b| *b == 0xA5) {
        now_ms = now_ms.saturating_add(12_345);
        let _ = dispatcher.handle(datagram, now_ms);
    }

    for (_, record) in dispatcher.registry().drivers() {
        assert!(record.best_lap_ms <= openracing_lap_registry::MAX_LAP_TIME_MS);
        assert!(record.best_lap_ms == 0 || record.lap_count > 0);
    }
});
