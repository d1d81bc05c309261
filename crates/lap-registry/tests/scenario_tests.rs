//! End-to-end roster scenarios driven by raw server datagrams.

use std::sync::Arc;

use openracing_lap_registry::{
    LapStore, MemoryLapStore, PacketDispatcher, Registry, SessionContext, StoreCall, TimingMode,
};
use racing_wheel_acsp_protocol::ControlMessage;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const NOW: i64 = 1_760_000_000_000;

fn setup() -> (Arc<MemoryLapStore>, PacketDispatcher) {
    let store = Arc::new(MemoryLapStore::new());
    let registry = Registry::with_session(
        Arc::clone(&store) as Arc<dyn LapStore>,
        SessionContext::new("Sunday Cup", "imola", ""),
    );
    (store, PacketDispatcher::new(registry, TimingMode::ServerLaps))
}

fn push_str(packet: &mut Vec<u8>, value: &str) {
    packet.push(u8::try_from(value.len()).unwrap_or(u8::MAX));
    packet.extend_from_slice(value.as_bytes());
}

fn join(slot: u8, id: &str, name: &str, model: &str) -> Vec<u8> {
    let mut packet = vec![51];
    push_str(&mut packet, name);
    push_str(&mut packet, id);
    packet.push(slot);
    push_str(&mut packet, model);
    push_str(&mut packet, "default");
    packet
}

fn leave(slot: u8, id: &str, name: &str) -> Vec<u8> {
    let mut packet = vec![52];
    push_str(&mut packet, name);
    push_str(&mut packet, id);
    packet.push(slot);
    packet
}

fn lap(slot: u8, lap_time_ms: u32, cuts: u8) -> Vec<u8> {
    let mut packet = vec![73, slot];
    packet.extend_from_slice(&lap_time_ms.to_le_bytes());
    packet.push(cuts);
    packet
}

fn utf16_join(slot: u8, id: &str, name: &str, model: &str) -> Vec<u8> {
    let mut packet = vec![51];
    let units: Vec<u16> = name.encode_utf16().collect();
    packet.push(u8::try_from(units.len()).unwrap_or(u8::MAX));
    for unit in units {
        packet.extend_from_slice(&unit.to_le_bytes());
    }
    push_str(&mut packet, id);
    packet.push(slot);
    push_str(&mut packet, model);
    push_str(&mut packet, "default");
    packet
}

#[test]
fn lap_from_unknown_slot_tracks_placeholder_without_persisting() -> TestResult {
    let (store, mut dispatcher) = setup();

    let dispatch = dispatcher.handle(&[73, 4, 0x60, 0xEA, 0x00, 0x00, 0], NOW);
    assert_eq!(dispatch.outbound, vec![ControlMessage::RequestSlotInfo(4)]);

    let record = dispatcher.registry().slot(4).ok_or("slot 4 empty")?;
    assert_eq!(record.persistent_id, "unknown_4");
    assert_eq!(record.lap_count, 1);
    assert_eq!(record.best_lap_ms, 60_000);
    assert!(store.calls().is_empty());
    Ok(())
}

#[test]
fn car_change_on_rejoin_resets_stats() -> TestResult {
    let (_, mut dispatcher) = setup();
    dispatcher.handle(&join(4, "S1", "Ana", "car_a"), NOW);
    dispatcher.handle(&lap(4, 90_000, 0), NOW);
    dispatcher.handle(&join(4, "S1", "Ana", "car_b"), NOW);

    let record = dispatcher.registry().slot(4).ok_or("slot 4 empty")?;
    assert_eq!(record.lap_count, 0);
    assert_eq!(record.best_lap_ms, 0);
    assert_eq!(record.car_model, "car_b");
    Ok(())
}

#[test]
fn join_lap_leave_writes_lap_then_closing_best() -> TestResult {
    let (store, mut dispatcher) = setup();
    dispatcher.handle(&join(4, "S1", "Ana", "car_a"), NOW);
    dispatcher.handle(&lap(4, 90_000, 0), NOW + 90_000);
    dispatcher.handle(&leave(4, "S1", "Ana"), NOW + 120_000);

    let laps = store.lap_calls();
    assert_eq!(laps.len(), 2);
    for upsert in &laps {
        assert_eq!(upsert.persistent_id, "S1");
        assert_eq!(upsert.car_model, "car_a");
        assert_eq!(upsert.track, "imola");
        assert_eq!(upsert.server_name, "Sunday Cup");
        assert_eq!(upsert.lap_time_ms, 90_000);
        assert!(upsert.valid);
    }

    assert!(matches!(store.calls().first(), Some(StoreCall::Driver(_))));
    assert!(dispatcher.registry().is_empty());
    Ok(())
}

#[test]
fn invalid_laps_are_counted_but_never_best_or_stored() -> TestResult {
    let (store, mut dispatcher) = setup();
    dispatcher.handle(&join(1, "S1", "Ana", "car_a"), NOW);
    dispatcher.handle(&lap(1, 95_000, 0), NOW);
    dispatcher.handle(&lap(1, 70_000, 3), NOW);

    let record = dispatcher.registry().slot(1).ok_or("slot 1 empty")?;
    assert_eq!(record.best_lap_ms, 95_000);
    assert_eq!(record.last_lap_ms, 70_000);
    assert_eq!(record.lap_count, 2);
    assert_eq!(store.lap_calls().len(), 1);
    Ok(())
}

#[test]
fn out_of_bound_lap_packet_changes_nothing() -> TestResult {
    let (store, mut dispatcher) = setup();
    dispatcher.handle(&join(1, "S1", "Ana", "car_a"), NOW);
    let before = dispatcher.registry().slot(1).cloned();

    dispatcher.handle(&lap(1, 0, 0), NOW);
    dispatcher.handle(&lap(1, 36_000_001, 0), NOW);

    assert_eq!(dispatcher.registry().slot(1).cloned(), before);
    assert!(store.lap_calls().is_empty());
    Ok(())
}

#[test]
fn utf16_name_joins_like_ascii() -> TestResult {
    let (store, mut dispatcher) = setup();
    dispatcher.handle(&utf16_join(6, "S6", "Pérez", "car_a"), NOW);

    let record = dispatcher.registry().slot(6).ok_or("slot 6 empty")?;
    assert_eq!(record.display_name, "Pérez");
    assert_eq!(record.persistent_id, "S6");
    assert_eq!(record.car_model, "car_a");
    assert_eq!(store.driver("S6").map(|driver| driver.name), Some("Pérez".to_string()));
    Ok(())
}

#[test]
fn truncated_join_leaves_registry_untouched() {
    let (store, mut dispatcher) = setup();
    let packet = join(4, "S1", "Ana", "car_a");
    let cut = packet.get(..8).map(<[u8]>::to_vec).unwrap_or_default();

    assert_eq!(dispatcher.handle(&cut, NOW).kind, "malformed");
    assert!(dispatcher.registry().is_empty());
    assert!(store.calls().is_empty());
}

#[test]
fn slot_reuse_by_another_driver_starts_fresh() -> TestResult {
    let (store, mut dispatcher) = setup();
    dispatcher.handle(&join(3, "S1", "Ana", "car_a"), NOW);
    dispatcher.handle(&lap(3, 88_000, 0), NOW);
    dispatcher.handle(&join(3, "S2", "Ben", "car_a"), NOW);
    dispatcher.handle(&lap(3, 91_000, 0), NOW);

    let record = dispatcher.registry().slot(3).ok_or("slot 3 empty")?;
    assert_eq!(record.persistent_id, "S2");
    assert_eq!(record.best_lap_ms, 91_000);
    assert!(dispatcher.registry().by_identity("S1").is_none());

    let drivers: Vec<String> = store
        .lap_calls()
        .into_iter()
        .map(|upsert| upsert.persistent_id)
        .collect();
    assert_eq!(drivers, vec!["S1", "S2"]);
    Ok(())
}
