//! Slot and identity reconciliation.
//!
//! Records live in an arena keyed by [`RecordId`]. The slot index maps each
//! occupied slot to exactly one record and the identity index maps real
//! (non-synthetic) ids to records; neither holds copies. A record that is
//! referenced by neither index is dropped.
//!
//! Attribution is strictly per slot: a lap only ever lands on the record
//! bound to its slot. An empty slot may re-adopt an orphan, meaning a
//! record that was [`released`](Registry::release) from that same slot and
//! is still reachable by identity. Records are never merged across slots.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::lap::{LapVerdict, improves_best, manual_lap_time};
use crate::record::{DriverRecord, RecordId};
use crate::session::SessionContext;
use crate::store::{DriverUpsert, LapStore, LapUpsert};

/// What a join or driver-info did to its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The slot was empty; a fresh record now occupies it.
    Created,
    /// A different driver held the slot and was evicted.
    Replaced { previous_id: String },
    /// Same driver, same car.
    Updated,
    /// Same driver in a different car; best lap and lap count were reset.
    CarChanged { previous_model: String },
    /// A placeholder learned its real identity and kept its lap stats.
    Upgraded { carried_best_ms: u32 },
    /// Missing name or id.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The departing record as it was when the slot was cleared.
    pub record: DriverRecord,
    /// Result of the closing best-lap write, `None` if none was due.
    pub persisted: Option<bool>,
}

/// A lap applied to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapRecorded {
    pub slot: u8,
    pub persistent_id: String,
    pub lap_time_ms: u32,
    pub valid: bool,
    pub new_best: bool,
    /// Result of the lap write, `None` for invalid laps and placeholders.
    pub persisted: Option<bool>,
    /// The slot had no driver and a placeholder was created; the caller
    /// should ask the server who is in it.
    pub request_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LapOutcome {
    /// Outside the sanity bound. Nothing changed.
    Rejected,
    Recorded(LapRecorded),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossingOutcome {
    /// No driver bound to the slot.
    NoDriver,
    /// Timer started for a new lap.
    Started,
    /// Too short (or too long) to be a lap. The timer was cleared.
    Discarded { elapsed_ms: i64 },
    Completed(LapRecorded),
}

/// Authoritative roster of who is in which slot.
pub struct Registry {
    records: HashMap<RecordId, DriverRecord>,
    slots: BTreeMap<u8, RecordId>,
    identities: HashMap<String, RecordId>,
    next_id: u64,
    session: SessionContext,
    store: Arc<dyn LapStore>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("slots", &self.slots)
            .field("identities", &self.identities.len())
            .field("records", &self.records.len())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(store: Arc<dyn LapStore>) -> Self {
        Self::with_session(store, SessionContext::default())
    }

    pub fn with_session(store: Arc<dyn LapStore>, session: SessionContext) -> Self {
        Self {
            records: HashMap::new(),
            slots: BTreeMap::new(),
            identities: HashMap::new(),
            next_id: 0,
            session,
            store,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Replaces the session context wholesale.
    pub fn set_session(&mut self, session: SessionContext) {
        info!(
            server = %session.server_name,
            track = %session.track,
            layout = %session.track_layout,
            session = %session.session_name,
            "Session context updated"
        );
        self.session = session;
    }

    /// Record bound to `slot`.
    pub fn slot(&self, slot: u8) -> Option<&DriverRecord> {
        self.slots.get(&slot).and_then(|rid| self.records.get(rid))
    }

    pub fn by_identity(&self, persistent_id: &str) -> Option<&DriverRecord> {
        self.identities
            .get(persistent_id)
            .and_then(|rid| self.records.get(rid))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live records, including orphans.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Occupied slots in ascending order.
    pub fn drivers(&self) -> impl Iterator<Item = (u8, &DriverRecord)> + '_ {
        self.slots
            .iter()
            .filter_map(|(slot, rid)| self.records.get(rid).map(|record| (*slot, record)))
    }

    /// Binds `persistent_id` to `slot`, reconciling with whatever held it.
    pub fn join(
        &mut self,
        slot: u8,
        persistent_id: &str,
        name: &str,
        car_model: &str,
        now_ms: i64,
    ) -> JoinOutcome {
        if persistent_id.is_empty() || name.is_empty() {
            debug!(slot, "Ignoring join without name or id");
            return JoinOutcome::Ignored;
        }

        let current = self.slots.get(&slot).copied().and_then(|rid| {
            self.records
                .get(&rid)
                .map(|record| (rid, record.persistent_id.clone(), record.is_synthetic()))
        });

        let (rid, outcome) = match current {
            Some((rid, _, true)) => (
                rid,
                self.upgrade(rid, persistent_id, name, car_model, now_ms),
            ),
            Some((rid, existing, false)) if existing == persistent_id => {
                (rid, self.update(rid, name, car_model))
            }
            Some((rid, existing, false)) => {
                self.evict(slot, rid);
                let record = DriverRecord::new(slot, persistent_id, name, car_model);
                (
                    self.bind_new(slot, record),
                    JoinOutcome::Replaced {
                        previous_id: existing,
                    },
                )
            }
            None => {
                let record = DriverRecord::new(slot, persistent_id, name, car_model);
                (self.bind_new(slot, record), JoinOutcome::Created)
            }
        };

        self.publish_identity(rid);

        if let Some(record) = self.records.get(&rid) {
            if !record.is_synthetic() {
                persist_driver(self.store.as_ref(), record);
            }
            info!(
                slot,
                driver = %record.persistent_id,
                name = %record.display_name,
                car = %record.car_model,
                outcome = ?outcome,
                "Driver joined"
            );
        }

        outcome
    }

    /// Clears `slot`. A real driver with a best lap gets one closing write.
    pub fn leave(&mut self, slot: u8, now_ms: i64) -> Option<LeaveOutcome> {
        let rid = self.slots.remove(&slot)?;
        let record = self.records.get(&rid).cloned();
        self.unpublish(rid);
        self.collect(rid);
        let record = record?;

        let persisted = (record.best_lap_ms > 0 && !record.is_synthetic()).then(|| {
            persist_lap(
                self.store.as_ref(),
                &self.session,
                &record,
                record.best_lap_ms,
                now_ms,
            )
        });

        info!(
            slot,
            driver = %record.persistent_id,
            best_lap_ms = record.best_lap_ms,
            laps = record.lap_count,
            "Driver left"
        );

        Some(LeaveOutcome { record, persisted })
    }

    /// Unbinds `slot` without forgetting the driver. The record stays
    /// reachable by identity and a later lap on the same slot adopts it.
    /// Returns `false` if the slot was already empty.
    pub fn release(&mut self, slot: u8) -> bool {
        let Some(rid) = self.slots.remove(&slot) else {
            return false;
        };
        if let Some(record) = self.records.get_mut(&rid) {
            record.open_lap_start_ms = None;
        }
        self.collect(rid);
        debug!(slot, "Slot released");
        true
    }

    /// Applies a server-reported lap to the record in `slot`.
    pub fn lap_completed(
        &mut self,
        slot: u8,
        lap_time_ms: u32,
        cuts: u8,
        now_ms: i64,
    ) -> LapOutcome {
        let verdict = LapVerdict::assess(lap_time_ms, cuts);
        if verdict == LapVerdict::Rejected {
            debug!(slot, lap_ms = lap_time_ms, "Lap time outside sanity bound");
            return LapOutcome::Rejected;
        }

        let (rid, request_identity) = self.resolve_slot(slot);
        let Some(record) = self.records.get_mut(&rid) else {
            return LapOutcome::Rejected;
        };

        let mut recorded = apply_lap(
            self.store.as_ref(),
            &self.session,
            record,
            lap_time_ms,
            verdict.is_valid(),
            now_ms,
        );
        recorded.request_identity = request_identity;
        LapOutcome::Recorded(recorded)
    }

    /// Start/finish line crossing used when laps are timed locally.
    pub fn line_crossing(&mut self, slot: u8, now_ms: i64) -> CrossingOutcome {
        let Some(rid) = self.slots.get(&slot).copied() else {
            return CrossingOutcome::NoDriver;
        };
        let Some(record) = self.records.get_mut(&rid) else {
            return CrossingOutcome::NoDriver;
        };

        let Some(started_ms) = record.open_lap_start_ms.take() else {
            record.open_lap_start_ms = Some(now_ms);
            debug!(slot, driver = %record.persistent_id, "Lap timer started");
            return CrossingOutcome::Started;
        };

        match manual_lap_time(started_ms, now_ms) {
            Some(lap_time_ms) => CrossingOutcome::Completed(apply_lap(
                self.store.as_ref(),
                &self.session,
                record,
                lap_time_ms,
                true,
                now_ms,
            )),
            None => {
                let elapsed_ms = now_ms.saturating_sub(started_ms);
                debug!(slot, elapsed_ms, "Discarding implausible line-crossing lap");
                CrossingOutcome::Discarded { elapsed_ms }
            }
        }
    }

    /// Record for a lap on `slot`: the bound one, an orphan last bound to
    /// the same slot, or a new placeholder. The flag is set for the latter.
    fn resolve_slot(&mut self, slot: u8) -> (RecordId, bool) {
        if let Some(rid) = self.slots.get(&slot) {
            return (*rid, false);
        }

        // Ids grow monotonically, so the highest is the most recently bound.
        let orphan = self
            .identities
            .values()
            .copied()
            .filter(|rid| self.records.get(rid).is_some_and(|record| record.slot == slot))
            .max();

        if let Some(rid) = orphan {
            self.slots.insert(slot, rid);
            debug!(slot, "Empty slot adopted a released driver");
            return (rid, false);
        }

        info!(slot, "Lap on unknown slot, tracking placeholder");
        (self.bind_new(slot, DriverRecord::placeholder(slot)), true)
    }

    fn upgrade(
        &mut self,
        rid: RecordId,
        persistent_id: &str,
        name: &str,
        car_model: &str,
        now_ms: i64,
    ) -> JoinOutcome {
        let Some(record) = self.records.get_mut(&rid) else {
            return JoinOutcome::Ignored;
        };

        persistent_id.clone_into(&mut record.persistent_id);
        name.clone_into(&mut record.display_name);
        if !car_model.is_empty() {
            car_model.clone_into(&mut record.car_model);
        }

        let carried_best_ms = record.best_lap_ms;
        if carried_best_ms > 0 && !record.is_synthetic() {
            persist_lap(
                self.store.as_ref(),
                &self.session,
                record,
                carried_best_ms,
                now_ms,
            );
        }

        JoinOutcome::Upgraded { carried_best_ms }
    }

    fn update(&mut self, rid: RecordId, name: &str, car_model: &str) -> JoinOutcome {
        let Some(record) = self.records.get_mut(&rid) else {
            return JoinOutcome::Ignored;
        };

        name.clone_into(&mut record.display_name);
        match record.change_car(car_model) {
            Some(previous_model) => JoinOutcome::CarChanged { previous_model },
            None => JoinOutcome::Updated,
        }
    }

    fn bind_new(&mut self, slot: u8, record: DriverRecord) -> RecordId {
        self.forget_orphans(slot);
        let rid = RecordId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.records.insert(rid, record);
        if let Some(previous) = self.slots.insert(slot, rid) {
            self.collect(previous);
        }
        rid
    }

    /// Drops released records last bound to `slot`. Once a new record takes
    /// the slot they can no longer be adopted back by it.
    fn forget_orphans(&mut self, slot: u8) {
        let stale: Vec<(String, RecordId)> = self
            .identities
            .iter()
            .filter(|(_, rid)| {
                !self.slots.values().any(|bound| bound == *rid)
                    && self.records.get(*rid).is_some_and(|record| record.slot == slot)
            })
            .map(|(persistent_id, rid)| (persistent_id.clone(), *rid))
            .collect();

        for (persistent_id, rid) in stale {
            self.identities.remove(&persistent_id);
            self.collect(rid);
            debug!(slot, driver = %persistent_id, "Forgot released driver, slot reused");
        }
    }

    fn evict(&mut self, slot: u8, rid: RecordId) {
        self.slots.remove(&slot);
        self.unpublish(rid);
        self.collect(rid);
    }

    fn publish_identity(&mut self, rid: RecordId) {
        let Some(record) = self.records.get(&rid) else {
            return;
        };
        if record.is_synthetic() {
            return;
        }

        let previous = self.identities.insert(record.persistent_id.clone(), rid);
        if let Some(previous) = previous.filter(|previous| *previous != rid) {
            self.collect(previous);
        }
    }

    /// Drops the identity entry for `rid` if it still points there.
    fn unpublish(&mut self, rid: RecordId) {
        let Some(persistent_id) = self.records.get(&rid).map(|r| r.persistent_id.as_str()) else {
            return;
        };
        if self.identities.get(persistent_id) == Some(&rid) {
            self.identities.remove(persistent_id);
        }
    }

    fn collect(&mut self, rid: RecordId) {
        let referenced = self.slots.values().any(|bound| *bound == rid)
            || self.identities.values().any(|indexed| *indexed == rid);
        if !referenced {
            self.records.remove(&rid);
        }
    }
}

fn apply_lap(
    store: &dyn LapStore,
    session: &SessionContext,
    record: &mut DriverRecord,
    lap_time_ms: u32,
    valid: bool,
    now_ms: i64,
) -> LapRecorded {
    record.lap_count = record.lap_count.saturating_add(1);
    record.last_lap_ms = lap_time_ms;

    let new_best = valid && improves_best(record.best_lap_ms, lap_time_ms);
    if new_best {
        record.best_lap_ms = lap_time_ms;
    }

    let persisted = (valid && !record.is_synthetic())
        .then(|| persist_lap(store, session, record, lap_time_ms, now_ms));

    info!(
        slot = record.slot,
        driver = %record.persistent_id,
        lap_ms = lap_time_ms,
        valid,
        new_best,
        laps = record.lap_count,
        "Lap completed"
    );

    LapRecorded {
        slot: record.slot,
        persistent_id: record.persistent_id.clone(),
        lap_time_ms,
        valid,
        new_best,
        persisted,
        request_identity: false,
    }
}

fn persist_driver(store: &dyn LapStore, record: &DriverRecord) -> bool {
    let upsert = DriverUpsert {
        persistent_id: record.persistent_id.clone(),
        name: record.display_name.clone(),
        car_model: record.car_model.clone(),
    };

    match store.upsert_driver(&upsert) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, driver = %record.persistent_id, "Failed to persist driver");
            false
        }
    }
}

fn persist_lap(
    store: &dyn LapStore,
    session: &SessionContext,
    record: &DriverRecord,
    lap_time_ms: u32,
    now_ms: i64,
) -> bool {
    let upsert = LapUpsert {
        persistent_id: record.persistent_id.clone(),
        car_model: record.car_model.clone(),
        track: session.track.clone(),
        server_name: session.server_name.clone(),
        lap_time_ms,
        valid: true,
        timestamp_ms: now_ms,
    };

    match store.upsert_best_lap(&upsert) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                error = %e,
                driver = %record.persistent_id,
                lap_ms = lap_time_ms,
                "Failed to persist lap"
            );
            false
        }
    }
}
