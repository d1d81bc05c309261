//! Routes decoded packets into the registry.

use racing_wheel_acsp_protocol::{
    ControlMessage, DriverInfo, InboundMessage, LapCompleted, parse_inbound_message,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::lap::{LINE_CROSSING_EVENTS, TimingMode};
use crate::registry::{LapOutcome, Registry};
use crate::session::SessionContext;

/// Result of handling one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Packet kind, or `"malformed"` when decoding failed.
    pub kind: &'static str,
    /// Reactive control messages for the current peer.
    pub outbound: Vec<ControlMessage>,
}

impl Dispatch {
    fn quiet(kind: &'static str) -> Self {
        Self {
            kind,
            outbound: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub datagrams: u64,
    pub decode_failures: u64,
    pub unknown_types: u64,
    pub identity_requests: u64,
}

/// Single consumer of the inbound packet stream.
#[derive(Debug)]
pub struct PacketDispatcher {
    registry: Registry,
    timing_mode: TimingMode,
    stats: DispatchStats,
}

impl PacketDispatcher {
    pub fn new(registry: Registry, timing_mode: TimingMode) -> Self {
        Self {
            registry,
            timing_mode,
            stats: DispatchStats::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timing_mode(&self) -> TimingMode {
        self.timing_mode
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Decodes and applies one datagram. Malformed input is counted and
    /// dropped without touching the registry.
    pub fn handle(&mut self, datagram: &[u8], now_ms: i64) -> Dispatch {
        self.stats.datagrams = self.stats.datagrams.saturating_add(1);

        let message = match parse_inbound_message(datagram) {
            Ok(message) => message,
            Err(e) => {
                self.stats.decode_failures = self.stats.decode_failures.saturating_add(1);
                debug!(error = %e, len = datagram.len(), "Dropping undecodable datagram");
                return Dispatch::quiet("malformed");
            }
        };

        let kind = message.kind();
        let outbound = self.apply(message, now_ms);
        self.stats.identity_requests = self
            .stats
            .identity_requests
            .saturating_add(u64::try_from(outbound.len()).unwrap_or(u64::MAX));

        Dispatch { kind, outbound }
    }

    fn apply(&mut self, message: InboundMessage, now_ms: i64) -> Vec<ControlMessage> {
        match message {
            InboundMessage::SessionBegin(begin) => {
                self.registry.set_session(SessionContext::from(&begin));
            }
            InboundMessage::DriverJoin(join) => {
                self.registry.join(
                    join.slot,
                    &join.persistent_id,
                    &join.name,
                    &join.car_model,
                    now_ms,
                );
            }
            InboundMessage::DriverLeave(leave) => {
                match self.registry.leave(leave.slot, now_ms) {
                    Some(left) if left.record.persistent_id != leave.persistent_id => {
                        debug!(
                            slot = leave.slot,
                            announced = %leave.persistent_id,
                            tracked = %left.record.persistent_id,
                            "Leave named a different driver than the slot held"
                        );
                    }
                    Some(_) => {}
                    None => debug!(slot = leave.slot, "Leave for empty slot"),
                }
            }
            InboundMessage::PositionUpdate { .. } => {}
            InboundMessage::DriverInfo(driver) => self.apply_driver_info(&driver, now_ms),
            InboundMessage::SessionEnd { results_file } => {
                info!(results = %results_file, "Session ended");
            }
            InboundMessage::ProtocolVersion(version) => {
                info!(version, "Server protocol version");
            }
            InboundMessage::Chat { slot, message } => debug!(slot, %message, "Chat message"),
            InboundMessage::ClientLoaded { slot } => debug!(slot, "Client loaded"),
            InboundMessage::LapCompleted(lap) => return self.apply_lap(lap, now_ms),
            InboundMessage::ClientEvent(event) => {
                if self.timing_mode == TimingMode::LineCrossing
                    && LINE_CROSSING_EVENTS.contains(&event.event_type)
                {
                    let outcome = self.registry.line_crossing(event.slot, now_ms);
                    debug!(slot = event.slot, outcome = ?outcome, "Line crossing");
                }
            }
            InboundMessage::Unknown(packet_type) => {
                self.stats.unknown_types = self.stats.unknown_types.saturating_add(1);
                debug!(packet_type, "Ignoring unknown packet type");
            }
        }

        Vec::new()
    }

    fn apply_driver_info(&mut self, driver: &DriverInfo, now_ms: i64) {
        if driver.connected {
            self.registry.join(
                driver.slot,
                &driver.persistent_id,
                &driver.name,
                &driver.car_model,
                now_ms,
            );
        } else if self.registry.release(driver.slot) {
            info!(slot = driver.slot, "Slot reported disconnected, driver released");
        }
    }

    fn apply_lap(&mut self, lap: LapCompleted, now_ms: i64) -> Vec<ControlMessage> {
        if self.timing_mode == TimingMode::LineCrossing {
            debug!(slot = lap.slot, "Server lap ignored, timing by line crossings");
            return Vec::new();
        }

        match self
            .registry
            .lap_completed(lap.slot, lap.lap_time_ms, lap.cuts, now_ms)
        {
            LapOutcome::Recorded(recorded) if recorded.request_identity => {
                vec![ControlMessage::RequestSlotInfo(lap.slot)]
            }
            LapOutcome::Recorded(_) | LapOutcome::Rejected => Vec::new(),
        }
    }
}
