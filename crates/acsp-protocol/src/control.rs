//! Outbound control messages sent to the dedicated server.

/// Number of slots swept with [`ControlMessage::RequestSlotInfo`] at
/// registration.
pub const MAX_SLOTS: u8 = 32;

const OP_HANDSHAKE: u8 = 0;
const OP_REQUEST_SESSION_INFO: u8 = 59;
const OP_SUBSCRIBE_POSITION_UPDATES: u8 = 200;
const OP_CAR_INFO: u8 = 201;

/// A single-purpose datagram for the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Handshake,
    SubscribePositionUpdates,
    SubscribeEvents,
    RequestSessionInfo,
    RequestSlotInfo(u8),
}

impl ControlMessage {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Handshake => vec![OP_HANDSHAKE],
            Self::SubscribePositionUpdates => vec![OP_SUBSCRIBE_POSITION_UPDATES],
            // The server treats a bare car-info opcode as an event subscription.
            Self::SubscribeEvents => vec![OP_CAR_INFO],
            Self::RequestSessionInfo => vec![OP_REQUEST_SESSION_INFO],
            Self::RequestSlotInfo(slot) => vec![OP_CAR_INFO, slot],
        }
    }
}

/// Fixed messages sent once per newly observed server address, before the
/// slot sweep.
pub fn registration_sequence() -> [ControlMessage; 4] {
    [
        ControlMessage::Handshake,
        ControlMessage::SubscribePositionUpdates,
        ControlMessage::SubscribeEvents,
        ControlMessage::RequestSessionInfo,
    ]
}

/// Per-slot identity requests for every possible slot.
pub fn slot_sweep() -> impl Iterator<Item = ControlMessage> {
    (0..MAX_SLOTS).map(ControlMessage::RequestSlotInfo)
}
