//! Assetto Corsa dedicated server plugin protocol.
//!
//! The dedicated server broadcasts session, connection and lap events over
//! UDP to a single registered plugin endpoint and accepts a handful of
//! one- or two-byte control messages back.
//!
//! # Inbound packets
//!
//! | Type | Packet            | Fields |
//! |------|-------------------|--------|
//! | 50   | session begin     | version, 3 session indices, server name, track, track config, session name |
//! | 51   | driver join       | name, id, slot, car model, skin |
//! | 52   | driver leave      | name, id, slot |
//! | 53   | position update   | slot, position, velocity, gear, rpm, spline (discarded) |
//! | 54   | driver info       | slot, connected, model, skin, name, team, id |
//! | 55   | session end       | results file |
//! | 56   | protocol version  | version |
//! | 57   | chat              | slot, message |
//! | 58   | client loaded     | slot |
//! | 73   | lap completed     | slot, lap time (ms, u32), cuts |
//! | 130  | client event      | slot, event type |
//!
//! All integers are little-endian. Strings carry a one-byte length prefix but
//! no encoding tag; see [`text`] for how the encoding is inferred.
//!
//! # Usage
//!
//! ```rust
//! use racing_wheel_acsp_protocol::{InboundMessage, parse_inbound_message};
//!
//! let packet = [73u8, 4, 0x60, 0xEA, 0x00, 0x00, 0];
//! let message = parse_inbound_message(&packet)?;
//! assert!(matches!(message, InboundMessage::LapCompleted(lap) if lap.lap_time_ms == 60_000));
//! # Ok::<(), racing_wheel_acsp_protocol::DecodeError>(())
//! ```

#![deny(static_mut_refs)]

pub mod control;
pub mod error;
pub mod packets;
pub mod reader;
pub mod text;

pub use control::{ControlMessage, MAX_SLOTS, registration_sequence, slot_sweep};
pub use error::DecodeError;
pub use packets::{
    ClientEvent, DriverInfo, DriverJoin, DriverLeave, InboundMessage, LapCompleted, SessionBegin,
    parse_inbound_message,
};
pub use reader::PacketReader;
