//! Inbound packet model and parser.
//!
//! Every handler reads exactly the fields of its packet. A fixed-width
//! shortfall aborts the whole packet with [`DecodeError`]; trailing bytes
//! past the fields we need are ignored.

use crate::error::DecodeError;
use crate::reader::PacketReader;

pub const MSG_NEW_SESSION: u8 = 50;
pub const MSG_NEW_CONNECTION: u8 = 51;
pub const MSG_CONNECTION_CLOSED: u8 = 52;
pub const MSG_CAR_UPDATE: u8 = 53;
pub const MSG_CAR_INFO: u8 = 54;
pub const MSG_END_SESSION: u8 = 55;
pub const MSG_VERSION: u8 = 56;
pub const MSG_CHAT: u8 = 57;
pub const MSG_CLIENT_LOADED: u8 = 58;
pub const MSG_LAP_COMPLETED: u8 = 73;
pub const MSG_CLIENT_EVENT: u8 = 130;

/// Decoded server packet.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SessionBegin(SessionBegin),
    DriverJoin(DriverJoin),
    DriverLeave(DriverLeave),
    /// Realtime position update. The payload is validated and dropped.
    PositionUpdate { slot: u8 },
    DriverInfo(DriverInfo),
    SessionEnd { results_file: String },
    ProtocolVersion(u8),
    Chat { slot: u8, message: String },
    ClientLoaded { slot: u8 },
    LapCompleted(LapCompleted),
    ClientEvent(ClientEvent),
    Unknown(u8),
}

impl InboundMessage {
    /// Short stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionBegin(_) => "session_begin",
            Self::DriverJoin(_) => "driver_join",
            Self::DriverLeave(_) => "driver_leave",
            Self::PositionUpdate { .. } => "position_update",
            Self::DriverInfo(_) => "driver_info",
            Self::SessionEnd { .. } => "session_end",
            Self::ProtocolVersion(_) => "protocol_version",
            Self::Chat { .. } => "chat",
            Self::ClientLoaded { .. } => "client_loaded",
            Self::LapCompleted(_) => "lap_completed",
            Self::ClientEvent(_) => "client_event",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBegin {
    pub version: u8,
    pub session_index: u8,
    pub current_session_index: u8,
    pub session_count: u8,
    pub server_name: String,
    pub track: String,
    pub track_config: String,
    pub session_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverJoin {
    pub name: String,
    pub persistent_id: String,
    pub slot: u8,
    pub car_model: String,
    pub car_skin: String,
}

/// Disconnect notice. This deployment's server sends name, id and slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverLeave {
    pub name: String,
    pub persistent_id: String,
    pub slot: u8,
}

/// Response to a per-slot info request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub slot: u8,
    pub connected: bool,
    pub car_model: String,
    pub car_skin: String,
    pub name: String,
    pub team: String,
    pub persistent_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapCompleted {
    pub slot: u8,
    pub lap_time_ms: u32,
    pub cuts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEvent {
    pub slot: u8,
    pub event_type: u8,
}

/// Parses one datagram. Unknown packet types are returned as
/// [`InboundMessage::Unknown`] rather than an error.
pub fn parse_inbound_message(data: &[u8]) -> Result<InboundMessage, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut reader = PacketReader::new(data);
    let message_type = reader.read_u8()?;

    let message = match message_type {
        MSG_NEW_SESSION => InboundMessage::SessionBegin(parse_session_begin(&mut reader)?),
        MSG_NEW_CONNECTION => InboundMessage::DriverJoin(parse_driver_join(&mut reader)?),
        MSG_CONNECTION_CLOSED => InboundMessage::DriverLeave(parse_driver_leave(&mut reader)?),
        MSG_CAR_UPDATE => InboundMessage::PositionUpdate {
            slot: parse_car_update(&mut reader)?,
        },
        MSG_CAR_INFO => InboundMessage::DriverInfo(parse_driver_info(&mut reader)?),
        MSG_END_SESSION => InboundMessage::SessionEnd {
            results_file: reader.read_string(),
        },
        MSG_VERSION => InboundMessage::ProtocolVersion(reader.read_u8()?),
        MSG_CHAT => InboundMessage::Chat {
            slot: reader.read_u8()?,
            message: reader.read_string(),
        },
        MSG_CLIENT_LOADED => InboundMessage::ClientLoaded {
            slot: reader.read_u8()?,
        },
        MSG_LAP_COMPLETED => InboundMessage::LapCompleted(parse_lap_completed(&mut reader)?),
        MSG_CLIENT_EVENT => InboundMessage::ClientEvent(parse_client_event(&mut reader)?),
        other => InboundMessage::Unknown(other),
    };

    Ok(message)
}

fn parse_session_begin(reader: &mut PacketReader<'_>) -> Result<SessionBegin, DecodeError> {
    Ok(SessionBegin {
        version: reader.read_u8()?,
        session_index: reader.read_u8()?,
        current_session_index: reader.read_u8()?,
        session_count: reader.read_u8()?,
        server_name: reader.read_string(),
        track: reader.read_string(),
        track_config: reader.read_string(),
        session_name: reader.read_string(),
    })
}

fn parse_driver_join(reader: &mut PacketReader<'_>) -> Result<DriverJoin, DecodeError> {
    let name = reader.read_string();
    let persistent_id = reader.read_string();
    let slot = reader.read_u8()?;
    let car_model = reader.read_string();
    let car_skin = reader.read_string();

    Ok(DriverJoin {
        name,
        persistent_id,
        slot,
        car_model,
        car_skin,
    })
}

fn parse_driver_leave(reader: &mut PacketReader<'_>) -> Result<DriverLeave, DecodeError> {
    let name = reader.read_string();
    let persistent_id = reader.read_string();
    let slot = reader.read_u8()?;

    Ok(DriverLeave {
        name,
        persistent_id,
        slot,
    })
}

fn parse_car_update(reader: &mut PacketReader<'_>) -> Result<u8, DecodeError> {
    let slot = reader.read_u8()?;
    for _ in 0..3 {
        let _position = reader.read_f32_le()?;
    }
    for _ in 0..3 {
        let _velocity = reader.read_f32_le()?;
    }
    let _gear = reader.read_u8()?;
    let _engine_rpm = reader.read_u16_le()?;
    let _spline_position = reader.read_f32_le()?;
    Ok(slot)
}

fn parse_driver_info(reader: &mut PacketReader<'_>) -> Result<DriverInfo, DecodeError> {
    let slot = reader.read_u8()?;
    let connected = reader.read_u8()? != 0;

    Ok(DriverInfo {
        slot,
        connected,
        car_model: reader.read_string(),
        car_skin: reader.read_string(),
        name: reader.read_string(),
        team: reader.read_string(),
        persistent_id: reader.read_string(),
    })
}

fn parse_lap_completed(reader: &mut PacketReader<'_>) -> Result<LapCompleted, DecodeError> {
    Ok(LapCompleted {
        slot: reader.read_u8()?,
        lap_time_ms: reader.read_u32_le()?,
        cuts: reader.read_u8()?,
    })
}

fn parse_client_event(reader: &mut PacketReader<'_>) -> Result<ClientEvent, DecodeError> {
    Ok(ClientEvent {
        slot: reader.read_u8()?,
        event_type: reader.read_u8()?,
    })
}
