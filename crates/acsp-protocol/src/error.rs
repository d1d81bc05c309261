//! Decode errors for the server plugin protocol.

use thiserror::Error;

/// A fixed-width read ran past the end of the datagram.
///
/// This is the only way a packet read can fail. String reads never fail;
/// see [`crate::PacketReader::read_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes remained than the field requires.
    #[error("packet too short: need {needed} bytes at offset {offset}, total {len}")]
    Insufficient {
        /// Width of the requested field in bytes.
        needed: usize,
        /// Cursor position when the read was attempted.
        offset: usize,
        /// Total datagram length.
        len: usize,
    },

    /// The datagram carried no packet-type byte at all.
    #[error("empty datagram")]
    Empty,
}
