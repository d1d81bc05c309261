//! Dedicated server plugin daemon.
//!
//! Binds the plugin UDP port, registers with whichever server talks to it,
//! and feeds every datagram through an
//! [`openracing_lap_registry::PacketDispatcher`] backed by a
//! [`JsonLapStore`].

#![deny(static_mut_refs)]

pub mod config;
pub mod json_store;
pub mod listener;
pub mod registration;

pub use config::{ConfigError, DEFAULT_LISTEN_PORT, ServerConfig};
pub use json_store::JsonLapStore;
pub use listener::{LapListener, RECV_BUFFER_SIZE, now_ms};
pub use registration::{RegistrationSession, SLOT_REQUEST_STAGGER};
