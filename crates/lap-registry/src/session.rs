//! Process-wide session context.

use racing_wheel_acsp_protocol::SessionBegin;
use serde::Serialize;

const UNKNOWN: &str = "Unknown";

/// Track and server identity attached to every persisted lap.
///
/// Seeded from configuration at startup and replaced wholesale whenever the
/// server announces a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub server_name: String,
    pub track: String,
    pub track_layout: String,
    pub session_name: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            server_name: UNKNOWN.to_string(),
            track: UNKNOWN.to_string(),
            track_layout: String::new(),
            session_name: String::new(),
        }
    }
}

impl SessionContext {
    pub fn new(
        server_name: impl Into<String>,
        track: impl Into<String>,
        track_layout: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            track: track.into(),
            track_layout: track_layout.into(),
            session_name: String::new(),
        }
    }
}

impl From<&SessionBegin> for SessionContext {
    fn from(begin: &SessionBegin) -> Self {
        Self {
            server_name: begin.server_name.clone(),
            track: begin.track.clone(),
            track_layout: begin.track_config.clone(),
            session_name: begin.session_name.clone(),
        }
    }
}
