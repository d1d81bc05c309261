//! Startup configuration read from the dedicated server's `server_cfg.ini`.
//!
//! Only four keys matter and they are looked up on any line regardless of
//! section, the way the server itself writes them under `[SERVER]`:
//!
//! | Key                     | Field          |
//! |-------------------------|----------------|
//! | `NAME`                  | `server_name`  |
//! | `TRACK`                 | `track`        |
//! | `CONFIG_TRACK`          | `track_layout` |
//! | `UDP_PLUGIN_LOCAL_PORT` | `listen_port`  |

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use openracing_lap_registry::{SessionContext, TimingMode};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_LISTEN_PORT: u16 = 12000;
pub const DEFAULT_STORE_PATH: &str = "laps.json";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid UDP_PLUGIN_LOCAL_PORT value {0:?}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub bind_address: IpAddr,
    pub server_name: String,
    pub track: String,
    pub track_layout: String,
    pub timing_mode: TimingMode,
    pub store_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_name: UNKNOWN.to_string(),
            track: UNKNOWN.to_string(),
            track_layout: String::new(),
            timing_mode: TimingMode::default(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                config.apply_server_cfg(&content)?;
                info!(
                    path = %path.display(),
                    server = %config.server_name,
                    track = %config.track,
                    layout = %config.track_layout,
                    port = config.listen_port,
                    "Loaded server configuration"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "server_cfg.ini not found, using defaults");
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        Ok(config)
    }

    /// Applies the keys present in `content`; absent keys keep their value.
    pub fn apply_server_cfg(&mut self, content: &str) -> Result<(), ConfigError> {
        if let Some(name) = ini_value(content, "NAME").filter(|v| !v.is_empty()) {
            name.clone_into(&mut self.server_name);
        }
        if let Some(track) = ini_value(content, "TRACK").filter(|v| !v.is_empty()) {
            track.clone_into(&mut self.track);
        }
        if let Some(layout) = ini_value(content, "CONFIG_TRACK") {
            layout.clone_into(&mut self.track_layout);
        }
        if let Some(port) = ini_value(content, "UDP_PLUGIN_LOCAL_PORT") {
            self.listen_port = port
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| ConfigError::InvalidPort(port.to_string()))?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.listen_port)
    }

    /// Session context in effect until the server announces a session.
    pub fn session(&self) -> SessionContext {
        SessionContext::new(&self.server_name, &self.track, &self.track_layout)
    }
}

/// Trimmed value of the first `key=` line, in any section.
pub fn ini_value<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    let key_prefix = format!("{key}=");
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix(key_prefix.as_str()))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const SERVER_CFG: &str = "\
[SERVER]
NAME=Sunday Cup | Practice
CARS=ks_toyota_ae86_tuned;bmw_m3_e30
CONFIG_TRACK=junior
TRACK=ks_vallelunga
UDP_PLUGIN_LOCAL_PORT=12003
UDP_PLUGIN_ADDRESS=127.0.0.1:11000

[DYNAMIC_TRACK]
SESSION_START=95
";

    #[test]
    fn reads_the_four_plugin_keys() -> TestResult {
        let mut config = ServerConfig::default();
        config.apply_server_cfg(SERVER_CFG)?;

        assert_eq!(config.server_name, "Sunday Cup | Practice");
        assert_eq!(config.track, "ks_vallelunga");
        assert_eq!(config.track_layout, "junior");
        assert_eq!(config.listen_port, 12003);
        Ok(())
    }

    #[test]
    fn track_key_does_not_match_config_track() {
        assert_eq!(ini_value("CONFIG_TRACK=gp\n", "TRACK"), None);
        assert_eq!(ini_value("  TRACK = x\nTRACK=imola\n", "TRACK"), Some("imola"));
    }

    #[test]
    fn empty_name_keeps_default() -> TestResult {
        let mut config = ServerConfig::default();
        config.apply_server_cfg("NAME=\nCONFIG_TRACK=\n")?;
        assert_eq!(config.server_name, "Unknown");
        assert_eq!(config.track_layout, "");
        Ok(())
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.apply_server_cfg("UDP_PLUGIN_LOCAL_PORT=twelve"),
            Err(ConfigError::InvalidPort(value)) if value == "twelve"
        ));
        assert!(matches!(
            config.apply_server_cfg("UDP_PLUGIN_LOCAL_PORT=0"),
            Err(ConfigError::InvalidPort(_))
        ));
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn missing_file_yields_defaults() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = ServerConfig::load(&dir.path().join("server_cfg.ini"))?;
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen_addr().port(), 12000);
        Ok(())
    }

    #[test]
    #[traced_test]
    fn missing_file_is_logged() -> TestResult {
        let dir = tempfile::tempdir()?;
        ServerConfig::load(&dir.path().join("server_cfg.ini"))?;
        assert!(logs_contain("server_cfg.ini not found"));
        Ok(())
    }

    #[test]
    fn load_reads_file_and_seeds_session() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("server_cfg.ini");
        std::fs::write(&path, SERVER_CFG)?;

        let config = ServerConfig::load(&path)?;
        let session = config.session();
        assert_eq!(session.server_name, "Sunday Cup | Practice");
        assert_eq!(session.track, "ks_vallelunga");
        assert_eq!(session.track_layout, "junior");
        assert_eq!(session.session_name, "");
        Ok(())
    }
}
