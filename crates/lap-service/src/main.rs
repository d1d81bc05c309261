//! lapd - dedicated server lap recorder

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use openracing_lap_registry::{LapStore, PacketDispatcher, Registry, TimingMode};
use racing_wheel_lap_service::{JsonLapStore, LapListener, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lapd")]
#[command(about = "Records best laps from an Assetto Corsa dedicated server plugin feed")]
#[command(version)]
struct Cli {
    /// Dedicated server config providing name, track and plugin port
    #[arg(long, env = "LAPD_SERVER_CFG", default_value = "cfg/server_cfg.ini")]
    server_cfg: PathBuf,

    /// UDP port to listen on (overrides UDP_PLUGIN_LOCAL_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Local address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// JSON file holding drivers and best laps
    #[arg(long, env = "LAPD_STORE", default_value = "laps.json")]
    store: PathBuf,

    /// Time laps from line-crossing events instead of server lap packets
    #[arg(long)]
    manual_timing: bool,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::load(&self.server_cfg).with_context(|| {
            format!(
                "Failed to load server config from {}",
                self.server_cfg.display()
            )
        })?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        config.store_path.clone_from(&self.store);
        if self.manual_timing {
            config.timing_mode = TimingMode::LineCrossing;
        }
    }
}

fn default_filter(verbose: u8) -> String {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("lapd={log_level},racing_wheel_lap_service={log_level},openracing_lap_registry={log_level}")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting lapd v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.server_config()?;
    let store = JsonLapStore::open(&config.store_path).with_context(|| {
        format!(
            "Failed to open lap store {}",
            config.store_path.display()
        )
    })?;

    let registry = Registry::with_session(Arc::new(store) as Arc<dyn LapStore>, config.session());
    let dispatcher = PacketDispatcher::new(registry, config.timing_mode);

    let addr = config.listen_addr();
    let listener = LapListener::bind(addr, dispatcher)
        .await
        .with_context(|| format!("Failed to bind UDP socket on {addr}"))?;

    info!(
        %addr,
        server = %config.server_name,
        track = %config.track,
        timing = ?config.timing_mode,
        "lapd ready"
    );

    let dispatcher = listener.run_until(shutdown_signal()).await;
    info!(
        drivers = dispatcher.registry().len(),
        stats = ?dispatcher.stats(),
        "lapd stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["lapd"])?;
        assert_eq!(cli.port, None);
        assert_eq!(cli.bind, None);
        assert!(!cli.manual_timing);
        assert_eq!(cli.verbose, 0);
        Ok(())
    }

    #[test]
    fn overrides_replace_file_values() -> TestResult {
        let cli = Cli::try_parse_from([
            "lapd",
            "--port",
            "12500",
            "--bind",
            "127.0.0.1",
            "--store",
            "/var/lib/lapd/laps.json",
            "--manual-timing",
            "-vv",
        ])?;

        let mut config = ServerConfig::default();
        config.apply_server_cfg("UDP_PLUGIN_LOCAL_PORT=12003\nTRACK=imola\n")?;
        cli.apply_overrides(&mut config);

        assert_eq!(config.listen_port, 12500);
        assert_eq!(config.bind_address, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.store_path, PathBuf::from("/var/lib/lapd/laps.json"));
        assert_eq!(config.timing_mode, TimingMode::LineCrossing);
        assert_eq!(config.track, "imola");
        assert_eq!(cli.verbose, 2);
        Ok(())
    }

    #[test]
    fn file_port_kept_without_flag() -> TestResult {
        let cli = Cli::try_parse_from(["lapd", "--store", "laps.json"])?;
        let mut config = ServerConfig::default();
        config.apply_server_cfg("UDP_PLUGIN_LOCAL_PORT=12003\n")?;
        cli.apply_overrides(&mut config);
        assert_eq!(config.listen_port, 12003);
        assert_eq!(config.timing_mode, TimingMode::ServerLaps);
        Ok(())
    }

    #[test]
    fn filter_follows_verbosity() {
        assert!(default_filter(0).starts_with("lapd=info"));
        assert!(default_filter(1).contains("openracing_lap_registry=debug"));
        assert!(default_filter(5).contains("racing_wheel_lap_service=trace"));
    }
}
