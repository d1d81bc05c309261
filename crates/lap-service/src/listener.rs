//! UDP receive loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use openracing_lap_registry::PacketDispatcher;
use tokio::net::UdpSocket;
use tracing::{info, trace, warn};

use crate::registration::{RegistrationSession, SLOT_REQUEST_STAGGER, send_control};

/// Largest datagram read in one call.
pub const RECV_BUFFER_SIZE: usize = 4096;

/// Wall-clock milliseconds used to timestamp laps and line crossings.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owns the socket and the dispatcher. Datagrams are handled strictly one
/// at a time.
#[derive(Debug)]
pub struct LapListener {
    socket: Arc<UdpSocket>,
    dispatcher: PacketDispatcher,
    registration: RegistrationSession,
}

impl LapListener {
    pub async fn bind(addr: SocketAddr, dispatcher: PacketDispatcher) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, dispatcher, SLOT_REQUEST_STAGGER))
    }

    pub fn from_socket(
        socket: UdpSocket,
        dispatcher: PacketDispatcher,
        slot_request_stagger: Duration,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            dispatcher,
            registration: RegistrationSession::new(slot_request_stagger),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn dispatcher(&self) -> &PacketDispatcher {
        &self.dispatcher
    }

    /// Receives until `shutdown` resolves, then hands the dispatcher back.
    pub async fn run_until<F>(mut self, shutdown: F) -> PacketDispatcher
    where
        F: Future<Output = ()>,
    {
        info!(addr = ?self.socket.local_addr().ok(), "Listening for server plugin packets");

        tokio::pin!(shutdown);
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping listener");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, sender)) => {
                        let datagram = buf.get(..len).unwrap_or_default();
                        self.process(datagram, sender).await;
                    }
                    Err(e) => warn!(error = %e, "UDP receive error"),
                },
            }
        }

        info!(stats = ?self.dispatcher.stats(), "Listener stopped");
        self.dispatcher
    }

    async fn process(&mut self, datagram: &[u8], sender: SocketAddr) {
        self.registration.observe(&self.socket, sender);

        let dispatch = self.dispatcher.handle(datagram, now_ms());
        trace!(kind = dispatch.kind, len = datagram.len(), %sender, "Datagram handled");

        for message in dispatch.outbound {
            send_control(&self.socket, sender, message).await;
        }
    }
}
