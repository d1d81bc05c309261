//! Plugin registration with the dedicated server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use racing_wheel_acsp_protocol::{ControlMessage, registration_sequence, slot_sweep};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay between consecutive per-slot identity requests.
pub const SLOT_REQUEST_STAGGER: Duration = Duration::from_millis(50);

/// Sends one control message. Failures are logged and reported as `false`.
pub async fn send_control(socket: &UdpSocket, peer: SocketAddr, message: ControlMessage) -> bool {
    match socket.send_to(&message.encode(), peer).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, %peer, ?message, "Failed to send control message");
            false
        }
    }
}

/// Handshake, subscriptions and session request, then a staggered sweep
/// asking for every slot's identity. Only ever writes to the socket.
pub async fn register(socket: Arc<UdpSocket>, peer: SocketAddr, stagger: Duration) {
    info!(%peer, "Registering with server");

    for message in registration_sequence() {
        send_control(&socket, peer, message).await;
    }

    for message in slot_sweep() {
        tokio::time::sleep(stagger).await;
        send_control(&socket, peer, message).await;
    }

    debug!(%peer, "Slot sweep complete");
}

/// Tracks the registered peer and its registration task.
#[derive(Debug)]
pub struct RegistrationSession {
    peer: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
    stagger: Duration,
}

impl Default for RegistrationSession {
    fn default() -> Self {
        Self::new(SLOT_REQUEST_STAGGER)
    }
}

impl RegistrationSession {
    pub fn new(stagger: Duration) -> Self {
        Self {
            peer: None,
            task: None,
            stagger,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Records the sender of an inbound datagram. A sender other than the
    /// current peer becomes the peer and registration restarts; any
    /// registration still running for the old peer is aborted.
    pub fn observe(&mut self, socket: &Arc<UdpSocket>, sender: SocketAddr) -> bool {
        if self.peer == Some(sender) {
            return false;
        }

        if let Some(previous) = self.peer {
            info!(%previous, peer = %sender, "Server address changed");
        }
        self.abort();

        self.peer = Some(sender);
        self.task = Some(tokio::spawn(register(
            Arc::clone(socket),
            sender,
            self.stagger,
        )));
        true
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RegistrationSession {
    fn drop(&mut self) {
        self.abort();
    }
}
