//! UDP link to the hardware endpoint
//!
//! Two sockets: one bound for inbound microphone frames, one for outbound
//! speaker frames. The device's address is unknown at startup and learned
//! from the first valid inbound datagram; once learned it persists for the
//! life of the process (a configured override skips discovery).

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::TransportConfig;
use crate::{Error, Result};

/// The socket pair for one session attempt.
///
/// Sockets are created per connection attempt and dropped at teardown; the
/// learned peer address lives in a process-wide watch channel owned by the
/// supervisor so it survives reconnects.
pub struct DeviceLink {
    socket_in: UdpSocket,
    socket_out: UdpSocket,
    peer: watch::Sender<Option<SocketAddr>>,
    device_port: u16,
}

impl DeviceLink {
    /// Bind the socket pair.
    ///
    /// If the config carries a fixed device address it is published to the
    /// peer channel immediately.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if either socket cannot be bound.
    pub async fn bind(
        config: &TransportConfig,
        peer: watch::Sender<Option<SocketAddr>>,
    ) -> Result<Self> {
        let socket_in = UdpSocket::bind(("0.0.0.0", config.listen_port)).await?;
        let socket_out = UdpSocket::bind(("0.0.0.0", 0)).await?;

        if let Some(ip) = config.device_ip {
            let addr = SocketAddr::new(ip, config.device_port);
            peer.send_replace(Some(addr));
            tracing::info!(%addr, "device address configured");
        }

        tracing::debug!(
            listen_port = config.listen_port,
            device_port = config.device_port,
            "udp link bound"
        );

        Ok(Self {
            socket_in,
            socket_out,
            peer,
            device_port: config.device_port,
        })
    }

    /// Receive one datagram from the device.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on a socket receive failure.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket_in
            .recv_from(buf)
            .await
            .map_err(|e| Error::Transport(format!("datagram receive failed: {e}")))
    }

    /// Record the device address learned from a valid inbound datagram.
    ///
    /// First discovery wins; later datagrams from other addresses do not
    /// move the peer.
    pub fn learn_peer(&self, from: SocketAddr) {
        if self.peer.borrow().is_some() {
            return;
        }

        let addr = SocketAddr::new(from.ip(), self.device_port);
        self.peer.send_replace(Some(addr));
        tracing::info!(%addr, "hardware endpoint discovered");
    }

    /// Current speaker-side destination, if known
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.borrow()
    }

    /// Send one packet to the device.
    ///
    /// Silently drops the packet when the peer is not yet known; frames
    /// produced before discovery have nowhere to go.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` on a socket send failure.
    pub async fn send(&self, packet: &[u8]) -> Result<()> {
        let Some(addr) = self.peer() else {
            tracing::trace!("dropping outbound frame, device address not yet known");
            return Ok(());
        };

        self.socket_out
            .send_to(packet, addr)
            .await
            .map_err(|e| Error::Transport(format!("datagram send failed: {e}")))?;
        Ok(())
    }
}
