//! UDP transport implementation using `tokio::net::UdpSocket`.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::{DatagramChannel, TransportError, MAX_DATAGRAM};

/// A [`DatagramChannel`] backed by a bound UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpChannel {
    /// Binds a new UDP channel to the given address.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port; use
    /// [`DatagramChannel::local_addr`] to learn which one.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let local_addr =
            socket.local_addr().map_err(TransportError::BindFailed)?;
        tracing::info!(%local_addr, "UDP channel bound");
        Ok(Self { socket, local_addr })
    }
}

impl DatagramChannel for UdpChannel {
    async fn send_to(
        &self,
        addr: SocketAddr,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.socket
            .send_to(data, addr)
            .await
            .map_err(TransportError::SendFailed)?;
        tracing::trace!(%addr, len = data.len(), "datagram sent");
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
