//! `Transport` bound to one peer over the daemon's shared UDP socket.

use std::net::SocketAddr;
use std::sync::Arc;

use ike_core::Transport;
use tokio::net::UdpSocket;
use tracing::warn;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: Vec<u8>) {
        let socket = self.socket.clone();
        let peer = self.peer;
        tokio::spawn(async move {
            if let Err(err) = socket.send_to(&bytes, peer).await {
                warn!(%peer, %err, "failed to send datagram");
            }
        });
    }
}
