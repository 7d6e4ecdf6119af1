//! The per-subscriber audio destination. Production code writes chunks to a
//! connected UDP socket; tests swap in an in-process channel to eliminate
//! datagram loss (see SPEC_FULL.md §8).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::debug;

/// Where a station's broadcast loop delivers audio chunks for one subscriber.
///
/// A broken sink must never unsubscribe the client (SPEC_FULL.md §4.3) — `send`
/// takes `&self` and returns nothing; failures are logged and dropped.
pub trait AudioSink: Send + Sync {
    fn send(&self, chunk: Bytes);
}

/// Production sink: a UDP socket connected to the subscriber's declared port.
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpSink {
    pub async fn connect(peer: SocketAddr) -> std::io::Result<Self> {
        let local_addr: SocketAddr = if peer.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(peer).await?;
        Ok(UdpSink {
            socket: Arc::new(socket),
            peer,
        })
    }
}

impl AudioSink for UdpSink {
    fn send(&self, chunk: Bytes) {
        let socket = Arc::clone(&self.socket);
        let peer = self.peer;
        tokio::spawn(async move {
            if let Err(e) = socket.send(&chunk).await {
                debug!(%peer, error = %e, "dropping chunk: udp send failed");
            }
        });
    }
}

/// Test sink: an in-process, unbounded channel of chunks. Draining it
/// synchronously in a test eliminates both loss and network nondeterminism.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl AudioSink for ChannelSink {
    fn send(&self, chunk: Bytes) {
        // A dropped receiver (a test that stopped listening) is not an error
        // for the broadcast loop; it is exactly the same "best effort" drop
        // a lost UDP datagram would be.
        let _ = self.tx.send(chunk);
    }
}
