//! Shared UDP transport: one socket per host process, demultiplexed by peer
//! address into per-unit receive channels so several `Task`s can share a
//! single bound port the way a multi-unit array needs to (the broadcast
//! start on port 1024 must reach every unit from the same socket).

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::config::BROADCAST_PORT;
use crate::error::{AvmuError, Result};

/// Depth of the bounded queue a straggling peer can build up in before the
/// reader thread starts dropping its datagrams rather than blocking every
/// other registered peer.
const ROUTE_QUEUE_DEPTH: usize = 64;

struct Inner {
    socket: UdpSocket,
    sequence: AtomicU32,
    routes: Mutex<HashMap<SocketAddr, SyncSender<Vec<u8>>>>,
}

/// A bound UDP endpoint shared (via cheap `Clone`) across every `Task` that
/// talks through it. Internally reference-counted; the background reader
/// thread holds only a `Weak` handle and exits on its own once the last
/// clone is dropped.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl Transport {
    /// Bind a UDP socket at `bind_addr` and start the background reader
    /// thread. `bind_addr` is usually `0.0.0.0:0` (host picks an ephemeral
    /// port) unless the deployment needs a fixed host-side port.
    pub fn open(bind_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).map_err(|_| AvmuError::Socket)?;
        socket.set_broadcast(true).map_err(|_| AvmuError::Socket)?;
        socket.set_read_timeout(Some(Duration::from_millis(200))).map_err(|_| AvmuError::Socket)?;

        let inner = Arc::new(Inner {
            socket,
            sequence: AtomicU32::new(1),
            routes: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("vmu-transport-reader".into())
            .spawn(move || reader_loop(weak))
            .map_err(|_| AvmuError::Socket)?;

        Ok(Transport { inner })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.socket.local_addr().map_err(|_| AvmuError::Socket)
    }

    /// Next monotonically increasing sequence number for framed commands.
    pub fn next_sequence(&self) -> u32 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a pre-framed datagram to one unit.
    pub fn send_to(&self, peer: SocketAddr, frame: &[u8]) -> Result<()> {
        self.inner.socket.send_to(frame, peer).map_err(|_| AvmuError::Socket)?;
        Ok(())
    }

    /// Send a pre-framed datagram to the reserved broadcast port so every
    /// unit sharing this subnet's broadcast address receives it at once.
    pub fn broadcast(&self, broadcast_ip: std::net::Ipv4Addr, frame: &[u8]) -> Result<()> {
        let addr = SocketAddr::from((broadcast_ip, BROADCAST_PORT));
        self.inner.socket.send_to(frame, addr).map_err(|_| AvmuError::Socket)?;
        Ok(())
    }

    /// Register interest in datagrams from `peer`. Only one `PeerChannel`
    /// may be registered per address at a time; registering again for an
    /// address that already has a live channel replaces the old route (the
    /// previous `PeerChannel` silently stops receiving).
    pub fn register(&self, peer: SocketAddr) -> PeerChannel {
        let (tx, rx) = sync_channel(ROUTE_QUEUE_DEPTH);
        self.inner.routes.lock().unwrap().insert(peer, tx);
        PeerChannel { inner: Arc::downgrade(&self.inner), peer, rx }
    }
}

fn reader_loop(weak: Weak<Inner>) {
    let mut buf = [0u8; 65535];
    loop {
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        match inner.socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                let routes = inner.routes.lock().unwrap();
                if let Some(tx) = routes.get(&peer) {
                    if tx.try_send(buf[..len].to_vec()).is_err() {
                        log::warn!("dropping datagram from {peer}: receiver queue full or closed");
                    }
                } else {
                    log::debug!("dropping datagram from unregistered peer {peer}");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                log::error!("transport socket read error: {e}");
                return;
            }
        }
    }
}

/// A per-peer inbound datagram stream. Dropping it deregisters the route so
/// the reader thread stops queuing datagrams for an address nobody is
/// reading anymore.
pub struct PeerChannel {
    inner: Weak<Inner>,
    peer: SocketAddr,
    rx: Receiver<Vec<u8>>,
}

impl PeerChannel {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Block for up to `timeout` for the next datagram from this peer.
    /// `Duration::ZERO` performs a non-blocking poll.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self.rx.recv_timeout(timeout) {
            Ok(datagram) => Ok(datagram),
            Err(RecvTimeoutError::Timeout) => Err(AvmuError::NoResponse),
            Err(RecvTimeoutError::Disconnected) => Err(AvmuError::Socket),
        }
    }
}

impl Drop for PeerChannel {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.routes.lock().unwrap().remove(&self.peer);
        }
    }
}
