use std::fmt;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;

use super::stats::StatsCounters;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Discovery,
    Game,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Discovery => "discovery",
            Channel::Game => "game",
        })
    }
}

/// Drops a share of outbound datagrams to exercise loss handling on a quiet LAN.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketLossSimulation {
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn should_drop(&self) -> bool {
        if self.loss_percent <= 0.0 {
            return false;
        }
        rand_percent() < self.loss_percent
    }
}

fn rand_percent() -> f32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default(),
    );
    (hasher.finish() % 10_000) as f32 / 100.0
}

/// A bound, non-blocking UDP socket for one channel.
///
/// Sends are fire-and-forget and receives are polled; nothing here blocks.
#[derive(Debug)]
pub struct Endpoint {
    socket: UdpSocket,
    channel: Channel,
    local_addr: SocketAddr,
    loss: PacketLossSimulation,
    stats: Arc<StatsCounters>,
}

impl Endpoint {
    pub(crate) fn bind(
        channel: Channel,
        addr: SocketAddrV4,
        broadcast: bool,
        stats: Arc<StatsCounters>,
    ) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind(addr).map_err(|source| SessionError::Bind {
            channel,
            addr,
            source,
        })?;

        let configure = |socket: &UdpSocket| -> io::Result<SocketAddr> {
            if broadcast {
                socket.set_broadcast(true)?;
            }
            socket.set_nonblocking(true)?;
            socket.local_addr()
        };
        let local_addr =
            configure(&socket).map_err(|source| SessionError::Socket { channel, source })?;

        log::debug!("{} socket bound on {}", channel, local_addr);

        Ok(Self {
            socket,
            channel,
            local_addr,
            loss: PacketLossSimulation::default(),
            stats,
        })
    }

    pub fn set_loss_simulation(&mut self, loss: PacketLossSimulation) {
        self.loss = loss;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends one datagram. Returns whether it was handed to the OS.
    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> bool {
        if self.loss.should_drop() {
            self.stats.record_simulated_loss();
            return false;
        }

        match self.socket.send_to(data, addr) {
            Ok(bytes) => {
                self.stats.record_sent(bytes);
                true
            }
            Err(e) => {
                log::warn!("{} send to {} failed: {}", self.channel, addr, e);
                false
            }
        }
    }

    /// Polls for one datagram. `Ok(None)` means nothing is waiting.
    pub fn poll(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((size, from)) => {
                self.stats.record_received(size);
                Ok(Some((size, from)))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            // Windows reports ICMP port-unreachable for an earlier send here.
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[test]
    fn poll_is_non_blocking() {
        let stats = Arc::new(StatsCounters::default());
        let endpoint = Endpoint::bind(Channel::Game, loopback(), false, stats).unwrap();
        let mut buf = [0u8; 16];
        let start = Instant::now();
        assert!(endpoint.poll(&mut buf).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn send_and_poll_update_stats() {
        let stats = Arc::new(StatsCounters::default());
        let a = Endpoint::bind(Channel::Game, loopback(), false, stats.clone()).unwrap();
        let b = Endpoint::bind(Channel::Game, loopback(), false, stats.clone()).unwrap();

        assert!(a.send_to(b"hello", b.local_addr()));

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_millis(500);
        let received = loop {
            if let Some(got) = b.poll(&mut buf).unwrap() {
                break got;
            }
            assert!(Instant::now() < deadline, "datagram never arrived");
            std::thread::sleep(Duration::from_millis(1));
        };

        assert_eq!(received, (5, a.local_addr()));
        assert_eq!(&buf[..5], b"hello");
        let snap = stats.snapshot();
        assert_eq!(snap.packets_sent, 1);
        assert_eq!(snap.packets_received, 1);
    }

    #[test]
    fn full_loss_simulation_sends_nothing() {
        let stats = Arc::new(StatsCounters::default());
        let mut a = Endpoint::bind(Channel::Game, loopback(), false, stats.clone()).unwrap();
        a.set_loss_simulation(PacketLossSimulation {
            loss_percent: 100.0,
        });
        assert!(!a.send_to(b"x", a.local_addr()));
        let snap = stats.snapshot();
        assert_eq!(snap.packets_sent, 0);
        assert_eq!(snap.packets_simulated_lost, 1);
    }

    #[test]
    fn bind_conflict_reports_channel() {
        let stats = Arc::new(StatsCounters::default());
        let first = Endpoint::bind(Channel::Discovery, loopback(), true, stats.clone()).unwrap();
        let SocketAddr::V4(taken) = first.local_addr() else {
            panic!("expected v4");
        };
        let err = Endpoint::bind(Channel::Discovery, taken, true, stats).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Bind {
                channel: Channel::Discovery,
                ..
            }
        ));
    }
}
