//! Broadcast announce and peer detection.
//!
//! Runs until a peer is accepted, the search gives up, or the session stops.
//! Announces and responses are both treated as evidence of a peer; the first
//! one from an address other than our own becomes the pending peer.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use super::Shared;
use super::dispatch::SessionEvent;
use super::scheduler::Cadence;
use super::state::{PeerInfo, elect_role};
use crate::error::SessionError;
use crate::net::{DiscoveryMessage, Endpoint};

/// Local identity used for the self filter and role election.
pub(crate) fn resolve_local_ip(bind: Ipv4Addr, advertised: Option<Ipv4Addr>) -> Ipv4Addr {
    if !bind.is_unspecified() {
        return bind;
    }
    advertised
        .or_else(detect_outbound_ipv4)
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// The address the OS would route LAN traffic from. Connecting a UDP socket
/// only selects a route; nothing is sent.
fn detect_outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Some(*addr.ip()),
        _ => None,
    }
}

pub(crate) struct DiscoveryWorker {
    shared: Arc<Shared>,
    endpoint: Endpoint,
    announce_target: SocketAddr,
    peer_game_port: u16,
    broadcast: Cadence,
    started: Instant,
}

impl DiscoveryWorker {
    pub fn new(shared: Arc<Shared>, endpoint: Endpoint) -> Self {
        let config = &shared.config;
        let announce_target = SocketAddr::V4(config.announce_target());
        let peer_game_port = config.peer_game_port();
        let broadcast = Cadence::primed(config.broadcast_interval());
        Self {
            shared,
            endpoint,
            announce_target,
            peer_game_port,
            broadcast,
            started: Instant::now(),
        }
    }

    pub fn run(mut self) {
        log::info!(
            "discovering peers as {} (announcing to {})",
            self.shared.local_ip,
            self.announce_target
        );

        let mut last_tick = Instant::now();
        while self.should_run() {
            let now = Instant::now();
            let delta = now - last_tick;
            last_tick = now;

            if self.broadcast.advance(delta) {
                self.endpoint
                    .send_to(&DiscoveryMessage::Announce.encode(), self.announce_target);
            }

            self.receive();
            self.check_search_timeout();

            std::thread::sleep(self.shared.config.discovery_poll());
        }

        log::debug!("discovery thread exiting");
    }

    fn should_run(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && self.shared.slots.lock().state().is_searching()
    }

    fn receive(&mut self) {
        let mut buf = [0u8; DiscoveryMessage::FRAME_SIZE + 1];
        loop {
            let (size, from) = match self.endpoint.poll(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("discovery receive failed: {}", e);
                    break;
                }
            };

            if let Err(e) = DiscoveryMessage::decode(&buf[..size]) {
                log::trace!("dropping discovery datagram from {}: {}", from, e);
                self.shared.stats.record_dropped();
                continue;
            }
            let SocketAddr::V4(from) = from else {
                self.shared.stats.record_dropped();
                continue;
            };

            self.handle_evidence(from);
        }
    }

    fn handle_evidence(&mut self, from: SocketAddrV4) {
        if self.shared.slots.lock().has_peer() {
            return;
        }

        let Some(role) = elect_role(self.shared.local_ip, *from.ip()) else {
            log::trace!("ignoring our own announce from {}", from);
            return;
        };

        let peer = PeerInfo {
            addr: SocketAddrV4::new(*from.ip(), self.peer_game_port),
            role,
        };
        if !self.shared.slots.lock().offer_peer(peer) {
            return;
        }

        log::info!("found peer {} (we will be {})", peer.addr, role.as_str());
        self.endpoint
            .send_to(&DiscoveryMessage::Response.encode(), SocketAddr::V4(from));
        self.shared.dispatch.emit(SessionEvent::PeerDetected(peer));
    }

    fn check_search_timeout(&mut self) {
        let Some(limit) = self.shared.config.search_timeout() else {
            return;
        };
        let waited = self.started.elapsed();
        if waited < limit {
            return;
        }
        if !self.shared.slots.lock().search_timed_out() {
            return;
        }

        log::warn!("no peer accepted after {:.1}s, giving up", waited.as_secs_f32());
        *self.shared.last_error.lock() = Some(Arc::new(SessionError::SearchTimeout(limit)));
        self.shared.dispatch.emit(SessionEvent::SearchFailed(limit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_bind_address_is_the_identity() {
        let bind = Ipv4Addr::new(10, 1, 2, 3);
        assert_eq!(resolve_local_ip(bind, Some(Ipv4Addr::new(9, 9, 9, 9))), bind);
    }

    #[test]
    fn advertised_address_overrides_detection() {
        let advertised = Ipv4Addr::new(192, 168, 7, 7);
        assert_eq!(
            resolve_local_ip(Ipv4Addr::UNSPECIFIED, Some(advertised)),
            advertised
        );
    }

    #[test]
    fn detection_never_yields_unspecified() {
        assert!(!resolve_local_ip(Ipv4Addr::UNSPECIFIED, None).is_unspecified());
    }
}
