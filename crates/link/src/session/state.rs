use std::cmp::Ordering;
use std::net::{Ipv4Addr, SocketAddrV4};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Discovering,
    WaitingForPeer,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn is_searching(self) -> bool {
        matches!(self, Self::Discovering | Self::WaitingForPeer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::WaitingForPeer => "waiting for peer",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NetworkRole {
    #[default]
    None,
    Host,
    Client,
}

impl NetworkRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Host => "host",
            Self::Client => "client",
        }
    }
}

/// Picks our role from the two dotted-quad address strings. The smaller
/// string hosts. Equal addresses have no winner.
pub fn elect_role(local: Ipv4Addr, remote: Ipv4Addr) -> Option<NetworkRole> {
    match local.to_string().cmp(&remote.to_string()) {
        Ordering::Less => Some(NetworkRole::Host),
        Ordering::Greater => Some(NetworkRole::Client),
        Ordering::Equal => None,
    }
}

/// A discovered peer and the role we will take if it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    /// The peer's game channel endpoint.
    pub addr: SocketAddrV4,
    pub role: NetworkRole,
}

/// Session fields shared between the game thread and the session threads.
/// Always accessed under one lock so transitions are atomic.
#[derive(Debug, Default)]
pub(crate) struct SessionSlots {
    state: ConnectionState,
    role: NetworkRole,
    pending: Option<PeerInfo>,
    active: Option<SocketAddrV4>,
}

impl SessionSlots {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> NetworkRole {
        self.role
    }

    pub fn pending(&self) -> Option<PeerInfo> {
        self.pending
    }

    pub fn active(&self) -> Option<SocketAddrV4> {
        self.active
    }

    pub fn has_peer(&self) -> bool {
        self.pending.is_some() || self.active.is_some()
    }

    pub fn begin_discovery(&mut self) {
        *self = Self {
            state: ConnectionState::Discovering,
            ..Self::default()
        };
    }

    /// First come, first served: only the first peer seen while
    /// discovering becomes pending.
    pub fn offer_peer(&mut self, peer: PeerInfo) -> bool {
        if self.state != ConnectionState::Discovering || self.has_peer() {
            return false;
        }
        self.pending = Some(peer);
        self.state = ConnectionState::WaitingForPeer;
        true
    }

    pub fn accept(&mut self) -> Option<PeerInfo> {
        if self.state != ConnectionState::WaitingForPeer {
            return None;
        }
        let peer = self.pending.take()?;
        self.active = Some(peer.addr);
        self.role = peer.role;
        self.state = ConnectionState::Connected;
        Some(peer)
    }

    pub fn decline(&mut self) -> Option<PeerInfo> {
        if self.state != ConnectionState::WaitingForPeer {
            return None;
        }
        let peer = self.pending.take()?;
        self.state = ConnectionState::Discovering;
        Some(peer)
    }

    pub fn search_timed_out(&mut self) -> bool {
        if !self.state.is_searching() {
            return false;
        }
        self.pending = None;
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Returns the peer that went silent, once.
    pub fn inactivity_timed_out(&mut self) -> Option<SocketAddrV4> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        self.active.take()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(last: u8, role: NetworkRole) -> PeerInfo {
        PeerInfo {
            addr: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, last), 47778),
            role,
        }
    }

    fn discovering() -> SessionSlots {
        let mut slots = SessionSlots::default();
        slots.begin_discovery();
        slots
    }

    #[test]
    fn smaller_address_hosts() {
        let a = Ipv4Addr::new(192, 168, 1, 10);
        let b = Ipv4Addr::new(192, 168, 1, 20);
        assert_eq!(elect_role(a, b), Some(NetworkRole::Host));
        assert_eq!(elect_role(b, a), Some(NetworkRole::Client));
        assert_eq!(elect_role(a, a), None);
    }

    #[test]
    fn election_is_string_order_on_both_sides() {
        // "10.0.0.10" < "10.0.0.9" as strings.
        let a = Ipv4Addr::new(10, 0, 0, 10);
        let b = Ipv4Addr::new(10, 0, 0, 9);
        assert_eq!(elect_role(a, b), Some(NetworkRole::Host));
        assert_eq!(elect_role(b, a), Some(NetworkRole::Client));
    }

    #[test]
    fn first_peer_wins() {
        let mut slots = discovering();
        assert!(slots.offer_peer(peer(2, NetworkRole::Host)));
        assert_eq!(slots.state(), ConnectionState::WaitingForPeer);
        assert!(!slots.offer_peer(peer(3, NetworkRole::Client)));
        assert_eq!(slots.pending(), Some(peer(2, NetworkRole::Host)));
    }

    #[test]
    fn role_is_published_on_accept() {
        let mut slots = discovering();
        slots.offer_peer(peer(2, NetworkRole::Client));
        assert_eq!(slots.role(), NetworkRole::None);

        let accepted = slots.accept().unwrap();
        assert_eq!(accepted.role, NetworkRole::Client);
        assert_eq!(slots.state(), ConnectionState::Connected);
        assert_eq!(slots.role(), NetworkRole::Client);
        assert_eq!(slots.active(), Some(accepted.addr));
        assert_eq!(slots.pending(), None);
        assert!(slots.accept().is_none());
    }

    #[test]
    fn decline_returns_to_discovering() {
        let mut slots = discovering();
        slots.offer_peer(peer(2, NetworkRole::Host));
        assert!(slots.decline().is_some());
        assert_eq!(slots.state(), ConnectionState::Discovering);
        assert!(!slots.has_peer());
        assert!(slots.offer_peer(peer(4, NetworkRole::Host)));
    }

    #[test]
    fn accept_and_decline_without_pending_do_nothing() {
        let mut slots = discovering();
        assert!(slots.accept().is_none());
        assert!(slots.decline().is_none());
        assert_eq!(slots.state(), ConnectionState::Discovering);
    }

    #[test]
    fn inactivity_fires_once() {
        let mut slots = discovering();
        slots.offer_peer(peer(2, NetworkRole::Host));
        slots.accept();

        assert!(slots.inactivity_timed_out().is_some());
        assert_eq!(slots.state(), ConnectionState::Disconnected);
        assert!(slots.inactivity_timed_out().is_none());
        assert_eq!(slots.active(), None);
    }

    #[test]
    fn search_timeout_only_while_searching() {
        let mut slots = discovering();
        slots.offer_peer(peer(2, NetworkRole::Host));
        assert!(slots.search_timed_out());
        assert_eq!(slots.state(), ConnectionState::Disconnected);
        assert_eq!(slots.pending(), None);
        assert!(!slots.search_timed_out());

        let mut connected = discovering();
        connected.offer_peer(peer(2, NetworkRole::Host));
        connected.accept();
        assert!(!connected.search_timed_out());
        assert_eq!(connected.state(), ConnectionState::Connected);
    }

    #[test]
    fn reset_clears_everything() {
        let mut slots = discovering();
        slots.offer_peer(peer(2, NetworkRole::Host));
        slots.accept();
        slots.reset();
        assert_eq!(slots.state(), ConnectionState::Idle);
        assert_eq!(slots.role(), NetworkRole::None);
        assert!(!slots.has_peer());
    }
}
