use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use snakelink::net::Channel;
use snakelink::{
    ActionFlags, BoardChange, BoardChangeKind, BoardDelta, ConnectionState, GameStateSnapshot,
    Location, Message, NetworkRole, Session, SessionConfig, SessionError, SessionEvent,
    StartKind, Velocity,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(42000);

// Two sessions on one machine need distinct identities.
const HOST_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

struct Ports {
    discovery: u16,
    game: u16,
}

fn next_ports() -> Ports {
    let base = PORT_COUNTER.fetch_add(10, Ordering::SeqCst);
    Ports {
        discovery: base,
        game: base + 1,
    }
}

fn config(local: Ipv4Addr, remote: Ipv4Addr, ports: &Ports) -> SessionConfig {
    SessionConfig {
        bind_addr: local,
        discovery_port: ports.discovery,
        game_port: ports.game,
        announce_addr: Some(SocketAddrV4::new(remote, ports.discovery)),
        broadcast_interval_ms: 50,
        discovery_poll_ms: 5,
        network_poll_ms: 5,
        heartbeat_interval_ms: 100,
        inactivity_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn wait_until(timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn wait_for_event(
    session: &Session,
    timeout_ms: u64,
    mut matches: impl FnMut(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    let mut found = None;
    wait_until(timeout_ms, || {
        found = session.drain_events().find(|event| matches(event));
        found.is_some()
    });
    found
}

fn pair(tweak: impl Fn(&mut SessionConfig)) -> (Session, Session) {
    let ports = next_ports();
    let mut host_config = config(HOST_IP, CLIENT_IP, &ports);
    let mut client_config = config(CLIENT_IP, HOST_IP, &ports);
    tweak(&mut host_config);
    tweak(&mut client_config);
    (Session::new(host_config), Session::new(client_config))
}

fn discover(host: &mut Session, client: &mut Session) {
    host.start_discovery().unwrap();
    client.start_discovery().unwrap();
    assert!(
        wait_until(2_000, || {
            host.connection_state() == ConnectionState::WaitingForPeer
                && client.connection_state() == ConnectionState::WaitingForPeer
        }),
        "peers never found each other"
    );
}

fn connect(host: &mut Session, client: &mut Session) {
    discover(host, client);
    assert!(host.accept_connection());
    assert!(client.accept_connection());
    assert_eq!(host.connection_state(), ConnectionState::Connected);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    // Let both network threads notice the new state.
    thread::sleep(Duration::from_millis(30));
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = count.clone();
    (count, move || {
        handle.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_discover_accept_elects_roles() {
    let (mut host, mut client) = pair(|_| {});

    let detected = Arc::new(Mutex::new(Vec::new()));
    let sink = detected.clone();
    host.on_peer_detected(move |peer| sink.lock().push(peer));

    let roles = Arc::new(Mutex::new(Vec::new()));
    let sink = roles.clone();
    client.on_connected(move |role| sink.lock().push(role));

    discover(&mut host, &mut client);

    let pending = host.pending_peer().unwrap();
    assert_eq!(pending.role, NetworkRole::Host);
    assert_eq!(*pending.addr.ip(), CLIENT_IP);
    assert_eq!(pending.addr.port(), host.config().game_port);
    assert_eq!(host.role(), NetworkRole::None);
    assert_eq!(client.pending_peer().unwrap().role, NetworkRole::Client);
    // The handler runs just after the state changes.
    assert!(wait_until(500, || detected.lock().len() == 1));

    assert!(host.accept_connection());
    assert!(client.accept_connection());

    assert_eq!(host.role(), NetworkRole::Host);
    assert_eq!(client.role(), NetworkRole::Client);
    assert_eq!(*roles.lock(), vec![NetworkRole::Client]);
    assert_eq!(host.peer_address().map(|a| *a.ip()), Some(CLIENT_IP));
    assert!(!host.accept_connection());

    let mut events = Vec::new();
    assert!(wait_until(500, || {
        events.extend(host.drain_events());
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::PeerDetected(_)))
            && events.contains(&SessionEvent::Connected(NetworkRole::Host))
    }));
}

#[test]
fn test_own_announce_is_ignored() {
    let ports = next_ports();
    // Announce straight back to ourselves.
    let mut session = Session::new(config(HOST_IP, HOST_IP, &ports));
    let (detected, on_detected) = counter();
    session.on_peer_detected(move |_| on_detected());

    session.start_discovery().unwrap();
    assert!(wait_until(1_000, || session.stats().packets_received >= 3));

    assert_eq!(session.connection_state(), ConnectionState::Discovering);
    assert_eq!(session.pending_peer(), None);
    assert_eq!(detected.load(Ordering::SeqCst), 0);
}

#[test]
fn test_decline_returns_to_discovery_and_finds_peer_again() {
    let (mut host, mut client) = pair(|_| {});
    discover(&mut host, &mut client);

    assert!(host.decline_connection());
    assert_eq!(host.pending_peer(), None);

    // The client is still announcing, so the host rediscovers it.
    assert!(wait_until(1_000, || {
        host.connection_state() == ConnectionState::WaitingForPeer
    }));
    assert_eq!(host.role(), NetworkRole::None);
}

#[test]
fn test_accept_and_decline_without_peer() {
    let ports = next_ports();
    let session = Session::new(config(HOST_IP, CLIENT_IP, &ports));
    assert!(!session.accept_connection());
    assert!(!session.decline_connection());
    assert_eq!(session.connection_state(), ConnectionState::Idle);
}

#[test]
fn test_input_reaches_host_unchanged() {
    let (mut host, mut client) = pair(|_| {});
    connect(&mut host, &mut client);

    assert!(client.send_input(Velocity::new(1, 0), ActionFlags::empty(), 0.125));

    let event = wait_for_event(&host, 1_000, |e| matches!(e, SessionEvent::Input(_)))
        .expect("no input received");
    let SessionEvent::Input(input) = event else {
        unreachable!();
    };
    assert_eq!(input.velocity.x, 1);
    assert_eq!(input.velocity.y, 0);
    assert_eq!(input.move_period, 0.125);
    assert!(input.sequence > 0);
}

#[test]
fn test_snapshot_sequence_is_stamped_by_sender() {
    let (mut host, mut client) = pair(|_| {});
    connect(&mut host, &mut client);

    let sequences = Arc::new(Mutex::new(Vec::new()));
    let sink = sequences.clone();
    client.on_game_state_received(move |snapshot| sink.lock().push(snapshot.sequence));

    let snapshot = GameStateSnapshot {
        sequence: 999,
        scores: [3, 4],
        food: [Location::new(1, 2)].into_iter().collect(),
        ..Default::default()
    };
    assert!(host.send_game_state(&snapshot));
    assert!(host.send_game_state(&snapshot));

    assert!(wait_until(1_000, || sequences.lock().len() == 2));
    let sequences = sequences.lock();
    assert!(sequences[0] < sequences[1]);
    assert_ne!(sequences[0], 999);

    let event = wait_for_event(&client, 100, |e| matches!(e, SessionEvent::GameState(_)))
        .expect("snapshot not queued");
    let SessionEvent::GameState(received) = event else {
        unreachable!();
    };
    assert_eq!(received.scores, [3, 4]);
    assert_eq!(received.food.as_slice(), &[Location::new(1, 2)]);
}

#[test]
fn test_board_delta_with_oversized_count_is_truncated() {
    let (mut host, mut client) = pair(|_| {});
    connect(&mut host, &mut client);

    let delta = BoardDelta {
        sequence: 1,
        changes: (0..20)
            .map(|i| BoardChange {
                kind: BoardChangeKind::FoodAdded,
                at: Location::new(i, 0),
            })
            .collect(),
    };
    let mut frame = delta.encode().to_vec();
    // Count field follows the 6-byte header and the sequence.
    frame[10..12].copy_from_slice(&25u16.to_be_bytes());

    // Same address as the client, so it passes the peer filter.
    let forger = UdpSocket::bind((CLIENT_IP, 0)).unwrap();
    forger
        .send_to(&frame, (HOST_IP, host.config().game_port))
        .unwrap();

    let event = wait_for_event(&host, 1_000, |e| matches!(e, SessionEvent::BoardDelta(_)))
        .expect("no board delta received");
    let SessionEvent::BoardDelta(received) = event else {
        unreachable!();
    };
    assert_eq!(received.changes.len(), 20);
    assert_eq!(host.stats().truncated_frames, 1);
}

#[test]
fn test_start_command_is_sent_redundantly() {
    let (mut host, mut client) = pair(|_| {});
    connect(&mut host, &mut client);

    let (starts, on_start) = counter();
    client.on_game_start_received(move |_| on_start());

    assert!(host.send_start_command(StartKind::Restart));
    assert!(wait_until(1_000, || starts.load(Ordering::SeqCst) == 3));
}

#[test]
fn test_heartbeats_measure_round_trip() {
    let (mut host, mut client) = pair(|c| c.heartbeat_interval_ms = 20);
    connect(&mut host, &mut client);

    assert!(wait_until(1_000, || host.stats().rtt_ms.is_some()));
    assert!(host.send_heartbeat());
}

#[test]
fn test_silent_peer_disconnects_once() {
    let (mut host, mut client) = pair(|c| {
        c.inactivity_timeout_ms = 300;
        c.heartbeat_interval_ms = 50;
    });
    let (disconnects, on_disconnect) = counter();
    host.on_disconnected(on_disconnect);

    connect(&mut host, &mut client);
    thread::sleep(Duration::from_millis(400));
    assert_eq!(host.connection_state(), ConnectionState::Connected);

    client.stop();

    assert!(wait_until(2_000, || {
        host.connection_state() == ConnectionState::Disconnected
    }));
    thread::sleep(Duration::from_millis(500));
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(host.peer_address(), None);
    assert!(!host.send_heartbeat());
}

#[test]
fn test_unanswered_accept_times_out() {
    let (mut host, mut client) = pair(|c| c.inactivity_timeout_ms = 200);
    discover(&mut host, &mut client);

    // Only one side accepts; the other never sends game traffic.
    assert!(host.accept_connection());
    assert!(wait_until(2_000, || {
        host.connection_state() == ConnectionState::Disconnected
    }));
    assert_eq!(client.connection_state(), ConnectionState::WaitingForPeer);
}

#[test]
fn test_stop_joins_and_silences_handlers() {
    let (mut host, mut client) = pair(|c| c.heartbeat_interval_ms = 20);
    let (inputs, on_input) = counter();
    host.on_input_received(move |_| on_input());
    connect(&mut host, &mut client);

    for _ in 0..5 {
        client.send_input(Velocity::LEFT, ActionFlags::JUMP, 0.1);
    }

    let start = Instant::now();
    host.stop();
    assert!(start.elapsed() < Duration::from_secs(1));

    let seen = inputs.load(Ordering::SeqCst);
    for _ in 0..5 {
        client.send_input(Velocity::LEFT, ActionFlags::JUMP, 0.1);
    }
    thread::sleep(Duration::from_millis(100));

    assert_eq!(inputs.load(Ordering::SeqCst), seen);
    assert_eq!(host.connection_state(), ConnectionState::Idle);
    assert_eq!(host.role(), NetworkRole::None);
    assert!(!host.is_running());
    assert!(!host.send_heartbeat());
}

#[test]
fn test_restart_after_stop() {
    let (mut host, mut client) = pair(|_| {});
    connect(&mut host, &mut client);
    host.stop();
    client.stop();

    connect(&mut host, &mut client);
    assert_eq!(host.role(), NetworkRole::Host);
}

#[test]
fn test_search_timeout_reports_failure() {
    let ports = next_ports();
    let mut session = Session::new(SessionConfig {
        search_timeout_ms: Some(150),
        ..config(HOST_IP, CLIENT_IP, &ports)
    });
    let (failures, on_failure) = counter();
    session.on_search_failed(move |_| on_failure());

    session.start_discovery().unwrap();
    let event = wait_for_event(&session, 2_000, |e| matches!(e, SessionEvent::SearchFailed(_)));
    assert_eq!(
        event,
        Some(SessionEvent::SearchFailed(Duration::from_millis(150)))
    );
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(matches!(
        session.last_error().as_deref(),
        Some(SessionError::SearchTimeout(_))
    ));
}

#[test]
fn test_start_twice_and_bind_conflict() {
    let ports = next_ports();
    let mut first = Session::new(config(HOST_IP, CLIENT_IP, &ports));
    first.start_discovery().unwrap();
    assert!(matches!(
        first.start_discovery(),
        Err(SessionError::AlreadyRunning)
    ));

    let mut second = Session::new(config(HOST_IP, CLIENT_IP, &ports));
    assert!(matches!(
        second.start_discovery(),
        Err(SessionError::Bind { .. })
    ));
    assert_eq!(second.connection_state(), ConnectionState::Idle);
    assert!(!second.is_running());
}

#[test]
fn test_game_port_conflict_releases_discovery_socket() {
    let ports = next_ports();
    let _squatter = UdpSocket::bind((HOST_IP, ports.game)).unwrap();

    let mut session = Session::new(config(HOST_IP, CLIENT_IP, &ports));
    let err = session.start_discovery().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Bind {
            channel: Channel::Game,
            ..
        }
    ));
    assert_eq!(session.connection_state(), ConnectionState::Idle);
    assert!(!session.is_running());
    assert_eq!(session.game_socket_addr(), None);

    // The discovery socket bound before the failure is closed again.
    UdpSocket::bind((HOST_IP, ports.discovery)).expect("discovery port still held");
}

#[test]
fn test_game_socket_addr_follows_lifecycle() {
    let ports = next_ports();
    let mut session = Session::new(config(HOST_IP, CLIENT_IP, &ports));
    assert_eq!(session.game_socket_addr(), None);

    session.start_discovery().unwrap();
    assert_eq!(
        session.game_socket_addr(),
        Some(SocketAddr::V4(SocketAddrV4::new(HOST_IP, ports.game)))
    );

    session.stop();
    assert_eq!(session.game_socket_addr(), None);
}

#[test]
fn test_cleared_handlers_stop_firing_but_events_still_queue() {
    let (mut host, mut client) = pair(|_| {});
    let (inputs, on_input) = counter();
    host.on_input_received(move |_| on_input());
    connect(&mut host, &mut client);

    assert!(client.send_input(Velocity::UP, ActionFlags::empty(), 0.1));
    // Handlers run before the event is queued.
    wait_for_event(&host, 1_000, |e| matches!(e, SessionEvent::Input(_)))
        .expect("first input not queued");
    assert_eq!(inputs.load(Ordering::SeqCst), 1);

    host.clear_handlers();
    assert!(client.send_input(Velocity::DOWN, ActionFlags::empty(), 0.1));

    let event = wait_for_event(&host, 1_000, |e| matches!(e, SessionEvent::Input(_)))
        .expect("input not queued");
    let SessionEvent::Input(input) = event else {
        unreachable!();
    };
    assert_eq!(input.velocity, Velocity::DOWN);
    assert_eq!(inputs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sends_require_active_peer() {
    let (mut host, mut client) = pair(|_| {});
    assert!(!host.send_input(Velocity::UP, ActionFlags::empty(), 0.1));

    discover(&mut host, &mut client);
    assert!(!host.send_game_state(&GameStateSnapshot::default()));
    assert!(!host.send_start_command(StartKind::Start));
}
