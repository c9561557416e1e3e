//! Game channel receive loop, heartbeats and the inactivity monitor.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use super::Shared;
use super::dispatch::SessionEvent;
use super::scheduler::Cadence;
use super::state::ConnectionState;
use crate::net::{Endpoint, GameMessage, Heartbeat, HeartbeatKind, MAX_FRAME_SIZE, Message};

pub(crate) struct NetworkWorker {
    shared: Arc<Shared>,
    endpoint: Arc<Endpoint>,
    epoch: Instant,
    heartbeat: Cadence,
    /// The peer we are currently monitoring, once the session is connected.
    watching: Option<SocketAddrV4>,
    last_receive: Instant,
    buf: Vec<u8>,
}

impl NetworkWorker {
    pub fn new(shared: Arc<Shared>, endpoint: Arc<Endpoint>, epoch: Instant) -> Self {
        let heartbeat = Cadence::new(shared.config.heartbeat_interval());
        Self {
            shared,
            endpoint,
            epoch,
            heartbeat,
            watching: None,
            last_receive: Instant::now(),
            // One spare byte so oversized datagrams fail the size check.
            buf: vec![0; MAX_FRAME_SIZE + 1],
        }
    }

    pub fn run(mut self) {
        let mut last_tick = Instant::now();
        while self.shared.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            let delta = now - last_tick;
            last_tick = now;

            self.tick(now, delta);
            std::thread::sleep(self.shared.config.network_poll());
        }
        log::debug!("network thread exiting");
    }

    fn tick(&mut self, now: Instant, delta: std::time::Duration) {
        let peer = {
            let slots = self.shared.slots.lock();
            match (slots.state(), slots.active()) {
                (ConnectionState::Connected, Some(peer)) => Some(peer),
                _ => None,
            }
        };

        let Some(peer) = peer else {
            self.watching = None;
            self.discard_pending();
            return;
        };

        if self.watching != Some(peer) {
            self.watching = Some(peer);
            self.last_receive = now;
            self.heartbeat.reset();
            log::debug!("monitoring {}", peer);
        }

        if self.receive(peer) {
            self.last_receive = Instant::now();
        }

        if self.heartbeat.advance(delta) {
            self.send_heartbeat(peer, HeartbeatKind::Ping, self.now_ms());
        }

        let silent = self.last_receive.elapsed();
        if silent > self.shared.config.inactivity_timeout() {
            self.watching = None;
            let lost = self.shared.slots.lock().inactivity_timed_out();
            if let Some(lost) = lost {
                log::warn!(
                    "peer {} silent for {:.1}s, disconnecting",
                    lost,
                    silent.as_secs_f32()
                );
                self.shared.dispatch.emit(SessionEvent::Disconnected);
            }
        }
    }

    /// Drains the socket while no peer is active.
    fn discard_pending(&mut self) {
        while let Ok(Some(_)) = self.endpoint.poll(&mut self.buf) {
            self.shared.stats.record_dropped();
        }
    }

    /// Drains and handles every waiting datagram. Returns whether any of
    /// them decoded.
    fn receive(&mut self, peer: SocketAddrV4) -> bool {
        let mut heard = false;
        loop {
            let (size, from) = match self.endpoint.poll(&mut self.buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("game receive failed: {}", e);
                    break;
                }
            };

            if from.ip() != std::net::IpAddr::V4(*peer.ip()) {
                log::trace!("dropping game datagram from stranger {}", from);
                self.shared.stats.record_dropped();
                continue;
            }

            let decoded = match GameMessage::decode(&self.buf[..size]) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::trace!("dropping game datagram from {}: {}", from, e);
                    self.shared.stats.record_dropped();
                    continue;
                }
            };

            heard = true;
            if decoded.clamped > 0 {
                self.shared.stats.record_truncated();
            }
            self.handle(peer, decoded.message);
        }
        heard
    }

    fn handle(&mut self, peer: SocketAddrV4, message: GameMessage) {
        let event = match message {
            GameMessage::Input(input) => SessionEvent::Input(input),
            GameMessage::Start(command) => SessionEvent::GameStart(command),
            GameMessage::BoardDelta(delta) => SessionEvent::BoardDelta(delta),
            GameMessage::SnakeState(update) => SessionEvent::SnakeState(update),
            GameMessage::Snapshot(snapshot) => SessionEvent::GameState(snapshot),
            GameMessage::Heartbeat(heartbeat) => {
                self.handle_heartbeat(peer, heartbeat);
                return;
            }
        };
        self.shared.dispatch.emit(event);
    }

    fn handle_heartbeat(&mut self, peer: SocketAddrV4, heartbeat: Heartbeat) {
        match heartbeat.kind {
            HeartbeatKind::Ping => {
                self.send_heartbeat(peer, HeartbeatKind::Pong, heartbeat.timestamp_ms);
            }
            HeartbeatKind::Pong => {
                let rtt = self.now_ms().saturating_sub(heartbeat.timestamp_ms);
                self.shared.stats.record_rtt(rtt);
            }
        }
    }

    fn send_heartbeat(&self, peer: SocketAddrV4, kind: HeartbeatKind, timestamp_ms: u64) {
        let frame = Heartbeat { kind, timestamp_ms }.encode();
        self.endpoint.send_to(&frame, SocketAddr::V4(peer));
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
