use std::io;
use std::net::SocketAddrV4;
use std::time::Duration;

use crate::net::Channel;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is already running")]
    AlreadyRunning,
    #[error("failed to bind {channel} socket on {addr}: {source}")]
    Bind {
        channel: Channel,
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure {channel} socket: {source}")]
    Socket {
        channel: Channel,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no peer accepted within {:.1}s", .0.as_secs_f32())]
    SearchTimeout(Duration),
}
