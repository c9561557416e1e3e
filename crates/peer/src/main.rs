mod app;
mod config;
mod game;
mod tui;

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use snakelink::{ActionFlags, ConnectionState, NetworkRole, Velocity};

use app::{Notice, Peer};
use config::PeerConfig;
use tui::EventLog;

const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "snakelink-peer")]
#[command(about = "Two-player snake over the LAN")]
struct Args {
    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Address to bind both sockets to")]
    bind: Option<Ipv4Addr>,

    #[arg(long, help = "Address to present to the peer when bound to 0.0.0.0")]
    advertise: Option<Ipv4Addr>,

    #[arg(long, help = "Announce target instead of the broadcast address")]
    announce: Option<SocketAddrV4>,

    #[arg(long)]
    discovery_port: Option<u16>,

    #[arg(long)]
    game_port: Option<u16>,

    #[arg(long, help = "Give up searching after this many seconds")]
    search_timeout: Option<u64>,

    #[arg(long, help = "Outbound game packet loss percentage (0-100)")]
    loss_percent: Option<f32>,

    #[arg(long, help = "Accept the first peer found")]
    auto_accept: bool,

    #[arg(long, help = "Log to stderr instead of drawing the TUI; implies --auto-accept")]
    headless: bool,
}

impl Args {
    fn into_config(self) -> Result<PeerConfig> {
        let mut config = match &self.config {
            Some(path) => PeerConfig::load(path)?,
            None => PeerConfig::default(),
        };

        let session = &mut config.session;
        if let Some(bind) = self.bind {
            session.bind_addr = bind;
        }
        if let Some(advertise) = self.advertise {
            session.advertised_addr = Some(advertise);
        }
        if let Some(announce) = self.announce {
            session.announce_addr = Some(announce);
        }
        if let Some(port) = self.discovery_port {
            session.discovery_port = port;
        }
        if let Some(port) = self.game_port {
            session.game_port = port;
        }
        if let Some(secs) = self.search_timeout {
            session.search_timeout_ms = Some(secs * 1000);
        }
        if let Some(loss) = self.loss_percent {
            session.simulated_loss_percent = loss.clamp(0.0, 100.0);
        }
        config.auto_accept |= self.auto_accept || self.headless;

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let headless = args.headless;
    let config = args.into_config()?;

    let mut peer = Peer::new(config);

    if headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        peer.start()?;
        run_headless(&mut peer);
    } else {
        peer.start()?;
        run_with_tui(&mut peer)?;
    }

    peer.stop();
    Ok(())
}

fn report(notices: &mut Vec<Notice>) {
    for notice in notices.drain(..) {
        match notice {
            Notice::Info(text) => log::info!("{}", text),
            Notice::Warn(text) => log::warn!("{}", text),
        }
    }
}

/// Auto-pilot: the host starts a round on connect and after every crash,
/// the client turns every couple of seconds.
fn run_headless(peer: &mut Peer) {
    let turns = [Velocity::UP, Velocity::LEFT, Velocity::DOWN, Velocity::RIGHT];
    let mut notices = Vec::new();
    let mut last = Instant::now();
    let mut since_turn = Duration::ZERO;
    let mut turn = 0;
    let mut was_connected = false;

    loop {
        let now = Instant::now();
        let dt = now - last;
        last = now;

        peer.update(dt, &mut notices);

        let session = peer.session();
        let connected = session.connection_state() == ConnectionState::Connected;
        let role = session.role();
        if connected && role == NetworkRole::Host && (!was_connected || peer.game().is_over()) {
            peer.request_start(&mut notices);
        }
        if connected && role == NetworkRole::Client {
            since_turn += dt;
            if since_turn >= Duration::from_secs(2) {
                since_turn = Duration::ZERO;
                turn = (turn + 1) % turns.len();
                peer.steer(turns[turn]);
            }
        }
        was_connected = connected;

        if peer.session().connection_state() == ConnectionState::Disconnected {
            if let Err(e) = peer.restart_search() {
                log::error!("failed to restart discovery: {}", e);
                break;
            }
            log::info!("searching again");
        }

        report(&mut notices);
        std::thread::sleep(FRAME);
    }
}

fn run_with_tui(peer: &mut Peer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut log = EventLog::new();
    let game_socket = peer
        .session()
        .game_socket_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "-".into());
    log.info(format!(
        "searching as {} (discovery port {}, game socket {})",
        peer.session().local_address(),
        peer.session().config().discovery_port,
        game_socket
    ));

    let mut notices = Vec::new();
    let mut last = Instant::now();
    let mut running = true;

    while running {
        let now = Instant::now();
        peer.update(now - last, &mut notices);
        last = now;

        if event::poll(FRAME)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    running = handle_key(peer, key.code, key.modifiers, &mut notices);
                }
            }
        }

        for notice in notices.drain(..) {
            log.push(notice);
        }

        terminal.draw(|frame| {
            tui::render(frame, peer, &log);
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_key(
    peer: &mut Peer,
    code: KeyCode,
    modifiers: KeyModifiers,
    notices: &mut Vec<Notice>,
) -> bool {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return false;
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Up => peer.steer(Velocity::UP),
        KeyCode::Down => peer.steer(Velocity::DOWN),
        KeyCode::Left => peer.steer(Velocity::LEFT),
        KeyCode::Right => peer.steer(Velocity::RIGHT),
        KeyCode::Char(' ') => peer.press(ActionFlags::JUMP),
        KeyCode::Char('+') | KeyCode::Char('=') => peer.press(ActionFlags::FASTER),
        KeyCode::Char('-') => peer.press(ActionFlags::SLOWER),
        KeyCode::Char('x') => peer.press(ActionFlags::STALL),
        KeyCode::Char('a') => {
            if !peer.accept() {
                notices.push(Notice::Warn("no peer to accept".into()));
            }
        }
        KeyCode::Char('d') => {
            if peer.decline() {
                notices.push(Notice::Info("declined, searching again".into()));
            }
        }
        KeyCode::Char('s') => peer.request_start(notices),
        KeyCode::Char('r') => match peer.restart_search() {
            Ok(()) => notices.push(Notice::Info("searching again".into())),
            Err(e) => notices.push(Notice::Warn(e.to_string())),
        },
        _ => {}
    }
    true
}
