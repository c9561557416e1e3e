use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use snakelink::{ConnectionState, Location, NetworkStats};

use crate::app::{Notice, Peer};

const LOG_CAPACITY: usize = 200;

pub struct EventLog {
    lines: VecDeque<Notice>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    pub fn push(&mut self, notice: Notice) {
        if self.lines.len() == LOG_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(notice);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Notice::Info(message.into()));
    }
}

pub fn render(frame: &mut Frame, peer: &Peer, log: &EventLog) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], peer);
    render_board(frame, chunks[1], peer);
    render_network(frame, chunks[2], &peer.session().stats());
    render_log(frame, chunks[3], log);
    render_help(frame, chunks[4]);
}

fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Idle => Color::DarkGray,
        ConnectionState::Discovering => Color::Yellow,
        ConnectionState::WaitingForPeer => Color::Magenta,
        ConnectionState::Connected => Color::Green,
        ConnectionState::Disconnected => Color::Red,
    }
}

fn render_header(frame: &mut Frame, area: Rect, peer: &Peer) {
    let session = peer.session();
    let state = session.connection_state();

    let block = Block::default()
        .title(" snakelink peer ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let peer_addr = session
        .peer_address()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "-".into());
    let [p1, p2] = peer.game().scores();

    let line = Line::from(vec![
        Span::styled(state.as_str(), Style::default().fg(state_color(state))),
        Span::raw(format!(
            "  |  role: {}  |  local: {}  |  peer: {}  |  score {} : {}",
            session.role().as_str(),
            session.local_address(),
            peer_addr,
            p1,
            p2
        )),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_board(frame: &mut Frame, area: Rect, peer: &Peer) {
    let game = peer.game();
    let settings = game.settings();
    let title = if game.is_over() {
        format!(" Board - crashed: {:?} ", game.crashed())
    } else {
        " Board ".to_string()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let width = settings.width.max(0) as usize;
    let height = settings.height.max(0) as usize;
    let mut grid = vec![vec![' '; width]; height];
    let mut plot = |at: Location, glyph: char| {
        let (Ok(x), Ok(y)) = (usize::try_from(at.x), usize::try_from(at.y)) else {
            return;
        };
        if let Some(cell) = grid.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = glyph;
        }
    };

    for food in game.food() {
        plot(*food, '*');
    }
    for (snake, glyph) in game.snakes().iter().zip(['o', 'x']) {
        for segment in snake.body() {
            plot(segment, glyph);
        }
        if let Some(head) = snake.head() {
            plot(head, glyph.to_ascii_uppercase());
        }
    }

    let lines: Vec<Line> = grid
        .into_iter()
        .map(|row| Line::from(row.into_iter().collect::<String>()))
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &NetworkStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));
    let value = |text: String| Span::styled(text, Style::default().fg(Color::White));

    let lines = vec![
        Line::from(vec![
            label("Packets: "),
            value(format!(
                "{} sent / {} recv / {} dropped",
                stats.packets_sent, stats.packets_received, stats.packets_dropped
            )),
        ]),
        Line::from(vec![
            label("Bytes: "),
            value(format!(
                "{} sent / {} recv",
                format_bytes(stats.bytes_sent),
                format_bytes(stats.bytes_received)
            )),
        ]),
        Line::from(vec![
            label("RTT: "),
            value(match stats.rtt_ms {
                Some(rtt) => format!("{}ms", rtt),
                None => "-".into(),
            }),
            label("  Truncated: "),
            value(stats.truncated_frames.to_string()),
            label("  Sim. lost: "),
            value(stats.packets_simulated_lost.to_string()),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, log: &EventLog) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = log
        .lines
        .iter()
        .skip(log.lines.len().saturating_sub(visible))
        .map(|notice| match notice {
            Notice::Info(text) => Line::styled(text.clone(), Style::default().fg(Color::White)),
            Notice::Warn(text) => Line::styled(text.clone(), Style::default().fg(Color::Red)),
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new(
        "arrows steer | space jump | +/- speed | x stall | a accept | d decline | s start | r search | q quit",
    )
    .block(block)
    .style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    frame.render_widget(text, area);
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
