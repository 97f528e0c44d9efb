//! Transport panel: play state, position, speed and the patch meters.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

/// What the panel shows, copied out of the session once per frame.
pub struct TransportState {
    pub title: String,
    pub playing: bool,
    /// Seconds
    pub position: f64,
    pub duration: f64,
    pub progress: f64,
    pub speed: f64,
    pub sounding: usize,
    /// Envelope gain (0.0-1.0)
    pub gain: f32,
    /// Filter cutoff in Hz
    pub cutoff: f32,
    pub waveform: String,
    pub sample_rate: f32,
}

fn clock(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    format!("{}:{:05.2}", (seconds / 60.0).floor() as u64, seconds % 60.0)
}

pub fn render_transport(frame: &mut Frame, area: Rect, state: &TransportState) {
    let block = Block::default()
        .title(format!(" oscillate - {} ", state.title))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let (symbol, label, color) = if state.playing {
        ("▶", "Playing", Color::Green)
    } else {
        ("■", "Stopped", Color::Yellow)
    };

    let status = Line::from(vec![
        Span::styled(format!(" {symbol} {label}  "), Style::default().fg(color)),
        Span::styled(
            format!("{} / {}  ", clock(state.position), clock(state.duration)),
            Style::default().fg(Color::White),
        ),
        Span::styled(format!("x{:.2}  ", state.speed), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("{:.1}kHz", state.sample_rate / 1000.0),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(status), rows[0]);

    let meters = Line::from(vec![
        Span::styled(format!(" {}  ", state.waveform), Style::default().fg(Color::Magenta)),
        Span::raw(format!("notes {:>2}  ", state.sounding)),
        Span::raw(format!("gain {:.2}  ", state.gain)),
        Span::raw(format!("cutoff {:>7.1} Hz", state.cutoff)),
    ]);
    frame.render_widget(Paragraph::new(meters), rows[1]);

    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(state.progress.clamp(0.0, 1.0));
    frame.render_widget(gauge, rows[2]);
}
