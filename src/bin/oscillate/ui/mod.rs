//! Terminal transport for the player.

mod scope;
mod transport;

use std::time::Duration;

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};
use rtrb::Consumer;
use tracing::warn;

use oscillate::{dsp::Waveform, engine::Rack, runtime::Session, ParamValue};

use super::app::{clamp_speed, Patch};
use scope::render_scope;
use transport::{render_transport, TransportState};

/// Samples shown by the scope
const SCOPE_LEN: usize = 1024;

const SPEED_STEP: f64 = 0.25;

pub struct UiApp<'a> {
    session: &'a mut Session<Rack>,
    patch: Patch,
    /// Mono samples tapped from the audio callback
    scope_rx: Consumer<f32>,
    scope: Vec<f32>,
    title: String,
    sample_rate: f32,
    /// Last transport error, shown in the help bar
    status: Option<String>,
    should_quit: bool,
}

impl<'a> UiApp<'a> {
    pub fn new(
        session: &'a mut Session<Rack>,
        patch: Patch,
        scope_rx: Consumer<f32>,
        title: String,
        sample_rate: f32,
    ) -> Self {
        Self {
            session,
            patch,
            scope_rx,
            scope: vec![0.0; SCOPE_LEN],
            title,
            sample_rate,
            status: None,
            should_quit: false,
        }
    }

    /// Redraw at ~60fps until the user quits.
    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            self.poll_scope();

            let state = self.snapshot();
            terminal.draw(|frame| self.render(frame, &state))?;

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    fn poll_scope(&mut self) {
        let fresh = self.scope_rx.slots();
        if fresh == 0 {
            return;
        }
        while let Ok(sample) = self.scope_rx.pop() {
            self.scope.push(sample);
        }
        if self.scope.len() > SCOPE_LEN {
            let excess = self.scope.len() - SCOPE_LEN;
            self.scope.drain(..excess);
        }
    }

    fn snapshot(&self) -> TransportState {
        let playback = self.session.lock();
        let waveform = playback
            .graph
            .param(self.patch.oscillator, "waveform")
            .map(|value| value.to_string())
            .unwrap_or_default();

        TransportState {
            title: self.title.clone(),
            playing: playback.sequencer.is_playing(),
            position: playback.sequencer.song_position(),
            duration: playback.sequencer.duration(),
            progress: playback.sequencer.progress(),
            speed: playback.sequencer.playback_speed(),
            sounding: playback.sequencer.sounding_notes(),
            gain: playback.graph.meter(self.patch.envelope).unwrap_or(0.0),
            cutoff: playback.graph.meter(self.patch.filter).unwrap_or(0.0),
            waveform,
            sample_rate: self.sample_rate,
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char(' ') => match self.session.toggle() {
                Ok(_) => self.status = None,
                Err(err) => {
                    warn!(%err, "transport toggle failed");
                    self.status = Some(err.to_string());
                }
            },
            KeyCode::Char('+') | KeyCode::Char('=') => self.nudge_speed(SPEED_STEP),
            KeyCode::Char('-') | KeyCode::Char('_') => self.nudge_speed(-SPEED_STEP),
            KeyCode::Char('w') | KeyCode::Char('W') => self.cycle_waveform(),
            _ => {}
        }
    }

    fn nudge_speed(&mut self, step: f64) {
        let speed = self.session.lock().sequencer.playback_speed();
        self.session.set_playback_speed(clamp_speed(speed + step));
    }

    fn cycle_waveform(&mut self) {
        let mut playback = self.session.lock();
        let current = playback
            .graph
            .param(self.patch.oscillator, "waveform")
            .and_then(|value| value.as_choice().and_then(|name| name.parse::<Waveform>().ok()))
            .unwrap_or(Waveform::Sine);
        let index = Waveform::ALL.iter().position(|w| *w == current).unwrap_or(0);
        let next = Waveform::ALL[(index + 1) % Waveform::ALL.len()];

        if let Err(err) = playback.graph.set_param(
            self.patch.oscillator,
            "waveform",
            ParamValue::Choice(next.name().to_string()),
        ) {
            self.status = Some(err.to_string());
        }
    }

    fn render(&self, frame: &mut Frame, state: &TransportState) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5), // Transport
                Constraint::Min(8),    // Scope
                Constraint::Length(1), // Help bar
            ])
            .split(frame.area());

        render_transport(frame, chunks[0], state);
        render_scope(frame, chunks[1], &self.scope);

        let help = match &self.status {
            Some(message) => Paragraph::new(format!(" {message}")).style(Style::default().fg(Color::Red)),
            None => Paragraph::new(" [Space] Play/Stop  [+/-] Speed  [W] Waveform  [Q] Quit")
                .style(Style::default().fg(Color::DarkGray)),
        };
        frame.render_widget(help, chunks[2]);
    }
}
