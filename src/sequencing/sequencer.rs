//! MIDI file playback against wall-clock time.
//!
//! The sequencer owns a time-ordered event list and a cursor into it. Each
//! `tick` measures the time since the previous tick, advances the song
//! position by that much scaled by the playback speed, and dispatches every
//! event whose timestamp has been reached. It never sleeps; something else
//! (the runtime's periodic task, a test) calls `tick`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{MidiError, SequencerError};
use crate::io::midi::{self, note_to_frequency, MidiEvent, MidiEventKind, MidiFile};

/// Receives the notes a sequencer dispatches.
pub trait NoteHandler {
    fn note_on(&mut self, frequency: f32);
    fn note_off(&mut self, frequency: f32);
}

/// A [`NoteHandler`] made from two closures.
pub struct NoteCallbacks<On, Off> {
    pub on: On,
    pub off: Off,
}

impl<On, Off> NoteCallbacks<On, Off>
where
    On: FnMut(f32),
    Off: FnMut(f32),
{
    pub fn new(on: On, off: Off) -> Self {
        Self { on, off }
    }
}

impl<On, Off> NoteHandler for NoteCallbacks<On, Off>
where
    On: FnMut(f32),
    Off: FnMut(f32),
{
    fn note_on(&mut self, frequency: f32) {
        (self.on)(frequency)
    }

    fn note_off(&mut self, frequency: f32) {
        (self.off)(frequency)
    }
}

/// Where playback is and how fast it moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    /// Song position in seconds
    pub position: f64,
    /// Index of the next event to dispatch
    pub index: usize,
    /// Multiplier on elapsed wall-clock time
    pub speed: f64,
    /// Clock reading at the previous tick
    last_tick: f64,
}

impl PlaybackCursor {
    fn new() -> Self {
        Self {
            position: 0.0,
            index: 0,
            speed: 1.0,
            last_tick: 0.0,
        }
    }

    fn rewind(&mut self, now: f64) {
        self.position = 0.0;
        self.index = 0;
        self.last_tick = now;
    }
}

pub struct MidiSequencer {
    clock: Arc<dyn Clock>,
    events: Vec<MidiEvent>,
    cursor: PlaybackCursor,
    playing: bool,
    /// Note-ons dispatched and not yet matched by a note-off, per note.
    sounding: [u16; 128],
    /// Set by a restart; the next tick releases `sounding` first.
    release_pending: bool,
}

impl MidiSequencer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            events: Vec::new(),
            cursor: PlaybackCursor::new(),
            playing: false,
            sounding: [0; 128],
            release_pending: false,
        }
    }

    /// Replace the event list and rewind. Playback stops; notes already
    /// sounding stay tracked so a later [`stop`](Self::stop) or
    /// [`flush`](Self::flush) can release them.
    pub fn load(&mut self, mut events: Vec<MidiEvent>) {
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.events = events;
        self.playing = false;
        self.cursor.rewind(self.clock.now());
        info!(events = self.events.len(), duration = self.duration(), "sequence loaded");
    }

    /// Parse a file from disk and load its events.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<MidiFile, MidiError> {
        let file = midi::parse_file(path)?;
        self.load(file.events.clone());
        Ok(file)
    }

    /// Start from the top. Notes still sounding from an earlier run are
    /// released at the next [`tick`](Self::tick), before anything new plays.
    pub fn play(&mut self) -> Result<(), SequencerError> {
        if self.events.is_empty() {
            return Err(SequencerError::Empty);
        }
        self.release_pending = self.sounding_notes() > 0;
        self.cursor.rewind(self.clock.now());
        self.playing = true;
        info!(speed = self.cursor.speed, "playback started");
        Ok(())
    }

    /// Stop and release every note this sequencer left sounding.
    pub fn stop(&mut self, handler: &mut impl NoteHandler) {
        if self.playing {
            self.playing = false;
            info!(position = self.cursor.position, "playback stopped");
        }
        self.flush(handler);
    }

    /// Play when stopped, stop when playing. Returns whether it now plays.
    pub fn toggle(&mut self, handler: &mut impl NoteHandler) -> Result<bool, SequencerError> {
        if self.playing {
            self.stop(handler);
            Ok(false)
        } else {
            self.play()?;
            Ok(true)
        }
    }

    /// Send a note-off for each note-on that has not been matched yet.
    pub fn flush(&mut self, handler: &mut impl NoteHandler) -> usize {
        let mut released = 0;
        for (note, count) in self.sounding.iter_mut().enumerate() {
            let frequency = note_to_frequency(note as u8);
            for _ in 0..*count {
                handler.note_off(frequency);
                released += 1;
            }
            *count = 0;
        }
        self.release_pending = false;
        if released > 0 {
            debug!(released, "flushed sounding notes");
        }
        released
    }

    /// Advance by the wall-clock time since the previous tick and dispatch
    /// every event that is now due. Returns how many were dispatched.
    pub fn tick(&mut self, handler: &mut impl NoteHandler) -> usize {
        if !self.playing {
            return 0;
        }
        if self.release_pending {
            self.flush(handler);
        }

        let now = self.clock.now();
        let delta = (now - self.cursor.last_tick).max(0.0);
        self.cursor.last_tick = now;
        self.cursor.position += delta * self.cursor.speed;

        let mut dispatched = 0;
        while let Some(event) = self.events.get(self.cursor.index) {
            if event.timestamp > self.cursor.position {
                break;
            }
            let note = usize::from(event.note & 0x7F);
            match event.kind {
                MidiEventKind::NoteOn => {
                    self.sounding[note] = self.sounding[note].saturating_add(1);
                    handler.note_on(event.frequency());
                }
                MidiEventKind::NoteOff => {
                    self.sounding[note] = self.sounding[note].saturating_sub(1);
                    handler.note_off(event.frequency());
                }
            }
            self.cursor.index += 1;
            dispatched += 1;
        }

        if self.cursor.index >= self.events.len() {
            self.playing = false;
            self.flush(handler);
            info!(position = self.cursor.position, "playback finished");
        }
        dispatched
    }

    /// Takes effect on the next tick. Negative speeds stop time; NaN and
    /// infinities are ignored.
    pub fn set_playback_speed(&mut self, speed: f64) {
        if speed.is_finite() {
            self.cursor.speed = speed.max(0.0);
        }
    }

    pub fn playback_speed(&self) -> f64 {
        self.cursor.speed
    }

    pub fn song_position(&self) -> f64 {
        self.cursor.position
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Song position as a fraction of the duration, 0 when nothing is loaded.
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            (self.cursor.position / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Timestamp of the last event.
    pub fn duration(&self) -> f64 {
        self.events.last().map_or(0.0, |event| event.timestamp)
    }

    /// Notes currently held by this sequencer.
    pub fn sounding_notes(&self) -> usize {
        self.sounding.iter().map(|&count| usize::from(count)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(MidiEventKind, f32)>,
    }

    impl NoteHandler for Recorder {
        fn note_on(&mut self, frequency: f32) {
            self.calls.push((MidiEventKind::NoteOn, frequency));
        }

        fn note_off(&mut self, frequency: f32) {
            self.calls.push((MidiEventKind::NoteOff, frequency));
        }
    }

    fn sequencer(events: Vec<MidiEvent>) -> (MidiSequencer, ManualClock) {
        let clock = ManualClock::new();
        let mut seq = MidiSequencer::new(Arc::new(clock.clone()));
        seq.load(events);
        (seq, clock)
    }

    #[test]
    fn test_play_requires_events() {
        let (mut seq, _) = sequencer(Vec::new());
        assert_eq!(seq.play(), Err(SequencerError::Empty));
        assert!(!seq.is_playing());
    }

    #[test]
    fn test_dispatches_each_event_once_when_due() {
        let (mut seq, clock) = sequencer(vec![
            MidiEvent::note_on(0.0, 69, 100),
            MidiEvent::note_off(1.0, 69),
        ]);
        let mut rec = Recorder::default();
        seq.play().unwrap();

        assert_eq!(seq.tick(&mut rec), 1);
        assert_eq!(rec.calls, vec![(MidiEventKind::NoteOn, 440.0)]);

        clock.advance(0.5);
        assert_eq!(seq.tick(&mut rec), 0);
        assert!(seq.is_playing());

        clock.advance(0.5);
        assert_eq!(seq.tick(&mut rec), 1);
        assert_eq!(
            rec.calls,
            vec![(MidiEventKind::NoteOn, 440.0), (MidiEventKind::NoteOff, 440.0)]
        );
        assert!(!seq.is_playing());

        clock.advance(1.0);
        assert_eq!(seq.tick(&mut rec), 0);
        assert_eq!(rec.calls.len(), 2);
    }

    #[test]
    fn test_speed_scales_elapsed_time() {
        let (mut seq, clock) = sequencer(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_off(2.0, 60),
        ]);
        let mut rec = Recorder::default();
        seq.set_playback_speed(2.0);
        seq.play().unwrap();
        seq.tick(&mut rec);

        clock.advance(1.0);
        seq.tick(&mut rec);
        assert_eq!(seq.song_position(), 2.0);
        assert_eq!(rec.calls.len(), 2);
    }

    #[test]
    fn test_speed_rejects_nonsense() {
        let (mut seq, _) = sequencer(Vec::new());
        seq.set_playback_speed(f64::NAN);
        assert_eq!(seq.playback_speed(), 1.0);
        seq.set_playback_speed(-3.0);
        assert_eq!(seq.playback_speed(), 0.0);
        seq.set_playback_speed(f64::INFINITY);
        assert_eq!(seq.playback_speed(), 0.0);
    }

    #[test]
    fn test_stop_releases_sounding_notes() {
        let (mut seq, clock) = sequencer(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_on(0.0, 64, 100),
            MidiEvent::note_off(0.5, 64),
            MidiEvent::note_off(4.0, 60),
        ]);
        let mut rec = Recorder::default();
        seq.play().unwrap();
        clock.advance(1.0);
        seq.tick(&mut rec);
        assert_eq!(seq.sounding_notes(), 1);

        seq.stop(&mut rec);
        assert!(!seq.is_playing());
        assert_eq!(seq.sounding_notes(), 0);
        assert_eq!(
            rec.calls.last(),
            Some(&(MidiEventKind::NoteOff, note_to_frequency(60)))
        );
        assert_eq!(rec.calls.len(), 4);
    }

    #[test]
    fn test_end_of_list_flushes_unmatched_note_ons() {
        let (mut seq, _) = sequencer(vec![MidiEvent::note_on(0.0, 72, 100)]);
        let mut rec = Recorder::default();
        seq.play().unwrap();
        seq.tick(&mut rec);
        assert!(!seq.is_playing());
        assert_eq!(
            rec.calls,
            vec![
                (MidiEventKind::NoteOn, note_to_frequency(72)),
                (MidiEventKind::NoteOff, note_to_frequency(72)),
            ]
        );
    }

    #[test]
    fn test_toggle_and_progress() {
        let (mut seq, clock) = sequencer(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_off(4.0, 60),
        ]);
        let mut rec = Recorder::default();
        assert_eq!(seq.toggle(&mut rec), Ok(true));
        clock.advance(1.0);
        seq.tick(&mut rec);
        assert_eq!(seq.progress(), 0.25);

        assert_eq!(seq.toggle(&mut rec), Ok(false));
        assert_eq!(rec.calls.len(), 2);

        // Restarting rewinds.
        assert_eq!(seq.toggle(&mut rec), Ok(true));
        assert_eq!(seq.song_position(), 0.0);
    }

    #[test]
    fn test_restart_releases_notes_from_the_previous_run() {
        let (mut seq, clock) = sequencer(vec![
            MidiEvent::note_on(0.0, 60, 100),
            MidiEvent::note_off(4.0, 60),
        ]);
        let mut rec = Recorder::default();
        seq.play().unwrap();
        seq.tick(&mut rec);
        assert_eq!(seq.sounding_notes(), 1);

        clock.advance(1.0);
        seq.play().unwrap();
        seq.tick(&mut rec);

        let c4 = note_to_frequency(60);
        assert_eq!(
            rec.calls,
            vec![
                (MidiEventKind::NoteOn, c4),
                (MidiEventKind::NoteOff, c4),
                (MidiEventKind::NoteOn, c4),
            ]
        );
        assert_eq!(seq.sounding_notes(), 1);
    }

    #[test]
    fn test_closures_as_handler() {
        let (mut seq, _) = sequencer(vec![MidiEvent::note_on(0.0, 69, 100)]);
        let mut ons = Vec::new();
        let mut offs = 0;
        {
            let mut handler = NoteCallbacks::new(|f| ons.push(f), |_| offs += 1);
            seq.play().unwrap();
            seq.tick(&mut handler);
        }
        assert_eq!(ons, vec![440.0]);
        assert_eq!(offs, 1);
    }
}
