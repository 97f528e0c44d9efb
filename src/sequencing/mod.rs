//! Time-driven playback of parsed MIDI files.

pub mod sequencer;

pub use sequencer::{MidiSequencer, NoteCallbacks, NoteHandler, PlaybackCursor};
