pub mod clock;
pub mod config;
pub mod dsp; // Waveforms, envelopes, automation and the audio-unit primitives
pub mod engine; // Audio backend seam and the in-process rack
pub mod error;
pub mod graph; // Patchable node graph
pub mod io;
pub mod runtime; // Periodic control tasks and the session that owns them
pub mod sequencing; // MIDI file playback
pub mod synth; // Polyphonic oscillator core

pub const MAX_BLOCK_SIZE: usize = 2048;
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;
pub(crate) const MIN_TIME: f32 = 0.01;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{BackendError, ConfigError, MidiError, ParamError, RuntimeError, SequencerError};
pub use graph::{Capabilities, ConnectionId, NodeGraph, NodeId, NodeKind, ParamValue, Position};
pub use io::midi::{MidiEvent, MidiEventKind, MidiFile};
pub use sequencing::{MidiSequencer, NoteHandler};
pub use synth::oscillator::OscillatorCore;
