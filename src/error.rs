//! Error types for every fallible surface of the crate.

use thiserror::Error;

/// Failures that invalidate a whole MIDI file.
///
/// Problems local to one track never surface here: the track is cut short
/// and listed in [`MidiFile::truncated_tracks`](crate::io::midi::MidiFile).
#[derive(Debug, Error)]
pub enum MidiError {
    /// The file does not start with an `MThd` chunk.
    #[error("missing MThd header chunk")]
    BadHeader,
    /// A track chunk did not carry the `MTrk` tag.
    #[error("track {index} does not start with an MTrk tag")]
    BadTrackTag { index: usize },
    /// The buffer ended inside the header or a chunk prelude.
    #[error("unexpected end of data at byte {offset}")]
    Truncated { offset: usize },
    /// Time division of zero ticks per quarter note.
    #[error("time division has zero ticks per quarter note")]
    InvalidDivision,
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),
}

/// Refusals reported by an [`AudioBackend`](crate::engine::AudioBackend).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("unit {0} is not attached")]
    UnknownUnit(u64),
    #[error("unit {0} is already attached")]
    AlreadyAttached(u64),
    /// Routing the source into the destination would close a feedback loop.
    #[error("connecting unit {from} to {to} would form a cycle")]
    Cycle { from: u64, to: u64 },
    #[error("unit {0} cannot be routed that way")]
    InvalidRoute(u64),
    /// The render side stopped draining its command queue.
    #[error("render command queue is full")]
    QueueFull,
    #[error("no room for another unit (capacity {capacity})")]
    RackFull { capacity: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("no node with id {0}")]
    UnknownNode(u64),
    #[error("no parameter named `{0}`")]
    Unknown(String),
    #[error("parameter `{name}` does not accept that kind of value")]
    WrongKind { name: &'static str },
    #[error("`{value}` is not a valid choice for `{name}`")]
    InvalidChoice { name: &'static str, value: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("no MIDI events loaded")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot load {path}: config files need the `serde` feature")]
    FeatureDisabled { path: String },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to start the {name} task: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}
