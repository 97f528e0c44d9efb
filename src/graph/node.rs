use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::UnitHandle;
use crate::error::ParamError;
use crate::graph::params::{ParamSpec, ParamValue};

/// Identity of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Oscillator,
    Envelope,
    Filter,
    Reverb,
    Distortion,
    Pitch,
    Resonance,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Oscillator,
        NodeKind::Envelope,
        NodeKind::Filter,
        NodeKind::Reverb,
        NodeKind::Distortion,
        NodeKind::Pitch,
        NodeKind::Resonance,
        NodeKind::Output,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Oscillator => "oscillator",
            NodeKind::Envelope => "envelope",
            NodeKind::Filter => "filter",
            NodeKind::Reverb => "reverb",
            NodeKind::Distortion => "distortion",
            NodeKind::Pitch => "pitch",
            NodeKind::Resonance => "resonance",
            NodeKind::Output => "output",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oscillator" | "osc" => Ok(NodeKind::Oscillator),
            "envelope" | "adsr" => Ok(NodeKind::Envelope),
            "filter" => Ok(NodeKind::Filter),
            "reverb" => Ok(NodeKind::Reverb),
            "distortion" => Ok(NodeKind::Distortion),
            "pitch" => Ok(NodeKind::Pitch),
            "resonance" | "peak" => Ok(NodeKind::Resonance),
            "output" => Ok(NodeKind::Output),
            other => Err(format!("unknown node kind `{other}`")),
        }
    }
}

/// Where a node sits on the canvas. Only the UI cares.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The set of capability traits a node implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const NOTE_REACTIVE: Self = Self(1);
    pub const AUTOMATABLE: Self = Self(1 << 1);
    pub const RENDERABLE: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Responds to keys going down and up.
pub trait NoteReactive {
    fn note_on(&mut self, frequency: f32, now: f64);
    fn note_off(&mut self, frequency: f32, now: f64);
    /// Release everything that is held.
    fn all_notes_off(&mut self, now: f64);
}

/// Has state that moves on the control-rate tick.
pub trait Automatable {
    fn tick(&mut self, now: f64);
}

/// Produces audio itself rather than shaping its input.
pub trait Renderable {
    fn render(&self, out: &mut [f32], channels: usize);
}

/// One kind of node: its processing unit, capabilities and parameters.
///
/// Capability accessors default to `None`; a processor overrides the ones
/// it implements and reports the same set from [`capabilities`].
///
/// [`capabilities`]: NodeProcessor::capabilities
pub trait NodeProcessor: Send {
    fn kind(&self) -> NodeKind;

    fn unit(&self) -> &UnitHandle;

    fn capabilities(&self) -> Capabilities;

    fn as_note_reactive(&mut self) -> Option<&mut dyn NoteReactive> {
        None
    }

    fn as_automatable(&mut self) -> Option<&mut dyn Automatable> {
        None
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }

    fn params(&self) -> &'static [ParamSpec];

    fn param(&self, name: &str) -> Option<ParamValue>;

    /// Out-of-range numbers are clamped; only an unknown name or the wrong
    /// kind of value is an error.
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<(), ParamError>;

    /// A live reading for displays: envelope gain, swept cutoff.
    fn meter(&self) -> Option<f32> {
        None
    }
}
