//! The audio backend seam.
//!
//! The node graph never touches samples. It hands each node's processing
//! unit to an [`AudioBackend`] and asks the backend to route units into one
//! another; the backend owns the render side and the final output gate.
//! [`Rack`] is the in-process implementation.

pub mod rack;
pub mod units;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::dsp::AtomicF32;
use crate::error::BackendError;
use crate::synth::OscillatorCore;

pub use rack::{Rack, RackRenderer};
pub use units::{DistortionParams, EqualizerParams, PeakParams, PitchParams, ReverbParams};

static NEXT_UNIT: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity of a processing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    pub fn next() -> Self {
        Self(NEXT_UNIT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// What a unit does, plus the shared parameter cells the control side
/// writes and the render side reads.
#[derive(Clone)]
pub enum ProcessingUnit {
    /// Polyphonic generator; ignores its inputs.
    Source(OscillatorCore),
    /// Sums its inputs and scales them by a gain.
    Mixer(Arc<AtomicF32>),
    Equalizer(Arc<EqualizerParams>),
    /// Single-band peaking EQ.
    ParametricEq(Arc<PeakParams>),
    Reverb(Arc<ReverbParams>),
    Distortion(Arc<DistortionParams>),
    TimePitch(Arc<PitchParams>),
    /// The backend's final output gate.
    Output(Arc<AtomicF32>),
}

impl ProcessingUnit {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingUnit::Source(_) => "source",
            ProcessingUnit::Mixer(_) => "mixer",
            ProcessingUnit::Equalizer(_) => "equalizer",
            ProcessingUnit::ParametricEq(_) => "parametric_eq",
            ProcessingUnit::Reverb(_) => "reverb",
            ProcessingUnit::Distortion(_) => "distortion",
            ProcessingUnit::TimePitch(_) => "time_pitch",
            ProcessingUnit::Output(_) => "output",
        }
    }
}

/// Opaque handle to a processing unit. The node that creates it owns it;
/// the backend keeps a clone while the unit is attached.
#[derive(Clone)]
pub struct UnitHandle {
    id: UnitId,
    unit: ProcessingUnit,
}

impl UnitHandle {
    pub fn new(unit: ProcessingUnit) -> Self {
        Self {
            id: UnitId::next(),
            unit,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn unit(&self) -> &ProcessingUnit {
        &self.unit
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("id", &self.id)
            .field("unit", &self.unit.name())
            .finish()
    }
}

/// Host audio pipeline as seen from the graph.
///
/// Routing is directed: `connect(a, b)` feeds `a`'s output into `b`. A unit
/// may feed several destinations and a destination sums everything routed
/// into it.
pub trait AudioBackend: Send {
    /// Rate the backend renders at.
    fn sample_rate(&self) -> f32;

    /// Handle to the output gate. Always attached, never detachable.
    fn output(&self) -> UnitHandle;

    fn attach(&mut self, unit: &UnitHandle) -> Result<(), BackendError>;

    /// Remove a unit together with every route into or out of it. On error
    /// nothing changed.
    fn detach(&mut self, unit: UnitId) -> Result<(), BackendError>;

    fn connect(&mut self, source: UnitId, dest: UnitId) -> Result<(), BackendError>;

    /// Drop the single route from `source` into `dest`; other routes out of
    /// `source` stay. Dropping a route that does not exist is `Ok`.
    fn disconnect(&mut self, source: UnitId, dest: UnitId) -> Result<(), BackendError>;

    /// Drop every route leaving `source`.
    fn disconnect_output(&mut self, source: UnitId) -> Result<(), BackendError>;
}
