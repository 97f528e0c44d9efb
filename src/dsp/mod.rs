//! Low-level DSP and control-rate primitives.
//!
//! The audio-rate pieces (filter, reverb, distortion, pitch) are
//! allocation-free once constructed and back the units of the in-process
//! rack. The control-rate pieces (envelope, automation) never run on the
//! render thread; they publish their output through [`param::AtomicF32`].

/// One-shot logarithmic filter sweep.
pub mod automation;
/// Soft-clipping waveshaper with presets.
pub mod distortion;
/// Paraphonic ADSR state machine driven by wall-clock ticks.
pub mod envelope;
/// State-variable filter used by the equalizer unit.
pub mod filter;
/// Waveform shapes shared by every note of an oscillator.
pub mod oscillator;
/// Lock-free parameter cells.
pub mod param;
/// Delay-line pitch shifter.
pub mod pitch;
/// Schroeder reverb with room presets.
pub mod reverb;

pub use envelope::EnvelopeState;
pub use oscillator::Waveform;
pub use param::AtomicF32;
