// Purpose: the polyphonic signal source that every patch starts from.
// Notes come in from the control side; samples go out on the render side.

pub mod oscillator;

pub use oscillator::{ActiveNote, OscillatorCore, MAX_POLYPHONY};
