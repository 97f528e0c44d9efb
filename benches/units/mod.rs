mod control;
mod midi;
mod oscillator;

pub use control::{bench_automation, bench_envelope};
pub use midi::bench_midi;
pub use oscillator::bench_oscillator;
