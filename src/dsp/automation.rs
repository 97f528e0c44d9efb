//! One-shot filter sweep.
//!
//! Each note-on (while enabled) restarts a sweep that lifts a parameter from
//! its lower bound to its upper bound and back over one cycle:
//!
//! ```text
//! value(p) = min * (max / min) ^ sin(p * π),   p ∈ [0, 1]
//! ```
//!
//! The interpolation is logarithmic because cutoff is perceived in octaves;
//! a linear sweep would spend most of its time in the top octave. The phase
//! advances by `1 / (duration * tick_rate)` per control tick, so the cycle
//! lasts `duration` seconds at any tick rate. When the phase reaches 1 the
//! sweep stops and the value rests at the lower bound until the next note.

/// Shortest sweep, at speed 1.
pub const MIN_SWEEP_SECONDS: f32 = 0.1;
/// Longest sweep, at speed 0.
pub const MAX_SWEEP_SECONDS: f32 = 4.0;

pub struct FilterAutomation {
    enabled: bool,
    speed: f32,
    tick_rate: f64,
    min_value: f32,
    max_value: f32,
    phase: Option<f32>,
    value: f32,
}

impl FilterAutomation {
    pub fn new(tick_rate: f64, min_value: f32, max_value: f32) -> Self {
        let min_value = min_value.max(f32::MIN_POSITIVE);
        Self {
            enabled: false,
            speed: 0.5,
            tick_rate: tick_rate.max(1.0),
            min_value,
            max_value: max_value.max(min_value),
            phase: None,
            value: min_value,
        }
    }

    /// Restart the sweep from the lower bound. No-op while disabled.
    pub fn note_on(&mut self) {
        if !self.enabled {
            return;
        }
        self.phase = Some(0.0);
        self.value = self.min_value;
    }

    /// Advance one control tick.
    ///
    /// Returns the value to publish, or `None` when no sweep is running.
    /// The tick that finishes a sweep publishes the lower bound.
    pub fn tick(&mut self) -> Option<f32> {
        let phase = self.phase? + self.phase_step();

        if phase >= 1.0 {
            self.phase = None;
            self.value = self.min_value;
        } else {
            self.phase = Some(phase);
            self.value = self.value_at(phase);
        }
        Some(self.value)
    }

    /// Value of the sweep curve at `phase` in [0, 1].
    pub fn value_at(&self, phase: f32) -> f32 {
        let shape = (phase.clamp(0.0, 1.0) * std::f32::consts::PI).sin();
        self.min_value * (self.max_value / self.min_value).powf(shape)
    }

    /// Turning automation off abandons a running sweep.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.phase = None;
        }
    }

    /// Sweep speed in [0, 1]; higher is shorter.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_nan() { 0.5 } else { speed.clamp(0.0, 1.0) };
    }

    pub fn set_tick_rate(&mut self, tick_rate: f64) {
        self.tick_rate = tick_rate.max(1.0);
    }

    /// Length of one sweep in seconds for the current speed.
    /// Exact at both ends of the speed range.
    pub fn duration(&self) -> f32 {
        MAX_SWEEP_SECONDS * (1.0 - self.speed) + MIN_SWEEP_SECONDS * self.speed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_sweeping(&self) -> bool {
        self.phase.is_some()
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn phase(&self) -> Option<f32> {
        self.phase
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min_value, self.max_value)
    }

    fn phase_step(&self) -> f32 {
        (1.0 / (self.duration() as f64 * self.tick_rate)) as f32
    }
}
