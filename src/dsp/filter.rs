use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Topology-preserving (trapezoidal) state-variable filter. One structure gives
low-, high- and band-pass outputs from the same two integrators:

| mode      | passes          | rejects         |
| --------- | --------------- | --------------- |
| low-pass  | below cutoff    | above cutoff    |
| high-pass | above cutoff    | below cutoff    |
| band-pass | around cutoff   | both sides      |

Resonance is exposed on a 0..10 scale and mapped onto the damping term
`k = 2 - 2r` with r in [0, 0.95]; r never reaches 1 so the filter cannot
self-oscillate into instability.

The peaking (bell) filter reuses the same integrators and adds a scaled
band-pass back onto the input:

    A  = 10^(gain_db / 40)
    Q  = sqrt(2^bw) / (2^bw - 1)        bw = bandwidth in octaves
    k  = 1 / (Q * A)
    y  = x + k * (A^2 - 1) * band

At the centre frequency the band-pass output is x / k, so y = A^2 * x,
which is exactly `gain_db` of boost.
*/

pub const MIN_CUTOFF: f32 = 20.0;
pub const MAX_CUTOFF: f32 = 20_000.0;
pub const MAX_RESONANCE: f32 = 10.0;

pub const MAX_PEAK_FREQUENCY: f32 = 15_000.0;
pub const MAX_PEAK_GAIN_DB: f32 = 24.0;
pub const MIN_BANDWIDTH: f32 = 0.05;
pub const MAX_BANDWIDTH: f32 = 2.0;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FilterMode {
    #[default]
    LowPass = 0,
    HighPass = 1,
    BandPass = 2,
}

impl FilterMode {
    pub const ALL: [FilterMode; 3] = [FilterMode::LowPass, FilterMode::HighPass, FilterMode::BandPass];

    pub fn name(self) -> &'static str {
        match self {
            FilterMode::LowPass => "lowpass",
            FilterMode::HighPass => "highpass",
            FilterMode::BandPass => "bandpass",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FilterMode::HighPass,
            2 => FilterMode::BandPass,
            _ => FilterMode::LowPass,
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowpass" | "lp" => Ok(FilterMode::LowPass),
            "highpass" | "hp" => Ok(FilterMode::HighPass),
            "bandpass" | "bp" => Ok(FilterMode::BandPass),
            other => Err(format!("unknown filter mode `{other}`")),
        }
    }
}

pub struct StateVariableFilter {
    ic1eq: f32, // first integrator memory
    ic2eq: f32, // second integrator memory

    sample_rate: f32,
    cutoff: f32,
    resonance: f32,
    mode: FilterMode,

    g: f32,
    k: f32,
}

impl StateVariableFilter {
    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            sample_rate,
            cutoff: 1_000.0,
            resonance: 0.0,
            mode: FilterMode::LowPass,
            g: 0.0,
            k: 2.0,
        };
        filter.update_coefficients();
        filter
    }

    /// Apply new settings; coefficients are only recomputed on change.
    pub fn configure(&mut self, mode: FilterMode, cutoff: f32, resonance: f32) {
        let cutoff = cutoff.clamp(MIN_CUTOFF, MAX_CUTOFF.min(self.sample_rate * 0.49));
        let resonance = resonance.clamp(0.0, MAX_RESONANCE);
        self.mode = mode;
        if cutoff != self.cutoff || resonance != self.resonance {
            self.cutoff = cutoff;
            self.resonance = resonance;
            self.update_coefficients();
        }
    }

    #[inline]
    pub fn next_sample(&mut self, sample: f32) -> f32 {
        let (g, k) = (self.g, self.k);
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.mode {
            FilterMode::LowPass => v2,
            FilterMode::HighPass => sample - k * v1 - v2,
            FilterMode::BandPass => v1,
        }
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    fn update_coefficients(&mut self) {
        self.g = (PI * self.cutoff / self.sample_rate).tan();
        let r = self.resonance / MAX_RESONANCE * 0.95;
        self.k = 2.0 - 2.0 * r;
    }
}

/// Single-band parametric boost around a centre frequency.
pub struct PeakingFilter {
    ic1eq: f32,
    ic2eq: f32,

    sample_rate: f32,
    frequency: f32,
    gain_db: f32,
    bandwidth: f32,

    g: f32,
    k: f32,
    m1: f32,
}

impl PeakingFilter {
    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            sample_rate,
            frequency: 1_000.0,
            gain_db: 0.0,
            bandwidth: 0.5,
            g: 0.0,
            k: 1.0,
            m1: 0.0,
        };
        filter.update_coefficients();
        filter
    }

    /// `gain_db` in [0, 24], `bandwidth` in octaves.
    pub fn configure(&mut self, frequency: f32, gain_db: f32, bandwidth: f32) {
        let frequency = frequency.clamp(MIN_CUTOFF, MAX_PEAK_FREQUENCY.min(self.sample_rate * 0.49));
        let gain_db = gain_db.clamp(0.0, MAX_PEAK_GAIN_DB);
        let bandwidth = bandwidth.clamp(MIN_BANDWIDTH, MAX_BANDWIDTH);
        if frequency != self.frequency || gain_db != self.gain_db || bandwidth != self.bandwidth {
            self.frequency = frequency;
            self.gain_db = gain_db;
            self.bandwidth = bandwidth;
            self.update_coefficients();
        }
    }

    #[inline]
    pub fn next_sample(&mut self, sample: f32) -> f32 {
        let (g, k) = (self.g, self.k);
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        sample + self.m1 * v1
    }

    pub fn render(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample(*sample);
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn bandwidth(&self) -> f32 {
        self.bandwidth
    }

    fn update_coefficients(&mut self) {
        let a = 10f32.powf(self.gain_db / 40.0);
        let spread = 2f32.powf(self.bandwidth);
        let q = spread.sqrt() / (spread - 1.0);
        self.g = (PI * self.frequency / self.sample_rate).tan();
        self.k = 1.0 / (q * a);
        self.m1 = self.k * (a * a - 1.0);
    }
}
